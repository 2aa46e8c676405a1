//! Read-only requests served off the consensus lock
//!
//! Entity lookups read the ledger tables directly. Contract functions run
//! on blocking workers bounded by `request_workers`, so slow functions
//! neither stall the tick loop nor pile up without limit.

use crate::error::{NodeError, Result};
use ledger_consensus::{respond_contract_function, respond_entity, Message};
use ledger_contracts::ContractRuntime;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Serves entity and contract function requests
#[derive(Debug, Clone)]
pub struct RequestProcessor {
    runtime: Arc<ContractRuntime>,
    workers: Arc<Semaphore>,
}

impl RequestProcessor {
    /// Processor running at most `workers` contract functions at once
    pub fn new(runtime: Arc<ContractRuntime>, workers: usize) -> Self {
        Self {
            runtime,
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Whether `message` is served here rather than by consensus
    pub fn handles(message: &Message) -> bool {
        matches!(message, Message::RequestEntity(_) | Message::RequestContractFunction(_))
    }

    /// Response to `request`, or `None` if it is not served here
    pub async fn respond(&self, request: &Message) -> Result<Option<Message>> {
        match request {
            Message::RequestEntity(request) => {
                let tick = self.runtime.clock().tick;
                Ok(Some(Message::RespondEntity(respond_entity(
                    self.runtime.ledger(),
                    &request.id,
                    tick,
                ))))
            }
            Message::RequestContractFunction(request) => {
                let permit = Arc::clone(&self.workers)
                    .acquire_owned()
                    .await
                    .map_err(|_| NodeError::worker("request workers shut down"))?;
                let runtime = Arc::clone(&self.runtime);
                let request = request.clone();
                let response = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    respond_contract_function(&runtime, &request)
                })
                .await
                .map_err(|e| NodeError::worker(format!("contract function worker failed: {e}")))?;
                Ok(Some(Message::RespondContractFunction(response)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_consensus::{RequestContractFunction, RequestEntity, RequestTickData};
    use ledger_contracts::builtin::{standard_registry, EXCHANGE_FEES, EXCHANGE_INDEX};
    use ledger_contracts::RuntimeConfig;
    use ledger_core::{Id, NullSink};
    use ledger_state::{LedgerState, TableConfig};

    fn processor() -> RequestProcessor {
        let ledger = Arc::new(LedgerState::new(&TableConfig::default(), Arc::new(NullSink)).unwrap());
        ledger.increase_energy(&Id([3; 32]), 77);
        let runtime = ContractRuntime::new(RuntimeConfig::default(), standard_registry(8, 1).unwrap(), ledger, 4)
            .unwrap();
        runtime.begin_epoch(1);
        RequestProcessor::new(Arc::new(runtime), 2)
    }

    #[tokio::test]
    async fn test_entity_request() {
        let requests = processor();
        let response = requests
            .respond(&Message::RequestEntity(RequestEntity { id: Id([3; 32]) }))
            .await
            .unwrap();
        let Some(Message::RespondEntity(entity)) = response else {
            panic!("expected an entity response");
        };
        assert_eq!(entity.entity.energy(), 77);
        assert!(entity.spectrum_index >= 0);
        assert!(!entity.siblings.is_empty());
    }

    #[tokio::test]
    async fn test_contract_function_runs_on_worker() {
        let requests = processor();
        let request = Message::RequestContractFunction(RequestContractFunction {
            contract_index: EXCHANGE_INDEX as u32,
            input_type: EXCHANGE_FEES,
            input: Vec::new(),
        });
        let Some(Message::RespondContractFunction(response)) = requests.respond(&request).await.unwrap() else {
            panic!("expected a function response");
        };
        assert!(!response.output.is_empty());

        let unknown = Message::RequestContractFunction(RequestContractFunction {
            contract_index: 7,
            input_type: 1,
            input: Vec::new(),
        });
        let Some(Message::RespondContractFunction(response)) = requests.respond(&unknown).await.unwrap() else {
            panic!("expected a function response");
        };
        assert!(response.output.is_empty());
    }

    #[tokio::test]
    async fn test_consensus_requests_pass_through() {
        let message = Message::RequestTickData(RequestTickData { tick: 1 });
        assert!(!RequestProcessor::handles(&message));
        assert!(processor().respond(&message).await.unwrap().is_none());
    }
}
