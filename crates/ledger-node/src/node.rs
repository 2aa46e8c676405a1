//! Node driver
//!
//! `Node` owns a `TickProcessor` behind a mutex and runs one task that:
//! - ingests broadcasts and answers consensus requests
//! - hands entity and contract function requests to the `RequestProcessor`
//! - steps the processor after every message and every poll period
//! - re-polls peers while the tick is stalled
//! - snapshots the ledger at every epoch transition
//!
//! The mutex is never held across an await point.

use crate::clock::Clock;
use crate::config::NodeConfig;
use crate::error::Result;
use crate::requests::RequestProcessor;
use crate::transport::{Envelope, Transport};
use ledger_consensus::{Message, NullScorer, StepReport, SystemState, TickPhase, TickProcessor};
use ledger_contracts::builtin::standard_registry;
use ledger_contracts::ContractRuntime;
use ledger_core::{
    Ed25519Scheme, EventSink, FileSnapshotStore, LedgerConfig, LedgerEvent, SnapshotStore, TickTimestamp,
};
use ledger_state::{load_tables, save_tables, LedgerState};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Consecutive steps taken while ticks keep advancing
const MAX_STEPS_PER_WAKE: usize = 16;

/// Writes ledger events to the trace log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: LedgerEvent) {
        tracing::trace!(?event, "Ledger event");
    }
}

/// Point-in-time summary of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    /// Transport address
    pub peer: u32,
    /// Current epoch
    pub epoch: u16,
    /// Tick being agreed on
    pub tick: u32,
    /// First tick of the epoch
    pub initial_tick: u32,
    /// Phase of the current tick
    pub phase: String,
    /// Aligned votes on the current tick
    pub aligned_votes: u16,
    /// Hex spectrum root after the last processed tick
    pub spectrum_root: String,
    /// Hex universe root after the last processed tick
    pub universe_root: String,
    /// Hex computer root after the last processed tick
    pub computer_root: String,
    /// Entities with a balance record
    pub entities: u64,
    /// Energy in circulation
    pub total_amount: i64,
}

/// A running computor node
pub struct Node {
    processor: Arc<Mutex<TickProcessor>>,
    runtime: Arc<ContractRuntime>,
    transport: Arc<dyn Transport>,
    requests: RequestProcessor,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    clock: Arc<dyn Clock>,
    poll_period: Duration,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("peer", &self.transport.local_peer())
            .field("processor", &*self.processor.lock())
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Assemble a node from `config`, resuming from the snapshot of
    /// `config.node.epoch` when one exists.
    pub fn bootstrap(config: &NodeConfig, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let roster = config.roster()?;
        let snapshots: Option<Arc<dyn SnapshotStore>> = match config.snapshot_dir() {
            Some(dir) => Some(Arc::new(FileSnapshotStore::open(dir)?)),
            None => None,
        };
        let registry = standard_registry(config.node.contract_slots, config.node.contract_construction_epoch)?;
        let events: Arc<dyn EventSink> = Arc::new(TracingSink);
        let genesis = match config.node.genesis_unix_millis {
            0 => clock.now(),
            millis => TickTimestamp::from_unix_millis(millis),
        };
        let epoch = match config.node.epoch {
            0 => genesis.epoch(),
            epoch => epoch,
        };

        let resumed = snapshots
            .as_deref()
            .and_then(|store| SystemState::load(store, epoch).ok().map(|system| (store, system)));
        let (runtime, system) = match resumed {
            Some((store, system)) => {
                let ledger = Arc::new(load_tables(&config.ledger, store, epoch, events)?);
                let runtime = ContractRuntime::new(config.runtime.clone(), registry, ledger, config.consensus.computors)?;
                runtime.load_snapshot(store, epoch)?;
                tracing::info!(epoch, tick = system.tick, "Resuming from snapshot");
                (runtime, system)
            }
            None => {
                let ledger = Arc::new(LedgerState::new(&config.ledger, events)?);
                for (id, amount) in config.genesis_balances()? {
                    ledger.increase_energy(&id, amount);
                }
                let runtime = ContractRuntime::new(config.runtime.clone(), registry, ledger, config.consensus.computors)?;
                let system = SystemState::new(config.consensus.computors, epoch, config.node.initial_tick, genesis);
                tracing::info!(epoch, tick = system.tick, "Starting from genesis");
                (runtime, system)
            }
        };

        let runtime = Arc::new(runtime);
        let processor = TickProcessor::new(
            config.consensus.clone(),
            Arc::clone(&runtime),
            roster.keys,
            roster.hosted,
            Arc::new(Ed25519Scheme),
            Arc::new(NullScorer),
            system,
        )?;
        Ok(Self {
            processor: Arc::new(Mutex::new(processor)),
            requests: RequestProcessor::new(Arc::clone(&runtime), config.node.request_workers),
            runtime,
            transport,
            snapshots,
            clock,
            poll_period: Duration::from_millis(config.consensus.poll_period_ms.max(1)),
        })
    }

    /// Shared handle to the consensus state
    pub fn processor(&self) -> Arc<Mutex<TickProcessor>> {
        Arc::clone(&self.processor)
    }

    /// Contract runtime and ledger
    pub fn runtime(&self) -> &Arc<ContractRuntime> {
        &self.runtime
    }

    /// Current summary
    pub fn status(&self) -> NodeStatus {
        let processor = self.processor.lock();
        let system = processor.system();
        let etalon = processor.etalon();
        let info = processor.current_tick_info();
        let spectrum = self.runtime.ledger().spectrum_info();
        NodeStatus {
            peer: self.transport.local_peer().0,
            epoch: system.epoch,
            tick: system.tick,
            initial_tick: system.initial_tick,
            phase: format!("{:?}", processor.phase()),
            aligned_votes: info.aligned_votes,
            spectrum_root: hex::encode(etalon.roots.spectrum),
            universe_root: hex::encode(etalon.roots.universe),
            computer_root: hex::encode(etalon.roots.computer),
            entities: spectrum.number_of_entities,
            total_amount: spectrum.total_amount,
        }
    }

    /// Drive the node until `shutdown` fires or the transport closes
    pub async fn run(&self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let mut poll = tokio::time::interval(self.poll_period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(peer = %self.transport.local_peer(), "Node running");

        loop {
            tokio::select! {
                envelope = self.transport.receive() => match envelope {
                    Some(envelope) => self.handle(envelope).await?,
                    None => {
                        tracing::info!("Transport closed, node stopping");
                        break;
                    }
                },
                _ = poll.tick() => {
                    let stalled = self.processor.lock().phase() != TickPhase::Advanced;
                    if stalled {
                        self.repoll().await?;
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested");
                    break;
                }
            }
            self.step_until_idle().await?;
        }
        Ok(())
    }

    /// Route one inbound message
    pub async fn handle(&self, envelope: Envelope) -> Result<()> {
        let Envelope { from, message } = envelope;
        if RequestProcessor::handles(&message) {
            if let Some(response) = self.requests.respond(&message).await? {
                self.transport.enqueue_response(Some(from), response).await?;
            }
            return Ok(());
        }
        if is_consensus_request(&message) {
            let responses = self.processor.lock().respond(&message);
            for response in responses {
                self.transport.enqueue_response(Some(from), response).await?;
            }
            return Ok(());
        }
        let kind = message.message_type();
        let outcome = self.processor.lock().ingest(message);
        tracing::trace!(%from, kind, ?outcome, "Message ingested");
        Ok(())
    }

    /// Step once and publish what the step produced
    pub async fn step(&self) -> Result<StepReport> {
        let report = self.processor.lock().step(self.clock.now());
        for message in &report.outbound {
            self.transport.broadcast(message.clone()).await?;
        }
        if let Some(epoch) = &report.epoch {
            tracing::info!(
                ended_epoch = epoch.ended_epoch,
                faulted_contracts = epoch.faulted_contracts,
                "Epoch ended"
            );
            self.save_snapshot()?;
        }
        Ok(report)
    }

    async fn step_until_idle(&self) -> Result<()> {
        for _ in 0..MAX_STEPS_PER_WAKE {
            if self.step().await?.phase != TickPhase::Advanced {
                break;
            }
        }
        Ok(())
    }

    async fn repoll(&self) -> Result<()> {
        let requests = self.processor.lock().repoll_requests();
        for request in requests {
            self.transport.enqueue_response(None, request).await?;
        }
        Ok(())
    }

    /// Persist the ledger, contract states and system state under the
    /// current epoch
    pub fn save_snapshot(&self) -> Result<()> {
        let Some(store) = self.snapshots.as_deref() else {
            return Ok(());
        };
        let processor = self.processor.lock();
        let system = processor.system();
        save_tables(self.runtime.ledger(), store, system.epoch)?;
        self.runtime.save_snapshot(store, system.epoch)?;
        system.save(store)?;
        tracing::info!(epoch = system.epoch, tick = system.tick, "Epoch snapshot saved");
        Ok(())
    }
}

fn is_consensus_request(message: &Message) -> bool {
    matches!(
        message,
        Message::RequestQuorumTick(_)
            | Message::RequestTickData(_)
            | Message::RequestTickTransactions(_)
            | Message::RequestCurrentTickInfo
    )
}
