//! End-of-epoch settlement
//!
//! Runs once after the last tick of an epoch has been agreed:
//!
//! 1. `EndEpoch` system procedures of every running contract
//! 2. IPO settlement of contracts constructed next epoch
//! 3. revenue issuance, unless it would exceed the maximum supply
//! 4. compaction of the spectrum, then the universe
//! 5. epoch-scoped state reset and contract storage for the new epoch

use crate::config::ConsensusConfig;
use crate::revenue::{compute_revenue, EpochScores, RevenueDistribution};
use crate::system::{PartitionRoots, SystemState};
use ledger_contracts::{ContractRuntime, SystemProcedure};
use ledger_core::params::{ISSUANCE_RATE, MAX_SUPPLY};
use ledger_core::{Id, TickTimestamp};
use ledger_state::IpoSettlement;

/// What one epoch transition did
#[derive(Debug, Clone)]
pub struct EpochReport {
    /// Epoch that ended
    pub ended_epoch: u16,
    /// Roots after the `EndEpoch` procedures, before settlement
    pub end_epoch_roots: PartitionRoots,
    /// Resource-testing digest of the ended epoch
    pub end_epoch_resource_digest: u64,
    /// Transaction-body digest of the ended epoch
    pub end_epoch_transaction_body_digest: u64,
    /// Contracts whose `EndEpoch` procedure faulted
    pub faulted_contracts: usize,
    /// IPOs settled, by contract index
    pub settled_ipos: Vec<(usize, IpoSettlement)>,
    /// Revenue paid, if issuance was allowed
    pub revenue: Option<RevenueDistribution>,
    /// Roots the new epoch starts from
    pub roots: PartitionRoots,
}

/// Settles an epoch against a contract runtime and its ledger
#[derive(Debug)]
pub struct EpochFinalizer<'a> {
    runtime: &'a ContractRuntime,
    config: &'a ConsensusConfig,
    computor_keys: &'a [Id],
    arbitrator: Id,
}

impl<'a> EpochFinalizer<'a> {
    /// Finalizer paying `computor_keys` in computor order and the
    /// remainder to `arbitrator`
    pub fn new(
        runtime: &'a ContractRuntime,
        config: &'a ConsensusConfig,
        computor_keys: &'a [Id],
        arbitrator: Id,
    ) -> Self {
        Self {
            runtime,
            config,
            computor_keys,
            arbitrator,
        }
    }

    /// End `system.epoch` and enter the next one starting at `system.tick`
    /// with `timestamp`
    pub fn finalize(&self, system: &mut SystemState, timestamp: TickTimestamp) -> EpochReport {
        let ended_epoch = system.epoch;
        let faulted_contracts = self.runtime.run_system_procedures(SystemProcedure::EndEpoch);
        let end_epoch_roots = PartitionRoots::recompute(self.runtime);
        let end_epoch_resource_digest = system.resource_testing_digest;
        let end_epoch_transaction_body_digest = system.transaction_body_digest;

        let settled_ipos = self
            .runtime
            .settle_ipos(ended_epoch, self.config.quorum().saturating_sub(1));
        let revenue = self.issue_revenue(system);

        let ledger = self.runtime.ledger();
        ledger.reorganize_spectrum();
        ledger.assets_end_epoch();

        system.begin_epoch(timestamp);
        self.runtime.begin_epoch(system.epoch);
        let roots = PartitionRoots::recompute(self.runtime);

        tracing::info!(
            ended_epoch,
            epoch = system.epoch,
            initial_tick = system.initial_tick,
            ipos = settled_ipos.len(),
            faulted_contracts,
            entities = ledger.spectrum_info().number_of_entities,
            "Epoch transition complete"
        );

        EpochReport {
            ended_epoch,
            end_epoch_roots,
            end_epoch_resource_digest,
            end_epoch_transaction_body_digest,
            faulted_contracts,
            settled_ipos,
            revenue,
            roots,
        }
    }

    fn issue_revenue(&self, system: &SystemState) -> Option<RevenueDistribution> {
        let ledger = self.runtime.ledger();
        let total = ledger.spectrum_info().total_amount;
        if total.saturating_add(ISSUANCE_RATE) > MAX_SUPPLY {
            tracing::warn!(total, "Revenue skipped, supply cap reached");
            return None;
        }

        let scores = EpochScores {
            transaction_points: system.transaction_points.clone(),
            votes: system.vote_counter.counts().to_vec(),
            custom: system.solutions.clone(),
        };
        let distribution = compute_revenue(self.config.revenue_model, &scores, self.config.quorum());
        for (key, amount) in self.computor_keys.iter().zip(&distribution.computors) {
            if *amount > 0 {
                ledger.increase_energy(key, *amount);
            }
        }
        if distribution.arbitrator > 0 {
            ledger.increase_energy(&self.arbitrator, distribution.arbitrator);
        }
        tracing::info!(
            epoch = system.epoch,
            arbitrator = distribution.arbitrator,
            "Epoch revenue issued"
        );
        Some(distribution)
    }
}
