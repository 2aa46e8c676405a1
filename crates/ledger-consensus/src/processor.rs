//! Tick agreement and replay
//!
//! `TickProcessor` owns the consensus state of one node. The node feeds it
//! verified-on-ingest messages and calls `step` whenever something may have
//! changed; each step:
//!
//! 1. replays the current tick once, producing the etalon
//! 2. selects the agreed digest of the next tick's data
//! 3. checks the local next-tick data suits it and its transactions are held
//! 4. casts this node's votes on the current tick
//! 5. advances when a quorum of votes agrees with the etalon, running the
//!    epoch finalizer at the weekly boundary
//!
//! Tick data for tick `X` is bound by its timelock to the roots after tick
//! `X - tick_publication_offset`, so the first ticks of an epoch are empty.

use crate::config::ConsensusConfig;
use crate::epoch::{EpochFinalizer, EpochReport};
use crate::error::{ConsensusError, Result};
use crate::etalon::Etalon;
use crate::messages::{
    CurrentTickInfo, Message, RequestContractFunction, RequestQuorumTick, RequestTickData, RequestTickTransactions,
    RespondContractFunction, RespondEntity, TickData, TickVote, Transaction, WireDimensions,
};
use crate::quorum::{select_target, Target};
use crate::revenue::revenue_points;
use crate::scorer::{fold_score, solution_key, Scorer, SOLUTION_INPUT_SIZE, SOLUTION_INPUT_TYPE};
use crate::system::{PartitionRoots, SystemState};
use crate::tick_store::{StoreOutcome, TickStore};
use ledger_contracts::{ContractRuntime, IncomingTransfer, SystemProcedure, TransferKind};
use ledger_core::{hash, Digest, Id, SignatureScheme, SigningIdentity, TickTimestamp, ZERO_DIGEST};
use ledger_state::{BalanceRecord, LedgerState};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// How far past the current tick votes, tick data and transactions are stored
pub const FUTURE_TICK_HORIZON: u32 = 64;

/// Unreferenced transactions kept per tick, as a multiple of the slots
const PENDING_TRANSACTIONS_PER_SLOT: usize = 4;

/// Bytes of an IPO bid carried by a transaction: `price i64 ‖ quantity u16`
const IPO_BID_INPUT_SIZE: usize = 10;

/// Where the current tick stands after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPhase {
    /// No agreed next-tick digest yet and no usable local data
    #[default]
    AwaitingQuorumVotes,
    /// The next-tick digest is agreed but the local data does not suit it
    DigestTargetKnown {
        /// Whether the agreed next tick is empty
        empty: bool,
    },
    /// The next-tick data suits but some of its transactions are missing
    DataSuits,
    /// Votes are out; waiting for a quorum to agree with the etalon
    Replaying,
    /// The tick advanced
    Advanced,
}

/// What happened to an ingested message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored
    Accepted,
    /// Dropped: stale, duplicate, out of range or badly signed
    Ignored,
    /// Its signer signed conflicting content and is now flagged
    Faulty,
}

/// Result of one `step`
#[derive(Debug, Default)]
pub struct StepReport {
    /// Where the current tick stands
    pub phase: TickPhase,
    /// Tick replayed during this step
    pub processed_tick: Option<u32>,
    /// Messages to broadcast
    pub outbound: Vec<Message>,
    /// Transactions of the next tick not yet held
    pub missing_transactions: usize,
    /// Epoch transition performed during this step
    pub epoch: Option<EpochReport>,
}

/// Consensus state machine of one node
pub struct TickProcessor {
    config: ConsensusConfig,
    dims: WireDimensions,
    runtime: Arc<ContractRuntime>,
    scheme: Arc<dyn SignatureScheme>,
    scorer: Arc<dyn Scorer>,
    computor_keys: Vec<Id>,
    identities: Vec<(usize, SigningIdentity)>,
    arbitrator: Id,
    system: SystemState,
    store: TickStore,
    etalon: Etalon,
    roots_history: BTreeMap<u32, PartitionRoots>,
    latest_processed_tick: Option<u32>,
    target: Target,
    phase: TickPhase,
    aligned_votes: usize,
    total_votes: usize,
    solutions_seen: HashSet<Digest>,
    tick_started_at: Option<TickTimestamp>,
    tick_duration_ms: u64,
}

impl std::fmt::Debug for TickProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickProcessor")
            .field("epoch", &self.system.epoch)
            .field("tick", &self.system.tick)
            .field("phase", &self.phase)
            .field("identities", &self.identities.len())
            .finish_non_exhaustive()
    }
}

impl TickProcessor {
    /// Processor resuming `system` at the start of its epoch.
    ///
    /// `computor_keys` lists every computor's key in index order;
    /// `identities` are the computors this node signs for.
    pub fn new(
        config: ConsensusConfig,
        runtime: Arc<ContractRuntime>,
        computor_keys: Vec<Id>,
        identities: Vec<(usize, SigningIdentity)>,
        scheme: Arc<dyn SignatureScheme>,
        scorer: Arc<dyn Scorer>,
        system: SystemState,
    ) -> Result<Self> {
        config.validate()?;
        let arbitrator = config.arbitrator_id()?;
        if computor_keys.len() != config.computors {
            return Err(ConsensusError::invalid_state(format!(
                "{} computor keys for {} computors",
                computor_keys.len(),
                config.computors
            )));
        }
        if system.faulty_computors.len() != config.computors {
            return Err(ConsensusError::invalid_state("system state sized for another computor count"));
        }
        for (index, identity) in &identities {
            if computor_keys.get(*index) != Some(&identity.id()) {
                return Err(ConsensusError::invalid_state(format!(
                    "identity {} is not computor {index}",
                    identity.id()
                )));
            }
        }

        let dims = WireDimensions {
            computors: config.computors,
            transactions_per_tick: config.transactions_per_tick,
            contracts: runtime.registry().capacity(),
        };
        runtime.begin_epoch(system.epoch);
        runtime.set_tick(system.tick, system.initial_timestamp);
        let roots = PartitionRoots::recompute(&runtime);
        let etalon = Etalon {
            epoch: system.epoch,
            tick: system.tick,
            timestamp: system.initial_timestamp,
            prev_resource_testing_digest: system.resource_testing_digest,
            resource_testing_digest: system.resource_testing_digest,
            prev_transaction_body_digest: system.transaction_body_digest,
            transaction_body_digest: system.transaction_body_digest,
            prev_roots: roots,
            roots,
            ..Etalon::default()
        };
        let mut roots_history = BTreeMap::new();
        if let Some(before) = system.tick.checked_sub(1) {
            roots_history.insert(before, roots);
        }
        let store = TickStore::new(
            config.computors,
            system.initial_tick,
            config.transactions_per_tick * PENDING_TRANSACTIONS_PER_SLOT,
        );

        tracing::info!(
            epoch = system.epoch,
            tick = system.tick,
            computors = config.computors,
            hosted = identities.len(),
            "Tick processor ready"
        );
        Ok(Self {
            config,
            dims,
            runtime,
            scheme,
            scorer,
            computor_keys,
            identities,
            arbitrator,
            system,
            store,
            etalon,
            roots_history,
            latest_processed_tick: None,
            target: Target::Unknown,
            phase: TickPhase::default(),
            aligned_votes: 0,
            total_votes: 0,
            solutions_seen: HashSet::new(),
            tick_started_at: None,
            tick_duration_ms: 0,
        })
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// Epoch-scoped consensus state
    pub fn system(&self) -> &SystemState {
        &self.system
    }

    /// Reference vote on the current tick
    pub fn etalon(&self) -> &Etalon {
        &self.etalon
    }

    /// Stored votes, tick data and transactions
    pub fn store(&self) -> &TickStore {
        &self.store
    }

    /// Contract runtime and, through it, the ledger
    pub fn runtime(&self) -> &Arc<ContractRuntime> {
        &self.runtime
    }

    /// Message sizes of this network
    pub fn dimensions(&self) -> WireDimensions {
        self.dims
    }

    /// Agreed next-tick digest as of the last step
    pub fn target(&self) -> Target {
        self.target
    }

    /// Phase as of the last step
    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    /// Keys of every computor in index order
    pub fn computor_keys(&self) -> &[Id] {
        &self.computor_keys
    }

    /// Progress summary served to peers and clients
    pub fn current_tick_info(&self) -> CurrentTickInfo {
        CurrentTickInfo {
            tick_duration: self.tick_duration_ms.min(u64::from(u16::MAX)) as u16,
            epoch: self.system.epoch,
            tick: self.system.tick,
            aligned_votes: self.aligned_votes.min(usize::from(u16::MAX)) as u16,
            misaligned_votes: (self.total_votes - self.aligned_votes).min(usize::from(u16::MAX)) as u16,
            initial_tick: self.system.initial_tick,
        }
    }

    // ---------------------------------------------------------------------
    // Ingestion
    // ---------------------------------------------------------------------

    /// Store a broadcast message; requests and responses are ignored
    pub fn ingest(&mut self, message: Message) -> IngestOutcome {
        match message {
            Message::Vote(vote) => self.ingest_vote(vote),
            Message::TickData(data) => self.ingest_tick_data(data),
            Message::Transaction(transaction) => self.ingest_transaction(transaction),
            _ => IngestOutcome::Ignored,
        }
    }

    fn within_horizon(&self, tick: u32) -> bool {
        tick <= self.system.tick.saturating_add(FUTURE_TICK_HORIZON)
    }

    fn flag(&mut self, computor: usize, what: &str) -> IngestOutcome {
        if self.system.flag_faulty(computor) {
            tracing::warn!(computor, epoch = self.system.epoch, what, "Computor signed conflicting messages");
        }
        IngestOutcome::Faulty
    }

    /// Store a peer's vote
    pub fn ingest_vote(&mut self, vote: TickVote) -> IngestOutcome {
        let computor = usize::from(vote.computor_index);
        let Some(key) = self.computor_keys.get(computor) else {
            return IngestOutcome::Ignored;
        };
        if vote.epoch != self.system.epoch
            || vote.tick < self.system.initial_tick
            || !self.within_horizon(vote.tick)
            || self.system.is_faulty(computor)
            || !vote.verify(self.scheme.as_ref(), key)
        {
            return IngestOutcome::Ignored;
        }
        let tick = vote.tick;
        match self.store.insert_vote(vote) {
            StoreOutcome::Stored => {
                tracing::trace!(tick, computor, "Vote ingested");
                IngestOutcome::Accepted
            }
            StoreOutcome::Conflict => self.flag(computor, "vote"),
            StoreOutcome::Duplicate | StoreOutcome::Rejected => IngestOutcome::Ignored,
        }
    }

    /// Timelock tick data for `tick` must carry, if the roots it binds to
    /// are known. `Err` when they never will be.
    fn expected_timelock(&self, tick: u32) -> std::result::Result<Option<Digest>, ()> {
        let Some(lock_tick) = tick.checked_sub(self.config.tick_publication_offset) else {
            return Err(());
        };
        if let Some(roots) = self.roots_history.get(&lock_tick) {
            return Ok(Some(roots.timelock()));
        }
        match self.latest_processed_tick {
            Some(processed) if lock_tick <= processed => Err(()),
            _ if lock_tick < self.system.tick => Err(()),
            _ => Ok(None),
        }
    }

    /// Store a leader's tick data
    pub fn ingest_tick_data(&mut self, data: TickData) -> IngestOutcome {
        let leader = data.tick as usize % self.config.computors;
        if data.epoch != self.system.epoch
            || data.tick <= self.system.tick
            || !self.within_horizon(data.tick)
            || usize::from(data.computor_index) != leader
            || self.system.is_faulty(leader)
            || !data.timestamp.is_valid()
            || data.transaction_digests.len() != self.dims.transactions_per_tick
            || data.contract_fees.len() != self.dims.contracts
            || !data.verify(self.scheme.as_ref(), &self.computor_keys[leader])
        {
            return IngestOutcome::Ignored;
        }
        match self.expected_timelock(data.tick) {
            Ok(Some(timelock)) if timelock != data.timelock => return IngestOutcome::Ignored,
            Err(()) => return IngestOutcome::Ignored,
            _ => {}
        }
        let tick = data.tick;
        match self.store.insert_tick_data(data) {
            StoreOutcome::Stored => {
                tracing::debug!(tick, leader, "Tick data ingested");
                IngestOutcome::Accepted
            }
            StoreOutcome::Conflict => self.flag(leader, "tick data"),
            StoreOutcome::Duplicate | StoreOutcome::Rejected => IngestOutcome::Ignored,
        }
    }

    /// Store a signed transaction scheduled for a future tick
    pub fn ingest_transaction(&mut self, transaction: Transaction) -> IngestOutcome {
        if !transaction.is_valid()
            || transaction.tick <= self.system.tick
            || !self.within_horizon(transaction.tick)
            || !transaction.verify(self.scheme.as_ref())
        {
            return IngestOutcome::Ignored;
        }
        match self.store.insert_transaction(transaction) {
            StoreOutcome::Stored => IngestOutcome::Accepted,
            _ => IngestOutcome::Ignored,
        }
    }

    // ---------------------------------------------------------------------
    // Requests
    // ---------------------------------------------------------------------

    /// Answer a peer's request from local state.
    ///
    /// Entity and contract function requests are served here too, but the
    /// node normally answers them off the consensus lock with
    /// `respond_entity` and `respond_contract_function`.
    pub fn respond(&self, request: &Message) -> Vec<Message> {
        match request {
            Message::RequestQuorumTick(request) => self
                .store
                .votes_for(request.tick)
                .filter(|vote| !request.has_vote(usize::from(vote.computor_index)))
                .cloned()
                .map(Message::Vote)
                .collect(),
            Message::RequestTickData(request) => self
                .store
                .tick_data(request.tick)
                .cloned()
                .map(Message::TickData)
                .into_iter()
                .collect(),
            Message::RequestTickTransactions(request) => {
                let Some(data) = self.store.tick_data(request.tick) else {
                    return Vec::new();
                };
                data.transaction_digests
                    .iter()
                    .enumerate()
                    .filter(|(slot, digest)| **digest != ZERO_DIGEST && !request.has_transaction(*slot))
                    .filter_map(|(_, digest)| self.store.transaction(request.tick, digest))
                    .cloned()
                    .map(Message::Transaction)
                    .collect()
            }
            Message::RequestCurrentTickInfo => vec![Message::RespondCurrentTickInfo(self.current_tick_info())],
            Message::RequestEntity(request) => vec![Message::RespondEntity(respond_entity(
                self.runtime.ledger(),
                &request.id,
                self.system.tick,
            ))],
            Message::RequestContractFunction(request) => vec![Message::RespondContractFunction(
                respond_contract_function(&self.runtime, request),
            )],
            _ => Vec::new(),
        }
    }

    /// Requests to re-send while the current tick is stalled
    pub fn repoll_requests(&self) -> Vec<Message> {
        let tick = self.system.tick;
        let next = tick + 1;
        let mut requests = vec![
            Message::RequestQuorumTick(RequestQuorumTick {
                tick,
                vote_flags: self.store.vote_flags(tick),
            }),
            Message::RequestQuorumTick(RequestQuorumTick {
                tick: next,
                vote_flags: self.store.vote_flags(next),
            }),
        ];
        if self.store.tick_data(next).is_none() {
            requests.push(Message::RequestTickData(RequestTickData { tick: next }));
        } else if !self.store.missing_transactions(next).is_empty() {
            requests.push(Message::RequestTickTransactions(RequestTickTransactions {
                tick: next,
                transaction_flags: self.store.transaction_flags(next, self.config.transactions_per_tick),
            }));
        }
        requests
    }

    // ---------------------------------------------------------------------
    // Tick loop
    // ---------------------------------------------------------------------

    /// Drive the current tick as far as local state allows.
    ///
    /// `now` timestamps tick data this node leads and measures how long the
    /// tick has waited for next-tick data.
    pub fn step(&mut self, now: TickTimestamp) -> StepReport {
        let mut report = StepReport::default();
        let tick = self.system.tick;
        let started = *self.tick_started_at.get_or_insert(now);

        if self.latest_processed_tick.map_or(true, |processed| processed < tick) {
            self.process_tick(tick, now, &mut report.outbound);
            self.latest_processed_tick = Some(tick);
            report.processed_tick = Some(tick);
        }

        let computors = self.config.computors;
        let quorum = self.config.quorum();
        let next = tick + 1;

        let next_votes: Vec<&Digest> = self
            .store
            .votes_for(next)
            .map(|vote| &vote.transaction_digest)
            .collect();
        let future_total = next_votes.len();
        let expected: Vec<&Digest> = self
            .store
            .votes_for(tick)
            .map(|vote| &vote.expected_next_tick_transaction_digest)
            .collect();
        self.target = select_target(&next_votes, &expected, computors, quorum);

        if let Some(data) = self.store.tick_data(next) {
            if !matches!(self.expected_timelock(next), Ok(Some(timelock)) if timelock == data.timelock) {
                tracing::warn!(tick = next, "Tick data timelock mismatch, dropped");
                self.store.remove_tick_data(next);
            }
        }

        let patience_exhausted = millis_between(&started, &now) >= self.config.target_tick_duration_ms;
        let suits = match self.target {
            Target::Unknown => {
                self.store.tick_data(next).is_some() || future_total > computors - quorum || patience_exhausted
            }
            Target::Empty => {
                if self.store.remove_tick_data(next).is_some() {
                    tracing::debug!(tick = next, "Agreed empty tick, local tick data dropped");
                }
                true
            }
            Target::Data(digest) => match self.store.tick_data(next).map(TickData::content_digest) {
                Some(local) if local == digest => true,
                Some(_) => {
                    tracing::warn!(tick = next, "Local tick data differs from the agreed digest, dropped");
                    self.store.remove_tick_data(next);
                    false
                }
                None => false,
            },
        };

        if !suits {
            self.aligned_votes = 0;
            self.total_votes = self.store.vote_count(tick);
            self.phase = match self.target {
                Target::Unknown => TickPhase::AwaitingQuorumVotes,
                Target::Empty => TickPhase::DigestTargetKnown { empty: true },
                Target::Data(_) => TickPhase::DigestTargetKnown { empty: false },
            };
            report.phase = self.phase;
            return report;
        }

        let missing = self.store.missing_transactions(next);
        if !missing.is_empty() {
            self.aligned_votes = 0;
            self.total_votes = self.store.vote_count(tick);
            report.missing_transactions = missing.len();
            self.phase = TickPhase::DataSuits;
            report.phase = self.phase;
            return report;
        }

        self.etalon.transaction_digest = self
            .store
            .tick_data(tick)
            .map(TickData::content_digest)
            .unwrap_or(ZERO_DIGEST);
        self.etalon.expected_next_tick_transaction_digest = self
            .store
            .tick_data(next)
            .map(TickData::content_digest)
            .unwrap_or(ZERO_DIGEST);

        if self.system.latest_created_tick.map_or(true, |created| created < tick) {
            for (index, identity) in &self.identities {
                let vote = self.etalon.signed_vote(*index as u16, identity);
                self.store.insert_vote(vote.clone());
                report.outbound.push(Message::Vote(vote));
            }
            self.system.latest_created_tick = Some(tick);
        }

        let mut aligned = 0;
        let mut total = 0;
        for vote in self.store.votes_for(tick) {
            total += 1;
            let computor = usize::from(vote.computor_index);
            if self.etalon.matches(vote, &self.computor_keys[computor]) {
                aligned += 1;
                self.system.vote_counter.register(tick, computor);
            }
        }
        self.aligned_votes = aligned;
        self.total_votes = total;

        if aligned >= quorum && self.target.is_known() {
            self.advance(now, &mut report);
            self.phase = TickPhase::Advanced;
        } else {
            self.phase = TickPhase::Replaying;
        }
        report.phase = self.phase;
        report
    }

    fn advance(&mut self, now: TickTimestamp, report: &mut StepReport) {
        let finished = self.system.tick;
        let boundary = self.etalon.timestamp.epoch_boundary_reached(self.system.epoch);
        self.system.tick += 1;
        let timestamp = match self.store.tick_data(self.system.tick) {
            Some(data) => self.etalon.timestamp.next_after(&data.timestamp),
            None => {
                let mut next = self.etalon.timestamp;
                next.advance_millisecond();
                next
            }
        };
        self.etalon.tick += 1;
        self.etalon.timestamp = timestamp;

        if boundary {
            let epoch = EpochFinalizer::new(&self.runtime, &self.config, &self.computor_keys, self.arbitrator)
                .finalize(&mut self.system, timestamp);
            self.store.reset(self.system.initial_tick);
            self.solutions_seen.clear();
            self.roots_history.clear();
            self.roots_history.insert(finished, epoch.roots);

            self.etalon.epoch = self.system.epoch;
            self.etalon.prev_roots = epoch.end_epoch_roots;
            self.etalon.prev_resource_testing_digest = epoch.end_epoch_resource_digest;
            self.etalon.prev_transaction_body_digest = epoch.end_epoch_transaction_body_digest;
            self.etalon.roots = epoch.roots;
            self.etalon.resource_testing_digest = self.system.resource_testing_digest;
            self.etalon.transaction_body_digest = self.system.transaction_body_digest;
            report.epoch = Some(epoch);
        }

        if let Some(started) = self.tick_started_at.replace(now) {
            self.tick_duration_ms = millis_between(&started, &now);
        }
        self.target = Target::Unknown;
        tracing::info!(
            tick = self.system.tick,
            epoch = self.system.epoch,
            aligned = self.aligned_votes,
            "Tick advanced"
        );
    }

    // ---------------------------------------------------------------------
    // Replay
    // ---------------------------------------------------------------------

    fn process_tick(&mut self, tick: u32, now: TickTimestamp, outbound: &mut Vec<Message>) {
        let runtime = Arc::clone(&self.runtime);
        runtime.set_tick(tick, self.etalon.timestamp);
        runtime.ledger().set_tick(tick);

        if tick > self.system.initial_tick {
            self.etalon.prev_roots = self.etalon.roots;
            self.etalon.prev_resource_testing_digest = self.etalon.resource_testing_digest;
            self.etalon.prev_transaction_body_digest = self.etalon.transaction_body_digest;
        } else {
            runtime.run_system_procedures(SystemProcedure::Initialize);
            runtime.run_system_procedures(SystemProcedure::BeginEpoch);
        }
        runtime.run_system_procedures(SystemProcedure::BeginTick);

        if let Some(data) = self.store.tick_data(tick).cloned() {
            let leader = tick as usize % self.config.computors;
            self.system.transaction_points[leader] =
                self.system.transaction_points[leader].saturating_add(revenue_points(data.transaction_count()));
            let mut seen = HashSet::new();
            for digest in data.transaction_digests.iter().filter(|d| **d != ZERO_DIGEST) {
                if let Some(transaction) = self.store.transaction(tick, digest).cloned() {
                    self.process_transaction(tick, &transaction, &mut seen);
                }
            }
        }

        runtime.run_system_procedures(SystemProcedure::EndTick);
        let roots = PartitionRoots::recompute(&runtime);
        self.etalon.roots = roots;
        self.etalon.resource_testing_digest = self.system.resource_testing_digest;
        self.etalon.transaction_body_digest = self.system.transaction_body_digest;
        self.roots_history.insert(tick, roots);
        let keep_from = tick.saturating_sub(self.config.tick_publication_offset + 1);
        self.roots_history = self.roots_history.split_off(&keep_from);

        tracing::debug!(tick, epoch = self.system.epoch, "Tick processed");
        self.lead(tick, roots, now, outbound);
    }

    /// Publish tick data for `tick + offset` if this node leads it
    fn lead(&mut self, tick: u32, roots: PartitionRoots, now: TickTimestamp, outbound: &mut Vec<Message>) {
        let lead_tick = tick + self.config.tick_publication_offset;
        let leader = lead_tick as usize % self.config.computors;
        if self.system.latest_led_tick.is_some_and(|led| led >= lead_tick) {
            return;
        }
        let Some((_, identity)) = self.identities.iter().find(|(index, _)| *index == leader) else {
            return;
        };

        let timestamp = if now.is_valid() { now } else { self.etalon.timestamp };
        let mut data = TickData::new(
            &self.dims,
            leader as u16,
            self.system.epoch,
            lead_tick,
            timestamp,
            roots.timelock(),
        );
        let mut sources = HashSet::new();
        let picked = self
            .store
            .pending_transactions(lead_tick)
            .into_iter()
            .filter(|transaction| sources.insert(transaction.source))
            .take(self.dims.transactions_per_tick)
            .map(Transaction::digest);
        for (slot, digest) in picked.enumerate() {
            data.transaction_digests[slot] = digest;
        }
        data.sign(identity);

        self.system.latest_led_tick = Some(lead_tick);
        tracing::info!(
            tick = lead_tick,
            leader,
            transactions = data.transaction_count(),
            "Tick data published"
        );
        self.store.insert_tick_data(data.clone());
        outbound.push(Message::TickData(data));
    }

    fn process_transaction(&mut self, tick: u32, transaction: &Transaction, seen: &mut HashSet<Id>) {
        if !transaction.is_valid() || transaction.tick != tick {
            return;
        }
        let runtime = Arc::clone(&self.runtime);
        let ledger = runtime.ledger();
        let Some(source_index) = ledger.spectrum_index(&transaction.source) else {
            return;
        };
        if !seen.insert(transaction.source) {
            return;
        }
        if !ledger.move_energy(source_index, &transaction.destination, transaction.amount) {
            return;
        }
        self.system.transaction_body_digest = fold_digest(self.system.transaction_body_digest, &transaction.digest());

        if transaction.destination.is_zero() {
            if transaction.input_type == SOLUTION_INPUT_TYPE && transaction.input.len() == SOLUTION_INPUT_SIZE {
                self.process_solution(transaction);
            }
            return;
        }
        let Some(contract) = transaction.destination.contract_index() else {
            return;
        };

        if runtime.in_ipo(contract) {
            // only an empty-handed transaction carrying exactly a bid bids;
            // anything else just moves its amount
            if transaction.amount == 0 && transaction.input_type == 0 {
                if let Some((price, quantity)) = parse_ipo_bid(&transaction.input) {
                    runtime.bid_in_ipo(contract, &transaction.source, price, quantity);
                }
            }
        } else if transaction.input_type != 0 && runtime.has_procedure(contract, transaction.input_type) {
            let reward = IncomingTransfer {
                source: transaction.source,
                amount: transaction.amount,
                kind: TransferKind::ProcedureTransaction,
            };
            // faults are recorded by the runtime against the contract
            let _ = runtime.notify_incoming_transfer(contract, reward);
            let _ = runtime.invoke_procedure(
                contract,
                transaction.input_type,
                &transaction.source,
                transaction.amount,
                &transaction.input,
            );
        } else {
            let transfer = IncomingTransfer {
                source: transaction.source,
                amount: transaction.amount,
                kind: TransferKind::StandardTransaction,
            };
            let _ = runtime.notify_incoming_transfer(contract, transfer);
        }
    }

    fn process_solution(&mut self, transaction: &Transaction) {
        let mut nonce = ZERO_DIGEST;
        nonce.copy_from_slice(&transaction.input[..SOLUTION_INPUT_SIZE]);
        if !self.solutions_seen.insert(solution_key(&transaction.source, &nonce)) {
            return;
        }
        let score = self.scorer.score(&transaction.source, &nonce);
        if score == 0 {
            return;
        }
        self.system.resource_testing_digest = fold_score(self.system.resource_testing_digest, score);
        if let Some(computor) = self.computor_keys.iter().position(|key| *key == transaction.source) {
            self.system.solutions[computor] += 1;
        }
        tracing::debug!(source = %transaction.source, score, "Solution accepted");
    }
}

/// Balance record of `id` with its Merkle siblings, as of `tick`
pub fn respond_entity(ledger: &LedgerState, id: &Id, tick: u32) -> RespondEntity {
    match ledger.spectrum_index(id) {
        Some(index) => RespondEntity {
            entity: ledger.entity(id),
            tick,
            spectrum_index: index as i32,
            siblings: ledger.spectrum_siblings(index),
        },
        None => RespondEntity {
            entity: BalanceRecord::empty(*id),
            tick,
            spectrum_index: -1,
            siblings: Vec::new(),
        },
    }
}

/// Run a read-only contract function; empty output if it fails
pub fn respond_contract_function(runtime: &ContractRuntime, request: &RequestContractFunction) -> RespondContractFunction {
    let output = runtime
        .call_function(request.contract_index as usize, request.input_type, &request.input)
        .unwrap_or_else(|fault| {
            tracing::debug!(contract = request.contract_index, ?fault, "Contract function failed");
            Vec::new()
        });
    RespondContractFunction { output }
}

fn parse_ipo_bid(input: &[u8]) -> Option<(i64, u16)> {
    if input.len() != IPO_BID_INPUT_SIZE {
        return None;
    }
    let mut price = [0u8; 8];
    price.copy_from_slice(&input[..8]);
    Some((i64::from_le_bytes(price), u16::from_le_bytes([input[8], input[9]])))
}

fn fold_digest(state: u64, digest: &Digest) -> u64 {
    let mut preimage = [0u8; 40];
    preimage[..8].copy_from_slice(&state.to_le_bytes());
    preimage[8..].copy_from_slice(digest);
    let out = hash(&preimage);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&out[..8]);
    u64::from_le_bytes(bytes)
}

fn timestamp_millis(ts: &TickTimestamp) -> u64 {
    let seconds = u64::from(ts.day_index()) * 86_400
        + u64::from(ts.hour) * 3_600
        + u64::from(ts.minute) * 60
        + u64::from(ts.second);
    seconds * 1_000 + u64::from(ts.millisecond)
}

fn millis_between(earlier: &TickTimestamp, later: &TickTimestamp) -> u64 {
    timestamp_millis(later).saturating_sub(timestamp_millis(earlier))
}

/// Encode an IPO bid as transaction input
pub fn ipo_bid_input(price: i64, quantity: u16) -> Vec<u8> {
    let mut input = Vec::with_capacity(IPO_BID_INPUT_SIZE);
    input.extend_from_slice(&price.to_le_bytes());
    input.extend_from_slice(&quantity.to_le_bytes());
    input
}
