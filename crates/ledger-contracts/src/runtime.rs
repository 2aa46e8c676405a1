//! Contract runtime
//!
//! Owns every contract's storage slot, the computer digest tree and the
//! execution stack pool, and drives invocations through them:
//!
//! 1. claim an execution stack from the pool
//! 2. allocate input, output and locals on it, zero-padding the input
//! 3. take the contract's read (function) or write (procedure) lock
//! 4. run the handler, then unwind the stack and release the lock
//!
//! Nested calls repeat steps 2-4 on the caller's stack. A faulted
//! procedure invocation restores every state blob it touched and disables
//! the contract that faulted. Energy moved before the fault stays moved.
//!
//! Slot 0 belongs to the runtime itself and holds the fee reserve of every
//! contract as little-endian `i64`s.

use crate::codec::{read_i64, write_i64};
use crate::config::RuntimeConfig;
use crate::context::{
    CallIdentity, Frame, FunctionContext, IncomingTransfer, PendingCallback, ProcedureContext, Qpi, Session,
    TransferKind,
};
use crate::contract::{
    ContractDescriptor, ContractRegistry, EntryPoint, FunctionHandler, ProcedureHandler, SystemProcedure,
};
use crate::fault::{ContractFault, ContractResult};
use crate::pool::StackPool;
use crate::stack::{RollbackRecord, StackBuffer};
use ledger_core::persist::epoch_snapshot_name;
use ledger_core::{
    hash, Digest, DigestTree, Id, LeafSource, LedgerError, LedgerEvent, Result, SnapshotStore, TickTimestamp,
    ZERO_DIGEST,
};
use ledger_state::{BidPlacement, IpoBook, IpoSettlement, LedgerState};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Base name of contract-state snapshots
pub const CONTRACTS_SNAPSHOT: &str = "contracts";

/// Bytes reserved on the stack for the context of a nested call
const CALL_CONTEXT_SIZE: usize = 128;

/// What a contract slot currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractStorage {
    /// Nothing: unregistered, or not yet selling shares
    Empty,
    /// Shares are being auctioned
    Ipo(IpoBook),
    /// Running contract state
    State(Vec<u8>),
}

/// Tick, epoch and time seen by contract code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionClock {
    /// Tick being processed
    pub tick: u32,
    /// Current epoch
    pub epoch: u16,
    /// Timestamp of the tick being processed
    pub timestamp: TickTimestamp,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum EntrySelector {
    User(u16),
    System(SystemProcedure),
}

struct ComputerLeaves<'a>(&'a [RwLock<ContractStorage>]);

impl LeafSource for ComputerLeaves<'_> {
    fn leaf_digest(&self, index: usize) -> Digest {
        let Some(slot) = self.0.get(index) else {
            return ZERO_DIGEST;
        };
        match &*slot.read() {
            ContractStorage::Empty => ZERO_DIGEST,
            ContractStorage::Ipo(book) => hash(&book.to_bytes()),
            ContractStorage::State(state) => hash(state),
        }
    }
}

/// Executes contracts against a ledger
pub struct ContractRuntime {
    config: RuntimeConfig,
    registry: ContractRegistry,
    ledger: Arc<LedgerState>,
    storage: Vec<RwLock<ContractStorage>>,
    digests: Mutex<DigestTree>,
    pool: StackPool,
    faults: Mutex<Vec<Option<ContractFault>>>,
    clock: RwLock<ExecutionClock>,
    computors: usize,
}

impl std::fmt::Debug for ContractRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractRuntime")
            .field("contracts", &self.registry.iter().count())
            .field("clock", &self.clock())
            .field("stacks", &self.pool.len())
            .finish_non_exhaustive()
    }
}

impl ContractRuntime {
    /// Runtime for `registry` over `ledger`, with one share per computor.
    pub fn new(
        config: RuntimeConfig,
        registry: ContractRegistry,
        ledger: Arc<LedgerState>,
        computors: usize,
    ) -> Result<Self> {
        config.validate()?;
        if computors == 0 {
            return Err(LedgerError::config("runtime needs at least one computor"));
        }
        let capacity = registry.capacity();
        let storage = (0..capacity)
            .map(|index| {
                RwLock::new(if index == 0 {
                    ContractStorage::State(vec![0; capacity * 8])
                } else {
                    ContractStorage::Empty
                })
            })
            .collect();
        let depth = capacity.next_power_of_two().trailing_zeros();
        let pool = StackPool::new(config.execution_stacks, config.stack_size, config.reserved_stacks);
        tracing::debug!(capacity, stacks = pool.len(), "Contract runtime created");
        Ok(Self {
            registry,
            ledger,
            storage,
            digests: Mutex::new(DigestTree::new(depth)?),
            pool,
            faults: Mutex::new(vec![None; capacity]),
            clock: RwLock::new(ExecutionClock::default()),
            computors,
            config,
        })
    }

    /// Ledger the contracts operate on
    pub fn ledger(&self) -> &LedgerState {
        &self.ledger
    }

    /// Registered contracts
    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Runtime settings
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of computors, which is also the number of shares per contract
    pub fn computors(&self) -> usize {
        self.computors
    }

    /// Current tick, epoch and timestamp
    pub fn clock(&self) -> ExecutionClock {
        *self.clock.read()
    }

    /// Set the tick and timestamp seen by contract code
    pub fn set_tick(&self, tick: u32, timestamp: TickTimestamp) {
        let mut clock = self.clock.write();
        clock.tick = tick;
        clock.timestamp = timestamp;
    }

    /// Enter `epoch`: open IPO books for contracts selling shares in it and
    /// allocate zeroed state for contracts that have been constructed.
    pub fn begin_epoch(&self, epoch: u16) {
        self.clock.write().epoch = epoch;
        for (index, descriptor) in self.registry.iter() {
            let mut slot = self.storage[index].write();
            let next = if !descriptor.in_ipo(epoch) {
                match &*slot {
                    ContractStorage::State(state) if state.len() == descriptor.state_size => continue,
                    _ => ContractStorage::State(vec![0; descriptor.state_size]),
                }
            } else if descriptor.accepts_bids(epoch) {
                match &*slot {
                    ContractStorage::Ipo(_) => continue,
                    _ => ContractStorage::Ipo(IpoBook::new(self.computors)),
                }
            } else {
                ContractStorage::Empty
            };
            *slot = next;
            drop(slot);
            self.mark_dirty(index);
        }
        tracing::debug!(epoch, "Contract storage prepared for epoch");
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Whether `contract` is registered and past its IPO
    pub fn is_running(&self, contract: usize) -> bool {
        self.registry
            .get(contract)
            .is_some_and(|d| !d.in_ipo(self.clock().epoch))
    }

    /// Whether `contract` is registered and still in its IPO phase
    pub fn in_ipo(&self, contract: usize) -> bool {
        self.registry
            .get(contract)
            .is_some_and(|d| d.in_ipo(self.clock().epoch))
    }

    /// Whether `contract` runs and exposes user procedure `input_type`
    pub fn has_procedure(&self, contract: usize, input_type: u16) -> bool {
        self.is_running(contract)
            && self
                .registry
                .get(contract)
                .is_some_and(|d| d.procedure(input_type).is_some())
    }

    /// Fault that disabled `contract`, if any
    pub fn fault(&self, contract: usize) -> Option<ContractFault> {
        self.faults.lock().get(contract).copied().flatten()
    }

    /// Re-enable a faulted contract
    pub fn clear_fault(&self, contract: usize) {
        if let Some(slot) = self.faults.lock().get_mut(contract) {
            *slot = None;
        }
    }

    /// Copy of the state blob of `contract`, if it is running
    pub fn state_bytes(&self, contract: usize) -> Option<Vec<u8>> {
        match &*self.storage.get(contract)?.read() {
            ContractStorage::State(state) => Some(state.clone()),
            _ => None,
        }
    }

    /// Whether every execution stack is idle and empty
    pub fn stacks_idle(&self) -> bool {
        self.pool.all_idle_and_empty()
    }

    // ---------------------------------------------------------------------
    // Fee reserves
    // ---------------------------------------------------------------------

    /// Fee reserve of `contract`
    pub fn fee_reserve(&self, contract: usize) -> i64 {
        match &*self.storage[0].read() {
            ContractStorage::State(reserves) => read_i64(reserves, contract * 8),
            _ => 0,
        }
    }

    /// Replace the fee reserve of `contract`
    pub fn set_fee_reserve(&self, contract: usize, amount: i64) {
        self.update_fee_reserve(contract, |_| amount);
    }

    /// Add `amount` to the fee reserve of `contract`
    pub fn add_to_fee_reserve(&self, contract: usize, amount: i64) {
        self.update_fee_reserve(contract, |reserve| reserve.saturating_add(amount));
    }

    fn update_fee_reserve(&self, contract: usize, update: impl FnOnce(i64) -> i64) {
        if contract == 0 || contract >= self.registry.capacity() {
            return;
        }
        if let ContractStorage::State(reserves) = &mut *self.storage[0].write() {
            let next = update(read_i64(reserves, contract * 8));
            write_i64(reserves, contract * 8, next);
        }
        self.mark_dirty(0);
    }

    // ---------------------------------------------------------------------
    // Digest
    // ---------------------------------------------------------------------

    /// Flag the digest leaf of `contract` as changed
    pub fn mark_dirty(&self, contract: usize) {
        self.digests.lock().mark_dirty(contract);
    }

    /// Rehash changed contract slots and return the computer digest
    pub fn recompute_digest(&self) -> Digest {
        self.digests.lock().recompute(&ComputerLeaves(&self.storage))
    }

    /// Computer digest as of the last recompute
    pub fn digest(&self) -> Digest {
        self.digests.lock().root()
    }

    // ---------------------------------------------------------------------
    // Entry points
    // ---------------------------------------------------------------------

    /// Run read-only function `input_type` of `contract` for a request.
    pub fn call_function(&self, contract: usize, input_type: u16, input: &[u8]) -> ContractResult<Vec<u8>> {
        let mut stack = self
            .pool
            .acquire_for_function(self.config.invocation_budget)
            .ok_or(ContractFault::Timeout)?;
        let identity = CallIdentity {
            contract,
            originator: Id::ZERO,
            invocator: Id::ZERO,
            invocation_reward: 0,
        };
        let result = self.execute_function(&mut stack, identity, input_type, input, false, false);
        if let Err(fault) = &result {
            tracing::debug!(contract, input_type, %fault, "Function call failed");
        }
        result
    }

    /// Run user procedure `input_type` of `contract` on behalf of `originator`.
    ///
    /// `invocation_reward` must already have been moved to the contract.
    pub fn invoke_procedure(
        &self,
        contract: usize,
        input_type: u16,
        originator: &Id,
        invocation_reward: i64,
        input: &[u8],
    ) -> ContractResult<Vec<u8>> {
        let identity = CallIdentity {
            contract,
            originator: *originator,
            invocator: *originator,
            invocation_reward,
        };
        self.invoke(identity, EntrySelector::User(input_type), input, false)
    }

    /// Run lifecycle hook `kind` of one contract if it defines it.
    pub fn run_system_procedure(&self, kind: SystemProcedure, contract: usize) -> ContractResult<()> {
        if !self.has_system_procedure(contract, kind) {
            return Ok(());
        }
        let identity = CallIdentity {
            contract,
            originator: Id::ZERO,
            invocator: Id::ZERO,
            invocation_reward: 0,
        };
        self.invoke(identity, EntrySelector::System(kind), &[], false)
            .map(|_| ())
    }

    /// Run lifecycle hook `kind` of every running contract in index order.
    ///
    /// `Initialize` only runs for contracts constructed in the current epoch.
    /// Returns the number of contracts that faulted.
    pub fn run_system_procedures(&self, kind: SystemProcedure) -> usize {
        let epoch = self.clock().epoch;
        let mut faulted = 0;
        for (index, descriptor) in self.registry.iter() {
            if kind == SystemProcedure::Initialize && descriptor.construction_epoch != epoch {
                continue;
            }
            if self.run_system_procedure(kind, index).is_err() {
                faulted += 1;
            }
        }
        faulted
    }

    /// Tell `contract` that energy arrived, if it listens for that.
    pub fn notify_incoming_transfer(&self, contract: usize, transfer: IncomingTransfer) -> ContractResult<()> {
        if transfer.amount <= 0 || !self.has_system_procedure(contract, SystemProcedure::PostIncomingTransfer) {
            return Ok(());
        }
        let identity = CallIdentity {
            contract,
            originator: transfer.source,
            invocator: transfer.source,
            invocation_reward: 0,
        };
        self.invoke(
            identity,
            EntrySelector::System(SystemProcedure::PostIncomingTransfer),
            &transfer.to_bytes(),
            true,
        )
        .map(|_| ())
    }

    fn has_system_procedure(&self, contract: usize, kind: SystemProcedure) -> bool {
        self.is_running(contract)
            && self.fault(contract).is_none()
            && self
                .registry
                .get(contract)
                .is_some_and(|d| d.system_procedure(kind).is_some())
    }

    // ---------------------------------------------------------------------
    // IPO
    // ---------------------------------------------------------------------

    /// Bid for shares of `contract` from a transaction.
    ///
    /// Returns the number of units that entered the book, or -1 if the bid
    /// was invalid or the contract is not accepting bids.
    pub fn bid_in_ipo(&self, contract: usize, source: &Id, price: i64, quantity: u16) -> i64 {
        let Some(placement) = self.place_bid(contract, source, price, quantity) else {
            return -1;
        };
        for (key, amount) in &placement.refunds {
            if let Some(target) = key.contract_index() {
                let refund = IncomingTransfer {
                    source: Id::ZERO,
                    amount: *amount,
                    kind: TransferKind::IpoBidRefund,
                };
                // a faulting hook disables its own contract and is logged there
                let _ = self.notify_incoming_transfer(target, refund);
            }
        }
        i64::from(placement.registered)
    }

    pub(crate) fn place_bid(&self, contract: usize, source: &Id, price: i64, quantity: u16) -> Option<BidPlacement> {
        let descriptor = self.registry.get(contract)?;
        if !descriptor.accepts_bids(self.clock().epoch) {
            return None;
        }
        let slot = self.storage.get(contract)?;
        let mut guard = self.acquire(false, false, || slot.try_write()).ok()?;
        let ContractStorage::Ipo(book) = &mut *guard else {
            return None;
        };
        let placement = self.ledger.bid_in_ipo(book, source, price, quantity)?;
        drop(guard);
        self.mark_dirty(contract);
        Some(placement)
    }

    /// Settle the IPOs of every contract constructed in the epoch after `epoch`.
    ///
    /// The clearing price is the bid in slot `clearing_slot`; the proceeds
    /// become the contract's fee reserve.
    pub fn settle_ipos(&self, epoch: u16, clearing_slot: usize) -> Vec<(usize, IpoSettlement)> {
        let mut settled = Vec::new();
        for (index, descriptor) in self.registry.iter() {
            if !descriptor.accepts_bids(epoch) {
                continue;
            }
            let book = {
                let mut slot = self.storage[index].write();
                match std::mem::replace(&mut *slot, ContractStorage::Empty) {
                    ContractStorage::Ipo(book) => book,
                    other => {
                        *slot = other;
                        continue;
                    }
                }
            };
            self.mark_dirty(index);
            let settlement =
                self.ledger
                    .settle_ipo(&book, &descriptor.asset_name, clearing_slot, self.config.exchange_contract);
            self.set_fee_reserve(index, settlement.proceeds(book.shares()));
            tracing::info!(
                contract = index,
                name = %descriptor.name,
                final_price = settlement.final_price,
                "Contract IPO settled"
            );
            settled.push((index, settlement));
        }
        settled
    }

    // ---------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------

    /// Concatenation of every slot's bytes in index order
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for slot in &self.storage {
            match &*slot.read() {
                ContractStorage::Empty => {}
                ContractStorage::Ipo(book) => out.extend_from_slice(&book.to_bytes()),
                ContractStorage::State(state) => out.extend_from_slice(state),
            }
        }
        out
    }

    /// Overwrite every slot from `bytes`.
    ///
    /// Slot layouts come from the current epoch, so `begin_epoch` must have
    /// run for the epoch the bytes were saved in.
    pub fn restore(&self, bytes: &[u8]) -> Result<()> {
        let mut expected = 0;
        for slot in &self.storage {
            expected += match &*slot.read() {
                ContractStorage::Empty => 0,
                ContractStorage::Ipo(book) => book.shares() * 40,
                ContractStorage::State(state) => state.len(),
            };
        }
        if bytes.len() != expected {
            return Err(LedgerError::decode(format!(
                "contract snapshot has {} bytes, expected {expected}",
                bytes.len()
            )));
        }

        let mut offset = 0;
        for (index, slot) in self.storage.iter().enumerate() {
            let mut slot = slot.write();
            match &mut *slot {
                ContractStorage::Empty => {}
                ContractStorage::Ipo(book) => {
                    let len = book.shares() * 40;
                    *book = IpoBook::from_bytes(book.shares(), &bytes[offset..offset + len])?;
                    offset += len;
                }
                ContractStorage::State(state) => {
                    let len = state.len();
                    state.copy_from_slice(&bytes[offset..offset + len]);
                    offset += len;
                }
            }
            drop(slot);
            self.mark_dirty(index);
        }
        Ok(())
    }

    /// Persist every slot for `epoch`
    pub fn save_snapshot(&self, store: &dyn SnapshotStore, epoch: u16) -> Result<()> {
        store.persist(&epoch_snapshot_name(CONTRACTS_SNAPSHOT, epoch), &self.to_bytes())?;
        tracing::info!(epoch, "Contract states saved");
        Ok(())
    }

    /// Restore every slot saved for `epoch`
    pub fn load_snapshot(&self, store: &dyn SnapshotStore, epoch: u16) -> Result<()> {
        self.restore(&store.load(&epoch_snapshot_name(CONTRACTS_SNAPSHOT, epoch))?)?;
        tracing::info!(epoch, "Contract states loaded");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Execution
    // ---------------------------------------------------------------------

    fn invoke(
        &self,
        identity: CallIdentity,
        selector: EntrySelector,
        input: &[u8],
        callback_running: bool,
    ) -> ContractResult<Vec<u8>> {
        let mut session = Session::new(self.config.action_limit, callback_running);
        let result = {
            let Some(mut stack) = self.pool.acquire_for_procedure(self.config.invocation_budget) else {
                tracing::warn!(contract = identity.contract, "No execution stack available");
                return Err(ContractFault::Timeout);
            };
            self.execute_procedure(&mut stack, &mut session, identity, selector, input, false)
        };

        if let Err(fault) = result {
            self.handle_fault(&mut session, identity.contract, fault);
        }

        let pending = std::mem::take(&mut session.pending);
        if callback_running {
            if !pending.is_empty() {
                tracing::debug!(
                    contract = identity.contract,
                    dropped = pending.len(),
                    "Notifications raised inside a notification are not delivered"
                );
            }
        } else {
            self.deliver(pending);
        }
        result
    }

    fn deliver(&self, pending: Vec<PendingCallback>) {
        for callback in pending {
            // a faulting hook disables its own contract and is logged there
            let _ = self.notify_incoming_transfer(callback.contract, callback.transfer);
        }
    }

    fn handle_fault(&self, session: &mut Session, contract: usize, fault: ContractFault) {
        for (index, bytes) in session.undo.drain(..).rev() {
            if let ContractStorage::State(state) = &mut *self.storage[index].write() {
                state.copy_from_slice(&bytes);
            }
            self.mark_dirty(index);
        }
        let origin = session.fault_origin.unwrap_or(contract);
        if let Some(slot) = self.faults.lock().get_mut(origin) {
            *slot = Some(fault);
        }
        self.ledger.events().record(LedgerEvent::ContractFault {
            contract: origin as u32,
            code: fault.code(),
        });
        tracing::warn!(contract = origin, invoked = contract, %fault, "Contract invocation faulted");
    }

    fn acquire<G>(
        &self,
        nested: bool,
        callback_running: bool,
        try_lock: impl Fn() -> Option<G>,
    ) -> ContractResult<G> {
        for _ in 0..self.config.invocation_budget.max(1) {
            if let Some(guard) = try_lock() {
                return Ok(guard);
            }
            if callback_running {
                return Err(ContractFault::StoppedToResolveDeadlock);
            }
            std::thread::yield_now();
        }
        Err(if nested {
            ContractFault::StoppedToResolveDeadlock
        } else {
            ContractFault::Timeout
        })
    }

    fn callable(&self, contract: usize) -> ContractResult<&ContractDescriptor> {
        if self.fault(contract).is_some() || !self.is_running(contract) {
            return Err(ContractFault::InvalidCallee);
        }
        self.registry.get(contract).ok_or(ContractFault::InvalidCallee)
    }

    fn allocate_frame<H>(stack: &mut StackBuffer, entry: &EntryPoint<H>, input: &[u8]) -> ContractResult<Frame> {
        let input_handle = stack
            .allocate(entry.input_size)
            .ok_or(ContractFault::AllocInputOutputFailed)?;
        let output = stack
            .allocate(entry.output_size)
            .ok_or(ContractFault::AllocInputOutputFailed)?;
        let copied = input.len().min(entry.input_size);
        if let Some(buffer) = stack.bytes_mut(&input_handle) {
            buffer[..copied].copy_from_slice(&input[..copied]);
        }
        let locals = stack
            .allocate(entry.locals_size)
            .ok_or(ContractFault::AllocLocalsFailed)?;
        Ok(Frame {
            input: input_handle,
            output,
            locals,
        })
    }

    pub(crate) fn execute_function(
        &self,
        stack: &mut StackBuffer,
        identity: CallIdentity,
        input_type: u16,
        input: &[u8],
        nested: bool,
        callback_running: bool,
    ) -> ContractResult<Vec<u8>> {
        let depth = stack.depth();
        let result = self.run_function(stack, identity, input_type, input, nested, callback_running);
        let released = stack.unwind_to(depth);
        tracing::trace!(contract = identity.contract, ?released, "Function frame released");
        result
    }

    fn run_function(
        &self,
        stack: &mut StackBuffer,
        identity: CallIdentity,
        input_type: u16,
        input: &[u8],
        nested: bool,
        callback_running: bool,
    ) -> ContractResult<Vec<u8>> {
        let entry: EntryPoint<FunctionHandler> = *self
            .callable(identity.contract)?
            .function(input_type)
            .ok_or(ContractFault::InvalidCallee)?;
        if nested {
            stack
                .allocate(CALL_CONTEXT_SIZE)
                .ok_or(ContractFault::AllocContextOtherFunctionCallFailed)?;
        }
        let frame = Self::allocate_frame(stack, &entry, input)?;
        if !stack.push_rollback(RollbackRecord::ReadLock(identity.contract as u32)) {
            return Err(ContractFault::AllocLocalsFailed);
        }

        let slot = &self.storage[identity.contract];
        let guard = self.acquire(nested, callback_running, || slot.try_read())?;
        let ContractStorage::State(state) = &*guard else {
            return Err(ContractFault::InvalidCallee);
        };
        let mut context = FunctionContext {
            runtime: self,
            identity,
            stack: &mut *stack,
            state: state.as_slice(),
            callback_running,
        };
        (entry.handler)(&mut context, frame)?;
        let output = context.output(&frame).to_vec();
        Ok(output)
    }

    pub(crate) fn execute_procedure(
        &self,
        stack: &mut StackBuffer,
        session: &mut Session,
        identity: CallIdentity,
        selector: EntrySelector,
        input: &[u8],
        nested: bool,
    ) -> ContractResult<Vec<u8>> {
        let depth = stack.depth();
        let result = self.run_procedure(stack, session, identity, selector, input, nested);
        let released = stack.unwind_to(depth);
        if let Err(fault) = &result {
            tracing::debug!(contract = identity.contract, ?released, %fault, "Procedure frame unwound");
        }
        result
    }

    fn run_procedure(
        &self,
        stack: &mut StackBuffer,
        session: &mut Session,
        mut identity: CallIdentity,
        selector: EntrySelector,
        input: &[u8],
        nested: bool,
    ) -> ContractResult<Vec<u8>> {
        let descriptor = self.callable(identity.contract)?;
        let entry = match selector {
            EntrySelector::User(input_type) => descriptor.procedure(input_type),
            EntrySelector::System(kind) => descriptor.system_procedure(kind),
        };
        let entry: EntryPoint<ProcedureHandler> = *entry.ok_or(ContractFault::InvalidCallee)?;
        if nested {
            stack
                .allocate(CALL_CONTEXT_SIZE)
                .ok_or(ContractFault::AllocContextOtherProcedureCallFailed)?;
        }
        let frame = Self::allocate_frame(stack, &entry, input)?;
        if !stack.push_rollback(RollbackRecord::WriteLock(identity.contract as u32)) {
            return Err(ContractFault::AllocLocalsFailed);
        }

        let slot = &self.storage[identity.contract];
        let mut guard = self.acquire(nested, session.callback_running, || slot.try_write())?;
        let ContractStorage::State(state) = &mut *guard else {
            return Err(ContractFault::InvalidCallee);
        };
        session.undo.push((identity.contract, state.clone()));
        self.mark_dirty(identity.contract);

        // the callee is set up, so the caller's reward can move now
        if nested && !session.callback_running {
            let callee = Id::from_contract_index(identity.contract);
            if self.ledger.transfer(&identity.invocator, &callee, identity.invocation_reward) < 0 {
                identity.invocation_reward = 0;
            }
        }

        let mut context = ProcedureContext {
            runtime: self,
            identity,
            stack: &mut *stack,
            session: &mut *session,
            state: state.as_mut_slice(),
        };
        let outcome = (entry.handler)(&mut context, frame);
        if outcome.is_err() {
            // the innermost running contract is blamed
            context.session.fault_origin.get_or_insert(identity.contract);
        }
        outcome?;
        let output = context.output(&frame).to_vec();
        Ok(output)
    }
}
