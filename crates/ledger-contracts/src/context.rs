//! Invocation contexts: the API contract code runs against
//!
//! A `FunctionContext` gives read-only access to the contract's state and
//! the ledger; a `ProcedureContext` additionally moves energy and shares,
//! bids in IPOs and calls procedures of other contracts. Both expose the
//! common queries through the `Qpi` trait.
//!
//! Input, output and locals live on the invocation's execution stack and
//! are reached through the `Frame` handed to the entry point.

use crate::fault::{ContractFault, ContractResult};
use crate::runtime::{ContractRuntime, EntrySelector};
use crate::stack::{StackBuffer, StackHandle};
use ledger_core::params::{MAX_AMOUNT, REJECTED_TRANSFER};
use ledger_core::{Id, TickTimestamp};
use ledger_state::{AssetName, BalanceRecord};

/// Encoded size of an incoming-transfer notification
pub const INCOMING_TRANSFER_INPUT_SIZE: usize = 41;

/// How energy reached a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Plain transaction without a matching procedure
    StandardTransaction,
    /// Invocation reward of a procedure transaction
    ProcedureTransaction,
    /// Transfer made by another contract
    QpiTransfer,
    /// Dividend paid by another contract
    DistributeDividends,
    /// Refund of an outbid IPO bid
    IpoBidRefund,
}

impl TransferKind {
    fn to_byte(self) -> u8 {
        match self {
            Self::StandardTransaction => 0,
            Self::ProcedureTransaction => 1,
            Self::QpiTransfer => 2,
            Self::DistributeDividends => 3,
            Self::IpoBidRefund => 4,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::StandardTransaction,
            1 => Self::ProcedureTransaction,
            2 => Self::QpiTransfer,
            3 => Self::DistributeDividends,
            4 => Self::IpoBidRefund,
            _ => return None,
        })
    }
}

/// Input of the `PostIncomingTransfer` hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomingTransfer {
    /// Sender
    pub source: Id,
    /// Amount received
    pub amount: i64,
    /// How it was sent
    pub kind: TransferKind,
}

impl IncomingTransfer {
    /// `source ‖ amount ‖ kind`
    pub fn to_bytes(&self) -> [u8; INCOMING_TRANSFER_INPUT_SIZE] {
        let mut out = [0u8; INCOMING_TRANSFER_INPUT_SIZE];
        out[..32].copy_from_slice(self.source.as_bytes());
        out[32..40].copy_from_slice(&self.amount.to_le_bytes());
        out[40] = self.kind.to_byte();
        out
    }

    /// Decode a notification
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < INCOMING_TRANSFER_INPUT_SIZE {
            return None;
        }
        Some(Self {
            source: crate::codec::read_id(bytes, 0),
            amount: crate::codec::read_i64(bytes, 32),
            kind: TransferKind::from_byte(bytes[40])?,
        })
    }
}

/// Buffers of one invocation on the execution stack
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub(crate) input: StackHandle,
    pub(crate) output: StackHandle,
    pub(crate) locals: StackHandle,
}

/// Who is running and on whose behalf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallIdentity {
    /// Index of the running contract
    pub contract: usize,
    /// Entity that started the outermost invocation
    pub originator: Id,
    /// Entity or contract that invoked this one
    pub invocator: Id,
    /// Energy passed along with the call
    pub invocation_reward: i64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingCallback {
    pub contract: usize,
    pub transfer: IncomingTransfer,
}

/// Mutable bookkeeping shared by every nested call of one invocation
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub actions: u32,
    pub action_limit: u32,
    pub pending: Vec<PendingCallback>,
    pub undo: Vec<(usize, Vec<u8>)>,
    pub callback_running: bool,
    pub fault_origin: Option<usize>,
}

impl Session {
    pub fn new(action_limit: u32, callback_running: bool) -> Self {
        Self {
            action_limit,
            callback_running,
            ..Self::default()
        }
    }

    fn charge_action(&mut self) -> ContractResult<()> {
        if self.actions >= self.action_limit {
            return Err(ContractFault::TooManyActions);
        }
        self.actions += 1;
        Ok(())
    }
}

/// Queries available to every entry point
pub trait Qpi {
    /// Runtime the invocation runs in
    fn runtime(&self) -> &ContractRuntime;

    /// Caller information
    fn identity(&self) -> &CallIdentity;

    /// Execution stack holding the frame
    fn stack(&self) -> &StackBuffer;

    /// Contract state
    fn state(&self) -> &[u8];

    /// Index of the running contract
    fn contract_index(&self) -> usize {
        self.identity().contract
    }

    /// Id of the running contract
    fn contract_id(&self) -> Id {
        Id::from_contract_index(self.identity().contract)
    }

    /// Entity that started the outermost invocation
    fn originator(&self) -> Id {
        self.identity().originator
    }

    /// Entity or contract that invoked this one
    fn invocator(&self) -> Id {
        self.identity().invocator
    }

    /// Energy passed along with the call
    fn invocation_reward(&self) -> i64 {
        self.identity().invocation_reward
    }

    /// Current tick
    fn tick(&self) -> u32 {
        self.runtime().clock().tick
    }

    /// Current epoch
    fn epoch(&self) -> u16 {
        self.runtime().clock().epoch
    }

    /// Timestamp of the current tick
    fn now(&self) -> TickTimestamp {
        self.runtime().clock().timestamp
    }

    /// Number of computors, which is also the number of shares per contract
    fn computors(&self) -> usize {
        self.runtime().computors()
    }

    /// Balance record of `id`, zeroed when absent
    fn get_entity(&self, id: &Id) -> BalanceRecord {
        self.runtime().ledger().entity(id)
    }

    /// Next entity after `id` in table order
    fn next_id(&self, id: &Id) -> Id {
        self.runtime().ledger().next_id(id)
    }

    /// Previous entity before `id` in table order
    fn prev_id(&self, id: &Id) -> Id {
        self.runtime().ledger().prev_id(id)
    }

    /// Shares of an asset owned and possessed under the given managing contracts
    fn number_of_possessed_shares(
        &self,
        name: &AssetName,
        issuer: &Id,
        owner: &Id,
        possessor: &Id,
        ownership_managing_contract: u16,
        possession_managing_contract: u16,
    ) -> i64 {
        self.runtime().ledger().number_of_possessed_shares(
            name,
            issuer,
            owner,
            possessor,
            ownership_managing_contract,
            possession_managing_contract,
        )
    }

    /// Input bytes, padded to the entry point's input size
    fn input(&self, frame: &Frame) -> &[u8] {
        self.stack().bytes(&frame.input).unwrap_or_default()
    }

    /// Output bytes written so far
    fn output(&self, frame: &Frame) -> &[u8] {
        self.stack().bytes(&frame.output).unwrap_or_default()
    }

    /// Scratch bytes
    fn locals(&self, frame: &Frame) -> &[u8] {
        self.stack().bytes(&frame.locals).unwrap_or_default()
    }

    /// Fail the invocation with a contract-chosen code
    fn abort<T>(&self, code: u32) -> ContractResult<T> {
        Err(ContractFault::Aborted(code))
    }
}

/// Context of a read-only entry point
pub struct FunctionContext<'a> {
    pub(crate) runtime: &'a ContractRuntime,
    pub(crate) identity: CallIdentity,
    pub(crate) stack: &'a mut StackBuffer,
    pub(crate) state: &'a [u8],
    pub(crate) callback_running: bool,
}

impl Qpi for FunctionContext<'_> {
    fn runtime(&self) -> &ContractRuntime {
        self.runtime
    }

    fn identity(&self) -> &CallIdentity {
        &self.identity
    }

    fn stack(&self) -> &StackBuffer {
        &*self.stack
    }

    fn state(&self) -> &[u8] {
        self.state
    }
}

impl FunctionContext<'_> {
    /// Writable output buffer
    pub fn output_mut(&mut self, frame: &Frame) -> &mut [u8] {
        self.stack.bytes_mut(&frame.output).unwrap_or_default()
    }

    /// Writable scratch buffer
    pub fn locals_mut(&mut self, frame: &Frame) -> &mut [u8] {
        self.stack.bytes_mut(&frame.locals).unwrap_or_default()
    }

    /// Call a function of a lower-index contract and return its output
    pub fn call_function(&mut self, callee: usize, input_type: u16, input: &[u8]) -> ContractResult<Vec<u8>> {
        if callee >= self.identity.contract && !self.callback_running {
            return Err(ContractFault::InvalidCallee);
        }
        let identity = CallIdentity {
            contract: callee,
            originator: self.identity.originator,
            invocator: self.contract_id(),
            invocation_reward: 0,
        };
        self.runtime
            .execute_function(self.stack, identity, input_type, input, true, self.callback_running)
    }
}

/// Context of a state-changing entry point
pub struct ProcedureContext<'a> {
    pub(crate) runtime: &'a ContractRuntime,
    pub(crate) identity: CallIdentity,
    pub(crate) stack: &'a mut StackBuffer,
    pub(crate) session: &'a mut Session,
    pub(crate) state: &'a mut [u8],
}

impl Qpi for ProcedureContext<'_> {
    fn runtime(&self) -> &ContractRuntime {
        self.runtime
    }

    fn identity(&self) -> &CallIdentity {
        &self.identity
    }

    fn stack(&self) -> &StackBuffer {
        &*self.stack
    }

    fn state(&self) -> &[u8] {
        &*self.state
    }
}

impl ProcedureContext<'_> {
    /// Writable contract state
    pub fn state_mut(&mut self) -> &mut [u8] {
        &mut *self.state
    }

    /// Writable output buffer
    pub fn output_mut(&mut self, frame: &Frame) -> &mut [u8] {
        self.stack.bytes_mut(&frame.output).unwrap_or_default()
    }

    /// Writable scratch buffer
    pub fn locals_mut(&mut self, frame: &Frame) -> &mut [u8] {
        self.stack.bytes_mut(&frame.locals).unwrap_or_default()
    }

    fn schedule_notification(&mut self, source: Id, destination: &Id, amount: i64, kind: TransferKind) {
        if let Some(contract) = destination.contract_index() {
            if self.runtime.registry().get(contract).is_some() {
                self.session.pending.push(PendingCallback {
                    contract,
                    transfer: IncomingTransfer { source, amount, kind },
                });
            }
        }
    }

    /// Transfer energy from this contract to `destination`.
    ///
    /// Returns the contract's remaining balance, or a negative value if
    /// nothing was moved (see `LedgerState::transfer`). Transfers to
    /// contracts are refused with `REJECTED_TRANSFER` while a
    /// notification hook is running.
    pub fn transfer(&mut self, destination: &Id, amount: i64) -> ContractResult<i64> {
        if self.session.callback_running && destination.contract_index().is_some() {
            return Ok(REJECTED_TRANSFER);
        }
        self.session.charge_action()?;
        let remaining = self.runtime.ledger().transfer(&self.contract_id(), destination, amount);
        if remaining >= 0 {
            self.schedule_notification(self.contract_id(), destination, amount, TransferKind::QpiTransfer);
        }
        Ok(remaining)
    }

    /// Burn energy into this contract's fee reserve. Same return convention as `transfer`.
    pub fn burn(&mut self, amount: i64) -> ContractResult<i64> {
        if self.identity.contract == 0 {
            return Ok(REJECTED_TRANSFER);
        }
        self.session.charge_action()?;
        let remaining = self.runtime.ledger().burn(&self.contract_id(), amount);
        if remaining >= 0 {
            self.runtime.add_to_fee_reserve(self.identity.contract, amount);
        }
        Ok(remaining)
    }

    /// Issue a new asset managed by this contract.
    ///
    /// The issuer must be this contract or its invocator. Returns the number
    /// of shares issued, or 0 if the name, issuer or share count is invalid
    /// or the asset already exists.
    pub fn issue_asset(
        &mut self,
        name: &AssetName,
        issuer: &Id,
        decimals: i8,
        unit: [u8; 7],
        units: i64,
    ) -> ContractResult<i64> {
        if !name.is_valid() || (*issuer != self.contract_id() && *issuer != self.identity.invocator) {
            return Ok(0);
        }
        if units <= 0 || units > MAX_AMOUNT {
            return Ok(0);
        }
        let issued = self
            .runtime
            .ledger()
            .issue_asset(issuer, name, decimals, unit, units, self.managing_contract());
        Ok(issued.map_or(0, |i| i.units))
    }

    /// Transfer shares managed by this contract to `new_owner`.
    ///
    /// Returns the possessor's remaining shares, or a negative value if
    /// nothing was moved (see `LedgerState::transfer_share_ownership_and_possession`).
    pub fn transfer_share_ownership_and_possession(
        &mut self,
        name: &AssetName,
        issuer: &Id,
        owner: &Id,
        possessor: &Id,
        units: i64,
        new_owner: &Id,
    ) -> ContractResult<i64> {
        Ok(self.runtime.ledger().transfer_share_ownership_and_possession(
            name,
            issuer,
            owner,
            possessor,
            units,
            new_owner,
            self.managing_contract(),
        ))
    }

    fn managing_contract(&self) -> u16 {
        u16::try_from(self.identity.contract).unwrap_or(u16::MAX)
    }

    /// Bid for shares of a higher-index contract in its IPO.
    ///
    /// Returns the number of units that entered the book, or -1.
    pub fn bid_in_ipo(&mut self, contract: usize, price: i64, quantity: u16) -> ContractResult<i64> {
        if self.session.callback_running || self.identity.contract >= contract {
            return Ok(-1);
        }
        if self.runtime.ledger().spectrum_index(&self.contract_id()).is_none() {
            return Ok(-1);
        }
        self.session.charge_action()?;
        let Some(placement) = self.runtime.place_bid(contract, &self.contract_id(), price, quantity) else {
            return Ok(-1);
        };
        for (key, amount) in placement.refunds {
            self.schedule_notification(Id::ZERO, &key, amount, TransferKind::IpoBidRefund);
        }
        Ok(i64::from(placement.registered))
    }

    /// Pay `amount_per_share` to every possessor of this contract's shares.
    ///
    /// Fails without any change if the total for all shares exceeds
    /// `MAX_AMOUNT` or the contract's balance.
    pub fn distribute_dividends(&mut self, amount_per_share: i64) -> ContractResult<bool> {
        let shares = self.runtime.computors() as i64;
        let Some(total) = amount_per_share.checked_mul(shares) else {
            return Ok(false);
        };
        if amount_per_share < 0 || total > MAX_AMOUNT {
            return Ok(false);
        }
        let ledger = self.runtime.ledger();
        let Some(index) = ledger.spectrum_index(&self.contract_id()) else {
            return Ok(total == 0);
        };
        if ledger.energy(index) < total {
            return Ok(false);
        }
        if amount_per_share == 0 {
            return Ok(true);
        }

        let Some(descriptor) = self.runtime.registry().get(self.identity.contract) else {
            return Ok(false);
        };
        let payouts: Vec<(Id, i64)> = ledger
            .possessors(&Id::ZERO, &descriptor.asset_name)
            .into_iter()
            .filter(|(holder, _)| !holder.is_zero())
            .map(|(holder, units)| (holder, units * amount_per_share))
            .collect();
        for _ in &payouts {
            self.session.charge_action()?;
        }
        if !ledger.distribute(&self.contract_id(), &payouts) {
            return Ok(false);
        }
        for (holder, amount) in &payouts {
            self.schedule_notification(self.contract_id(), holder, *amount, TransferKind::DistributeDividends);
        }
        Ok(true)
    }

    /// Call a function of a lower-index contract and return its output
    pub fn call_function(&mut self, callee: usize, input_type: u16, input: &[u8]) -> ContractResult<Vec<u8>> {
        if callee >= self.identity.contract && !self.session.callback_running {
            return Err(ContractFault::InvalidCallee);
        }
        let identity = CallIdentity {
            contract: callee,
            originator: self.identity.originator,
            invocator: self.contract_id(),
            invocation_reward: 0,
        };
        self.runtime.execute_function(
            self.stack,
            identity,
            input_type,
            input,
            true,
            self.session.callback_running,
        )
    }

    /// Call a procedure of a lower-index contract, passing `invocation_reward`.
    ///
    /// The reward moves only once the callee's frame and lock are in place;
    /// if that transfer fails the call still happens with a reward of zero.
    pub fn call_procedure(
        &mut self,
        callee: usize,
        input_type: u16,
        input: &[u8],
        invocation_reward: i64,
    ) -> ContractResult<Vec<u8>> {
        if callee >= self.identity.contract && !self.session.callback_running {
            return Err(ContractFault::InvalidCallee);
        }
        let reward = if self.session.callback_running {
            0
        } else {
            self.session.charge_action()?;
            invocation_reward
        };
        let identity = CallIdentity {
            contract: callee,
            originator: self.identity.originator,
            invocator: self.contract_id(),
            invocation_reward: reward,
        };
        self.runtime.execute_procedure(
            self.stack,
            self.session,
            identity,
            EntrySelector::User(input_type),
            input,
            true,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incoming_transfer_encoding() {
        let transfer = IncomingTransfer {
            source: Id([4; 32]),
            amount: 99,
            kind: TransferKind::IpoBidRefund,
        };
        let bytes = transfer.to_bytes();
        assert_eq!(IncomingTransfer::from_bytes(&bytes), Some(transfer));
        assert_eq!(IncomingTransfer::from_bytes(&bytes[..40]), None);
        let mut bad = bytes;
        bad[40] = 77;
        assert_eq!(IncomingTransfer::from_bytes(&bad), None);
    }

    #[test]
    fn test_session_action_budget() {
        let mut session = Session::new(2, false);
        assert!(session.charge_action().is_ok());
        assert!(session.charge_action().is_ok());
        assert_eq!(session.charge_action(), Err(ContractFault::TooManyActions));
    }
}
