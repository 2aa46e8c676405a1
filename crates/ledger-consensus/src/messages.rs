//! Wire messages exchanged between computors and clients
//!
//! Every message has one canonical little-endian encoding. Signed messages
//! sign the digest of their encoding without the trailing signature; while
//! signing, a computor index is XORed with the message type so a signature
//! over one kind of message never verifies as another.
//!
//! Sizes that depend on the network (computor count, digest slots per
//! tick, contract count) come from `WireDimensions`.

use crate::error::{ConsensusError, Result};
use ledger_core::params::{
    MAX_INPUT_SIZE, MAX_NUMBER_OF_CONTRACTS, NUMBER_OF_COMPUTORS, NUMBER_OF_TRANSACTIONS_PER_TICK, SIGNATURE_SIZE,
};
use ledger_core::hash::hash_parts;
use ledger_core::time::TIMESTAMP_SIZE;
use ledger_core::{hash, Digest, Id, SignatureBytes, SignatureScheme, SigningIdentity, TickTimestamp, ZERO_DIGEST};
use ledger_state::spectrum::BALANCE_RECORD_SIZE;
use ledger_state::BalanceRecord;

/// Type byte of each message
pub mod message_type {
    /// Computor vote on a tick
    pub const BROADCAST_TICK: u8 = 3;
    /// Leader's transaction set for a future tick
    pub const BROADCAST_FUTURE_TICK_DATA: u8 = 8;
    /// Ask for votes not yet held
    pub const REQUEST_QUORUM_TICK: u8 = 14;
    /// Ask for a tick's data
    pub const REQUEST_TICK_DATA: u8 = 16;
    /// Signed transaction
    pub const BROADCAST_TRANSACTION: u8 = 24;
    /// Ask for the current tick info
    pub const REQUEST_CURRENT_TICK_INFO: u8 = 27;
    /// Current tick info
    pub const RESPOND_CURRENT_TICK_INFO: u8 = 28;
    /// Ask for a tick's transactions not yet held
    pub const REQUEST_TICK_TRANSACTIONS: u8 = 29;
    /// Ask for an entity's balance record
    pub const REQUEST_ENTITY: u8 = 31;
    /// Balance record with its Merkle siblings
    pub const RESPOND_ENTITY: u8 = 32;
    /// Run a read-only contract function
    pub const REQUEST_CONTRACT_FUNCTION: u8 = 42;
    /// Output of a contract function, empty on failure
    pub const RESPOND_CONTRACT_FUNCTION: u8 = 43;
}

/// Network-dependent message sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireDimensions {
    /// Computors, and so bits in a vote bitmap
    pub computors: usize,
    /// Transaction digest slots per tick
    pub transactions_per_tick: usize,
    /// Contract fee slots per tick
    pub contracts: usize,
}

impl Default for WireDimensions {
    fn default() -> Self {
        Self {
            computors: NUMBER_OF_COMPUTORS,
            transactions_per_tick: NUMBER_OF_TRANSACTIONS_PER_TICK,
            contracts: MAX_NUMBER_OF_CONTRACTS,
        }
    }
}

impl WireDimensions {
    /// Bytes of a one-bit-per-computor bitmap
    pub fn vote_flag_bytes(&self) -> usize {
        self.computors.div_ceil(8)
    }

    /// Bytes of a one-bit-per-transaction-slot bitmap
    pub fn transaction_flag_bytes(&self) -> usize {
        self.transactions_per_tick.div_ceil(8)
    }

    /// Encoded size of a `TickData`
    pub fn tick_data_size(&self) -> usize {
        TICK_HEADER_SIZE + 32 + self.transactions_per_tick * 32 + self.contracts * 8 + SIGNATURE_SIZE
    }
}

/// `computorIndex ‖ epoch ‖ tick ‖ timestamp`
const TICK_HEADER_SIZE: usize = 8 + TIMESTAMP_SIZE;

/// Encoded size of a `TickVote`
pub const TICK_VOTE_SIZE: usize = TICK_HEADER_SIZE + 4 * 4 + 8 * 32 + SIGNATURE_SIZE;

/// Encoded size of a transaction without input and signature
pub const TRANSACTION_HEADER_SIZE: usize = 32 + 32 + 8 + 4 + 2 + 2;

/// Encoded size of `CurrentTickInfo`
pub const CURRENT_TICK_INFO_SIZE: usize = 16;

// -------------------------------------------------------------------------
// Byte cursor
// -------------------------------------------------------------------------

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                ConsensusError::malformed(format!(
                    "needs {len} bytes at offset {}, message has {}",
                    self.offset,
                    self.bytes.len()
                ))
            })?;
        let out = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn digest(&mut self) -> Result<Digest> {
        self.array()
    }

    fn id(&mut self) -> Result<Id> {
        Ok(Id(self.array()?))
    }

    fn timestamp(&mut self) -> Result<TickTimestamp> {
        Ok(TickTimestamp::from_bytes(&self.array()?))
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.bytes[self.offset..];
        self.offset = self.bytes.len();
        out
    }

    fn finish(self) -> Result<()> {
        if self.offset == self.bytes.len() {
            Ok(())
        } else {
            Err(ConsensusError::malformed(format!(
                "{} trailing bytes",
                self.bytes.len() - self.offset
            )))
        }
    }
}

fn signed_digest(mut payload: Vec<u8>, xor_type: Option<u8>) -> Digest {
    if let Some(kind) = xor_type {
        payload[0] ^= kind;
    }
    hash(&payload)
}

// -------------------------------------------------------------------------
// Tick vote
// -------------------------------------------------------------------------

/// A computor's signed vote on the outcome of one tick.
///
/// The `prev_*` digests are the partition roots before the tick, the
/// `salted_*` digests are the roots after it salted with the voter's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickVote {
    /// Voting computor
    pub computor_index: u16,
    /// Epoch of the tick
    pub epoch: u16,
    /// Tick voted on
    pub tick: u32,
    /// Tick time agreed so far
    pub timestamp: TickTimestamp,
    /// Resource-test digest before the tick
    pub prev_resource_testing_digest: u32,
    /// Resource-test digest salted with the voter's key
    pub salted_resource_testing_digest: u32,
    /// Transaction-body digest before the tick
    pub prev_transaction_body_digest: u32,
    /// Transaction-body digest salted with the voter's key
    pub salted_transaction_body_digest: u32,
    /// Spectrum root before the tick
    pub prev_spectrum_digest: Digest,
    /// Universe root before the tick
    pub prev_universe_digest: Digest,
    /// Computer root before the tick
    pub prev_computer_digest: Digest,
    /// Salted spectrum root after the tick
    pub salted_spectrum_digest: Digest,
    /// Salted universe root after the tick
    pub salted_universe_digest: Digest,
    /// Salted computer root after the tick
    pub salted_computer_digest: Digest,
    /// Digest of the tick's data, zero for an empty tick
    pub transaction_digest: Digest,
    /// Digest of the next tick's data as seen by the voter
    pub expected_next_tick_transaction_digest: Digest,
    /// Signature over everything above
    pub signature: SignatureBytes,
}

impl Default for TickVote {
    fn default() -> Self {
        Self {
            computor_index: 0,
            epoch: 0,
            tick: 0,
            timestamp: TickTimestamp::default(),
            prev_resource_testing_digest: 0,
            salted_resource_testing_digest: 0,
            prev_transaction_body_digest: 0,
            salted_transaction_body_digest: 0,
            prev_spectrum_digest: ZERO_DIGEST,
            prev_universe_digest: ZERO_DIGEST,
            prev_computer_digest: ZERO_DIGEST,
            salted_spectrum_digest: ZERO_DIGEST,
            salted_universe_digest: ZERO_DIGEST,
            salted_computer_digest: ZERO_DIGEST,
            transaction_digest: ZERO_DIGEST,
            expected_next_tick_transaction_digest: ZERO_DIGEST,
            signature: [0; SIGNATURE_SIZE],
        }
    }
}

impl TickVote {
    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TICK_VOTE_SIZE);
        out.extend_from_slice(&self.computor_index.to_le_bytes());
        out.extend_from_slice(&self.epoch.to_le_bytes());
        out.extend_from_slice(&self.tick.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_bytes());
        out.extend_from_slice(&self.prev_resource_testing_digest.to_le_bytes());
        out.extend_from_slice(&self.salted_resource_testing_digest.to_le_bytes());
        out.extend_from_slice(&self.prev_transaction_body_digest.to_le_bytes());
        out.extend_from_slice(&self.salted_transaction_body_digest.to_le_bytes());
        for digest in [
            &self.prev_spectrum_digest,
            &self.prev_universe_digest,
            &self.prev_computer_digest,
            &self.salted_spectrum_digest,
            &self.salted_universe_digest,
            &self.salted_computer_digest,
            &self.transaction_digest,
            &self.expected_next_tick_transaction_digest,
        ] {
            out.extend_from_slice(digest);
        }
        out
    }

    /// Canonical encoding
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.payload();
        out.extend_from_slice(&self.signature);
        out
    }

    /// Decode a vote
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let vote = Self {
            computor_index: r.u16()?,
            epoch: r.u16()?,
            tick: r.u32()?,
            timestamp: r.timestamp()?,
            prev_resource_testing_digest: r.u32()?,
            salted_resource_testing_digest: r.u32()?,
            prev_transaction_body_digest: r.u32()?,
            salted_transaction_body_digest: r.u32()?,
            prev_spectrum_digest: r.digest()?,
            prev_universe_digest: r.digest()?,
            prev_computer_digest: r.digest()?,
            salted_spectrum_digest: r.digest()?,
            salted_universe_digest: r.digest()?,
            salted_computer_digest: r.digest()?,
            transaction_digest: r.digest()?,
            expected_next_tick_transaction_digest: r.digest()?,
            signature: r.array()?,
        };
        r.finish()?;
        Ok(vote)
    }

    /// Digest the voter signs
    pub fn signing_digest(&self) -> Digest {
        signed_digest(self.payload(), Some(message_type::BROADCAST_TICK))
    }

    /// Sign with the voter's identity
    pub fn sign(&mut self, identity: &SigningIdentity) {
        self.signature = identity.sign(&self.signing_digest());
    }

    /// Whether the signature is `key`'s
    pub fn verify(&self, scheme: &dyn SignatureScheme, key: &Id) -> bool {
        scheme.verify(key, &self.signing_digest(), &self.signature)
    }

    /// Whether two votes commit to the same content, ignoring signatures
    pub fn same_content(&self, other: &TickVote) -> bool {
        self.payload() == other.payload()
    }
}

// -------------------------------------------------------------------------
// Tick data
// -------------------------------------------------------------------------

/// A tick leader's proposal of the transactions of a future tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickData {
    /// Leading computor
    pub computor_index: u16,
    /// Epoch of the tick
    pub epoch: u16,
    /// Tick proposed for
    pub tick: u32,
    /// Leader's clock when proposing
    pub timestamp: TickTimestamp,
    /// Digest binding the proposal to the partition roots it was built on
    pub timelock: Digest,
    /// Transaction digests in execution order, zero for unused slots
    pub transaction_digests: Vec<Digest>,
    /// Fee charged to each contract
    pub contract_fees: Vec<i64>,
    /// Signature over everything above
    pub signature: SignatureBytes,
}

impl TickData {
    /// Unsigned proposal with all slots empty
    pub fn new(
        dims: &WireDimensions,
        computor_index: u16,
        epoch: u16,
        tick: u32,
        timestamp: TickTimestamp,
        timelock: Digest,
    ) -> Self {
        Self {
            computor_index,
            epoch,
            tick,
            timestamp,
            timelock,
            transaction_digests: vec![ZERO_DIGEST; dims.transactions_per_tick],
            contract_fees: vec![0; dims.contracts],
            signature: [0; SIGNATURE_SIZE],
        }
    }

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            TICK_HEADER_SIZE + 32 + self.transaction_digests.len() * 32 + self.contract_fees.len() * 8,
        );
        out.extend_from_slice(&self.computor_index.to_le_bytes());
        out.extend_from_slice(&self.epoch.to_le_bytes());
        out.extend_from_slice(&self.tick.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_bytes());
        out.extend_from_slice(&self.timelock);
        for digest in &self.transaction_digests {
            out.extend_from_slice(digest);
        }
        for fee in &self.contract_fees {
            out.extend_from_slice(&fee.to_le_bytes());
        }
        out
    }

    /// Canonical encoding
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.payload();
        out.extend_from_slice(&self.signature);
        out
    }

    /// Decode tick data sized by `dims`
    pub fn from_bytes(bytes: &[u8], dims: &WireDimensions) -> Result<Self> {
        if bytes.len() != dims.tick_data_size() {
            return Err(ConsensusError::malformed(format!(
                "tick data must be {} bytes, got {}",
                dims.tick_data_size(),
                bytes.len()
            )));
        }
        let mut r = Reader::new(bytes);
        let computor_index = r.u16()?;
        let epoch = r.u16()?;
        let tick = r.u32()?;
        let timestamp = r.timestamp()?;
        let timelock = r.digest()?;
        let transaction_digests = (0..dims.transactions_per_tick)
            .map(|_| r.digest())
            .collect::<Result<Vec<_>>>()?;
        let contract_fees = (0..dims.contracts).map(|_| r.i64()).collect::<Result<Vec<_>>>()?;
        let signature = r.array()?;
        r.finish()?;
        Ok(Self {
            computor_index,
            epoch,
            tick,
            timestamp,
            timelock,
            transaction_digests,
            contract_fees,
            signature,
        })
    }

    /// Digest the leader signs
    pub fn signing_digest(&self) -> Digest {
        signed_digest(self.payload(), Some(message_type::BROADCAST_FUTURE_TICK_DATA))
    }

    /// Sign with the leader's identity
    pub fn sign(&mut self, identity: &SigningIdentity) {
        self.signature = identity.sign(&self.signing_digest());
    }

    /// Whether the signature is `key`'s
    pub fn verify(&self, scheme: &dyn SignatureScheme, key: &Id) -> bool {
        scheme.verify(key, &self.signing_digest(), &self.signature)
    }

    /// Digest of the whole proposal, signature included. Votes refer to
    /// tick data by this value.
    pub fn content_digest(&self) -> Digest {
        hash(&self.to_bytes())
    }

    /// Number of non-empty transaction slots
    pub fn transaction_count(&self) -> usize {
        self.transaction_digests.iter().filter(|d| **d != ZERO_DIGEST).count()
    }

    /// The timelock for tick data built on the given partition roots
    pub fn timelock_for(spectrum: &Digest, universe: &Digest, computer: &Digest) -> Digest {
        hash_parts(&[&spectrum[..], &universe[..], &computer[..]])
    }
}

// -------------------------------------------------------------------------
// Transaction
// -------------------------------------------------------------------------

/// A signed transfer, optionally invoking a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Paying entity, also the signing key
    pub source: Id,
    /// Receiving entity or contract
    pub destination: Id,
    /// Energy moved
    pub amount: i64,
    /// Tick the transaction is scheduled for
    pub tick: u32,
    /// Contract entry point, 0 for a plain transfer
    pub input_type: u16,
    /// Contract input
    pub input: Vec<u8>,
    /// Signature of `source`
    pub signature: SignatureBytes,
}

impl Transaction {
    /// Unsigned transaction
    pub fn new(source: Id, destination: Id, amount: i64, tick: u32, input_type: u16, input: Vec<u8>) -> Self {
        Self {
            source,
            destination,
            amount,
            tick,
            input_type,
            input,
            signature: [0; SIGNATURE_SIZE],
        }
    }

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TRANSACTION_HEADER_SIZE + self.input.len());
        out.extend_from_slice(self.source.as_bytes());
        out.extend_from_slice(self.destination.as_bytes());
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.tick.to_le_bytes());
        out.extend_from_slice(&self.input_type.to_le_bytes());
        out.extend_from_slice(&(self.input.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.input);
        out
    }

    /// Canonical encoding
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.payload();
        out.extend_from_slice(&self.signature);
        out
    }

    /// Decode a transaction; the declared input size must match exactly
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let source = r.id()?;
        let destination = r.id()?;
        let amount = r.i64()?;
        let tick = r.u32()?;
        let input_type = r.u16()?;
        let input_size = usize::from(r.u16()?);
        if input_size > MAX_INPUT_SIZE {
            return Err(ConsensusError::malformed(format!("input of {input_size} bytes")));
        }
        let input = r.take(input_size)?.to_vec();
        let signature = r.array()?;
        r.finish()?;
        Ok(Self {
            source,
            destination,
            amount,
            tick,
            input_type,
            input,
            signature,
        })
    }

    /// Amount and input size are within protocol limits
    pub fn is_valid(&self) -> bool {
        (0..=ledger_core::params::MAX_AMOUNT).contains(&self.amount) && self.input.len() <= MAX_INPUT_SIZE
    }

    /// Sign as `identity`, which must be the source
    pub fn sign(&mut self, identity: &SigningIdentity) {
        self.signature = identity.sign(&signed_digest(self.payload(), None));
    }

    /// Whether the source signed this transaction
    pub fn verify(&self, scheme: &dyn SignatureScheme) -> bool {
        scheme.verify(&self.source, &signed_digest(self.payload(), None), &self.signature)
    }

    /// Digest referenced by tick data, signature included
    pub fn digest(&self) -> Digest {
        hash(&self.to_bytes())
    }
}

// -------------------------------------------------------------------------
// Requests and responses
// -------------------------------------------------------------------------

/// Ask peers for votes on `tick`; set bits mark computors already held
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestQuorumTick {
    /// Tick asked about
    pub tick: u32,
    /// One bit per computor
    pub vote_flags: Vec<u8>,
}

impl RequestQuorumTick {
    /// Whether the requester already holds `computor`'s vote
    pub fn has_vote(&self, computor: usize) -> bool {
        self.vote_flags
            .get(computor / 8)
            .is_some_and(|byte| byte & (1 << (computor % 8)) != 0)
    }
}

/// Ask peers for the data of `tick`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTickData {
    /// Tick asked about
    pub tick: u32,
}

/// Ask peers for transactions of `tick`; set bits mark slots already held
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTickTransactions {
    /// Tick asked about
    pub tick: u32,
    /// One bit per transaction slot
    pub transaction_flags: Vec<u8>,
}

impl RequestTickTransactions {
    /// Whether the requester already holds the transaction in `slot`
    pub fn has_transaction(&self, slot: usize) -> bool {
        self.transaction_flags
            .get(slot / 8)
            .is_some_and(|byte| byte & (1 << (slot % 8)) != 0)
    }
}

/// Progress of a node's tick loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CurrentTickInfo {
    /// Milliseconds the last tick took
    pub tick_duration: u16,
    /// Current epoch
    pub epoch: u16,
    /// Current tick
    pub tick: u32,
    /// Votes matching this node's etalon
    pub aligned_votes: u16,
    /// Votes received that do not match it
    pub misaligned_votes: u16,
    /// First tick of the epoch
    pub initial_tick: u32,
}

impl CurrentTickInfo {
    fn to_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CURRENT_TICK_INFO_SIZE);
        out.extend_from_slice(&self.tick_duration.to_le_bytes());
        out.extend_from_slice(&self.epoch.to_le_bytes());
        out.extend_from_slice(&self.tick.to_le_bytes());
        out.extend_from_slice(&self.aligned_votes.to_le_bytes());
        out.extend_from_slice(&self.misaligned_votes.to_le_bytes());
        out.extend_from_slice(&self.initial_tick.to_le_bytes());
        out
    }
}

/// Ask for an entity's balance record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestEntity {
    /// Entity asked about
    pub id: Id,
}

/// An entity's balance with proof of inclusion in the spectrum root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespondEntity {
    /// Balance record, zeroed when absent
    pub entity: BalanceRecord,
    /// Tick the answer reflects
    pub tick: u32,
    /// Slot of the entity, -1 when absent
    pub spectrum_index: i32,
    /// Merkle siblings of the slot, leaf level first
    pub siblings: Vec<Digest>,
}

/// Run a read-only contract function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContractFunction {
    /// Contract index
    pub contract_index: u32,
    /// Function id
    pub input_type: u16,
    /// Function input
    pub input: Vec<u8>,
}

/// Output of a contract function, empty if it failed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RespondContractFunction {
    /// Function output
    pub output: Vec<u8>,
}

// -------------------------------------------------------------------------
// Framing
// -------------------------------------------------------------------------

/// Any message, framed by its type byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Computor vote
    Vote(TickVote),
    /// Future tick data
    TickData(TickData),
    /// Transaction
    Transaction(Transaction),
    /// Vote request
    RequestQuorumTick(RequestQuorumTick),
    /// Tick data request
    RequestTickData(RequestTickData),
    /// Transaction request
    RequestTickTransactions(RequestTickTransactions),
    /// Tick info request
    RequestCurrentTickInfo,
    /// Tick info
    RespondCurrentTickInfo(CurrentTickInfo),
    /// Entity request
    RequestEntity(RequestEntity),
    /// Entity response
    RespondEntity(RespondEntity),
    /// Contract function request
    RequestContractFunction(RequestContractFunction),
    /// Contract function response
    RespondContractFunction(RespondContractFunction),
}

impl Message {
    /// Type byte of this message
    pub fn message_type(&self) -> u8 {
        use message_type::*;
        match self {
            Self::Vote(_) => BROADCAST_TICK,
            Self::TickData(_) => BROADCAST_FUTURE_TICK_DATA,
            Self::Transaction(_) => BROADCAST_TRANSACTION,
            Self::RequestQuorumTick(_) => REQUEST_QUORUM_TICK,
            Self::RequestTickData(_) => REQUEST_TICK_DATA,
            Self::RequestTickTransactions(_) => REQUEST_TICK_TRANSACTIONS,
            Self::RequestCurrentTickInfo => REQUEST_CURRENT_TICK_INFO,
            Self::RespondCurrentTickInfo(_) => RESPOND_CURRENT_TICK_INFO,
            Self::RequestEntity(_) => REQUEST_ENTITY,
            Self::RespondEntity(_) => RESPOND_ENTITY,
            Self::RequestContractFunction(_) => REQUEST_CONTRACT_FUNCTION,
            Self::RespondContractFunction(_) => RESPOND_CONTRACT_FUNCTION,
        }
    }

    /// Type byte followed by the canonical payload
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.message_type()];
        match self {
            Self::Vote(vote) => out.extend(vote.to_bytes()),
            Self::TickData(data) => out.extend(data.to_bytes()),
            Self::Transaction(transaction) => out.extend(transaction.to_bytes()),
            Self::RequestQuorumTick(request) => {
                out.extend_from_slice(&request.tick.to_le_bytes());
                out.extend_from_slice(&request.vote_flags);
            }
            Self::RequestTickData(request) => out.extend_from_slice(&request.tick.to_le_bytes()),
            Self::RequestTickTransactions(request) => {
                out.extend_from_slice(&request.tick.to_le_bytes());
                out.extend_from_slice(&request.transaction_flags);
            }
            Self::RequestCurrentTickInfo => {}
            Self::RespondCurrentTickInfo(info) => out.extend(info.to_bytes()),
            Self::RequestEntity(request) => out.extend_from_slice(request.id.as_bytes()),
            Self::RespondEntity(response) => {
                out.extend_from_slice(&response.entity.to_bytes());
                out.extend_from_slice(&response.tick.to_le_bytes());
                out.extend_from_slice(&response.spectrum_index.to_le_bytes());
                for sibling in &response.siblings {
                    out.extend_from_slice(sibling);
                }
            }
            Self::RequestContractFunction(request) => {
                out.extend_from_slice(&request.contract_index.to_le_bytes());
                out.extend_from_slice(&request.input_type.to_le_bytes());
                out.extend_from_slice(&(request.input.len() as u16).to_le_bytes());
                out.extend_from_slice(&request.input);
            }
            Self::RespondContractFunction(response) => out.extend_from_slice(&response.output),
        }
        out
    }

    /// Decode a framed message
    pub fn decode(bytes: &[u8], dims: &WireDimensions) -> Result<Self> {
        let (&kind, payload) = bytes
            .split_first()
            .ok_or_else(|| ConsensusError::malformed("empty message"))?;
        let mut r = Reader::new(payload);
        let message = match kind {
            message_type::BROADCAST_TICK => return Ok(Self::Vote(TickVote::from_bytes(payload)?)),
            message_type::BROADCAST_FUTURE_TICK_DATA => {
                return Ok(Self::TickData(TickData::from_bytes(payload, dims)?))
            }
            message_type::BROADCAST_TRANSACTION => {
                return Ok(Self::Transaction(Transaction::from_bytes(payload)?))
            }
            message_type::REQUEST_QUORUM_TICK => Self::RequestQuorumTick(RequestQuorumTick {
                tick: r.u32()?,
                vote_flags: r.take(dims.vote_flag_bytes())?.to_vec(),
            }),
            message_type::REQUEST_TICK_DATA => Self::RequestTickData(RequestTickData { tick: r.u32()? }),
            message_type::REQUEST_TICK_TRANSACTIONS => Self::RequestTickTransactions(RequestTickTransactions {
                tick: r.u32()?,
                transaction_flags: r.take(dims.transaction_flag_bytes())?.to_vec(),
            }),
            message_type::REQUEST_CURRENT_TICK_INFO => Self::RequestCurrentTickInfo,
            message_type::RESPOND_CURRENT_TICK_INFO => Self::RespondCurrentTickInfo(CurrentTickInfo {
                tick_duration: r.u16()?,
                epoch: r.u16()?,
                tick: r.u32()?,
                aligned_votes: r.u16()?,
                misaligned_votes: r.u16()?,
                initial_tick: r.u32()?,
            }),
            message_type::REQUEST_ENTITY => Self::RequestEntity(RequestEntity { id: r.id()? }),
            message_type::RESPOND_ENTITY => {
                let entity = BalanceRecord::from_bytes(&r.array::<BALANCE_RECORD_SIZE>()?);
                let tick = r.u32()?;
                let spectrum_index = r.i32()?;
                let rest = r.rest();
                if rest.len() % 32 != 0 {
                    return Err(ConsensusError::malformed("sibling list is not a whole number of digests"));
                }
                let siblings = rest
                    .chunks_exact(32)
                    .map(|chunk| {
                        let mut digest = ZERO_DIGEST;
                        digest.copy_from_slice(chunk);
                        digest
                    })
                    .collect();
                Self::RespondEntity(RespondEntity {
                    entity,
                    tick,
                    spectrum_index,
                    siblings,
                })
            }
            message_type::REQUEST_CONTRACT_FUNCTION => {
                let contract_index = r.u32()?;
                let input_type = r.u16()?;
                let input_size = usize::from(r.u16()?);
                Self::RequestContractFunction(RequestContractFunction {
                    contract_index,
                    input_type,
                    input: r.take(input_size)?.to_vec(),
                })
            }
            message_type::RESPOND_CONTRACT_FUNCTION => Self::RespondContractFunction(RespondContractFunction {
                output: r.rest().to_vec(),
            }),
            other => return Err(ConsensusError::malformed(format!("unknown message type {other}"))),
        };
        r.finish()?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> WireDimensions {
        WireDimensions {
            computors: 5,
            transactions_per_tick: 4,
            contracts: 3,
        }
    }

    #[test]
    fn test_vote_layout() {
        let vote = TickVote {
            computor_index: 7,
            tick: 12,
            transaction_digest: [3; 32],
            ..TickVote::default()
        };
        let bytes = vote.to_bytes();
        assert_eq!(bytes.len(), TICK_VOTE_SIZE);
        assert_eq!(&bytes[..2], &7u16.to_le_bytes());
        assert_eq!(&bytes[4..8], &12u32.to_le_bytes());
        assert_eq!(TickVote::from_bytes(&bytes).unwrap(), vote);
        assert!(TickVote::from_bytes(&bytes[1..]).is_err());
    }

    #[test]
    fn test_signatures_bind_message_kind() {
        let identity = SigningIdentity::from_seed([4; 32]);
        let mut vote = TickVote {
            computor_index: 1,
            ..TickVote::default()
        };
        vote.sign(&identity);
        assert!(vote.verify(&ledger_core::Ed25519Scheme, &identity.id()));

        vote.tick += 1;
        assert!(!vote.verify(&ledger_core::Ed25519Scheme, &identity.id()));
        assert_ne!(vote.signing_digest(), hash(&vote.payload()));
    }

    #[test]
    fn test_tick_data_size_is_fixed() {
        let dims = small();
        let mut data = TickData::new(&dims, 2, 1, 9, TickTimestamp::default(), [1; 32]);
        data.transaction_digests[1] = [8; 32];
        let bytes = data.to_bytes();
        assert_eq!(bytes.len(), dims.tick_data_size());
        assert_eq!(TickData::from_bytes(&bytes, &dims).unwrap(), data);
        assert_eq!(data.transaction_count(), 1);
        assert!(TickData::from_bytes(&bytes, &WireDimensions::default()).is_err());
    }

    #[test]
    fn test_transaction_validity_and_signature() {
        let identity = SigningIdentity::from_seed([5; 32]);
        let mut transaction = Transaction::new(identity.id(), Id([6; 32]), 10, 3, 0, vec![1, 2, 3]);
        transaction.sign(&identity);
        assert!(transaction.verify(&ledger_core::Ed25519Scheme));
        assert!(transaction.is_valid());

        let decoded = Transaction::from_bytes(&transaction.to_bytes()).unwrap();
        assert_eq!(decoded.digest(), transaction.digest());

        transaction.amount = -1;
        assert!(!transaction.is_valid());
        assert!(!transaction.verify(&ledger_core::Ed25519Scheme));
    }

    #[test]
    fn test_framed_requests() {
        let dims = small();
        let request = Message::RequestQuorumTick(RequestQuorumTick {
            tick: 40,
            vote_flags: vec![0b0000_0101],
        });
        let decoded = Message::decode(&request.encode(), &dims).unwrap();
        let Message::RequestQuorumTick(decoded) = decoded else {
            panic!("wrong message kind");
        };
        assert!(decoded.has_vote(0));
        assert!(!decoded.has_vote(1));
        assert!(decoded.has_vote(2));

        let info = Message::RespondCurrentTickInfo(CurrentTickInfo {
            epoch: 3,
            tick: 100,
            aligned_votes: 451,
            ..CurrentTickInfo::default()
        });
        assert_eq!(info.encode().len(), 1 + CURRENT_TICK_INFO_SIZE);
        assert_eq!(Message::decode(&info.encode(), &dims).unwrap(), info);

        assert!(Message::decode(&[200], &dims).is_err());
        assert!(Message::decode(&[], &dims).is_err());
    }

    #[test]
    fn test_entity_response_carries_siblings() {
        let response = Message::RespondEntity(RespondEntity {
            entity: BalanceRecord::empty(Id([1; 32])),
            tick: 5,
            spectrum_index: -1,
            siblings: vec![[2; 32], [3; 32]],
        });
        let decoded = Message::decode(&response.encode(), &small()).unwrap();
        assert_eq!(decoded, response);
    }
}
