//! Contract descriptors and the registry
//!
//! A contract is plain data plus entry points: user functions (read-only),
//! user procedures (state-changing, invoked by transactions or other
//! contracts) and system procedures run by the node at fixed points of the
//! tick and epoch lifecycle.

use crate::context::{Frame, FunctionContext, ProcedureContext};
use crate::fault::ContractResult;
use ledger_core::params::MAX_INPUT_SIZE;
use ledger_core::{LedgerError, Result};
use ledger_state::AssetName;
use std::collections::BTreeMap;

/// Read-only entry point
pub type FunctionHandler = fn(&mut FunctionContext<'_>, Frame) -> ContractResult<()>;

/// State-changing entry point
pub type ProcedureHandler = fn(&mut ProcedureContext<'_>, Frame) -> ContractResult<()>;

/// Lifecycle hooks run by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SystemProcedure {
    /// First tick of the construction epoch
    Initialize,
    /// First tick of every epoch
    BeginEpoch,
    /// Before epoch settlement
    EndEpoch,
    /// Before a tick's transactions
    BeginTick,
    /// After a tick's transactions
    EndTick,
    /// Energy arrived at the contract
    PostIncomingTransfer,
}

impl SystemProcedure {
    /// Every hook, in declaration order
    pub const ALL: [SystemProcedure; 6] = [
        Self::Initialize,
        Self::BeginEpoch,
        Self::EndEpoch,
        Self::BeginTick,
        Self::EndTick,
        Self::PostIncomingTransfer,
    ];

    /// Fixed input size of the hook
    pub fn input_size(&self) -> usize {
        match self {
            Self::PostIncomingTransfer => crate::context::INCOMING_TRANSFER_INPUT_SIZE,
            _ => 0,
        }
    }
}

/// Sizes and handler of one entry point
#[derive(Debug, Clone, Copy)]
pub struct EntryPoint<H> {
    /// Input is zero-padded or truncated to this size
    pub input_size: usize,
    /// Output buffer size
    pub output_size: usize,
    /// Scratch space handed to the handler
    pub locals_size: usize,
    /// The code
    pub handler: H,
}

impl<H> EntryPoint<H> {
    /// Entry point with the given buffer sizes
    pub fn new(input_size: usize, output_size: usize, locals_size: usize, handler: H) -> Self {
        Self {
            input_size,
            output_size,
            locals_size,
            handler,
        }
    }
}

/// Everything the runtime needs to know about one contract
#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    /// Human-readable name
    pub name: String,
    /// Name of the shares sold in the contract's IPO
    pub asset_name: AssetName,
    /// Epoch in which the contract starts running; it is in IPO before that
    pub construction_epoch: u16,
    /// Size of the state blob
    pub state_size: usize,
    functions: BTreeMap<u16, EntryPoint<FunctionHandler>>,
    procedures: BTreeMap<u16, EntryPoint<ProcedureHandler>>,
    system: BTreeMap<SystemProcedure, EntryPoint<ProcedureHandler>>,
}

impl ContractDescriptor {
    /// Contract without entry points
    pub fn new(name: impl Into<String>, asset_name: AssetName, construction_epoch: u16, state_size: usize) -> Self {
        Self {
            name: name.into(),
            asset_name,
            construction_epoch,
            state_size,
            functions: BTreeMap::new(),
            procedures: BTreeMap::new(),
            system: BTreeMap::new(),
        }
    }

    /// Register user function `input_type`
    pub fn with_function(mut self, input_type: u16, entry: EntryPoint<FunctionHandler>) -> Self {
        self.functions.insert(input_type, entry);
        self
    }

    /// Register user procedure `input_type`
    pub fn with_procedure(mut self, input_type: u16, entry: EntryPoint<ProcedureHandler>) -> Self {
        self.procedures.insert(input_type, entry);
        self
    }

    /// Register a lifecycle hook with `locals_size` bytes of scratch space
    pub fn with_system_procedure(mut self, kind: SystemProcedure, locals_size: usize, handler: ProcedureHandler) -> Self {
        self.system
            .insert(kind, EntryPoint::new(kind.input_size(), 0, locals_size, handler));
        self
    }

    /// User function `input_type`
    pub fn function(&self, input_type: u16) -> Option<&EntryPoint<FunctionHandler>> {
        self.functions.get(&input_type)
    }

    /// User procedure `input_type`
    pub fn procedure(&self, input_type: u16) -> Option<&EntryPoint<ProcedureHandler>> {
        self.procedures.get(&input_type)
    }

    /// Lifecycle hook `kind`
    pub fn system_procedure(&self, kind: SystemProcedure) -> Option<&EntryPoint<ProcedureHandler>> {
        self.system.get(&kind)
    }

    /// Whether the contract is still selling shares in `epoch`
    pub fn in_ipo(&self, epoch: u16) -> bool {
        epoch < self.construction_epoch
    }

    /// Whether bids are accepted in `epoch`
    pub fn accepts_bids(&self, epoch: u16) -> bool {
        epoch.checked_add(1) == Some(self.construction_epoch)
    }

    fn validate(&self) -> Result<()> {
        let entries = self
            .functions
            .values()
            .map(|e| (e.input_size, e.output_size))
            .chain(self.procedures.values().map(|e| (e.input_size, e.output_size)));
        for (input, output) in entries {
            if input > MAX_INPUT_SIZE || output > MAX_INPUT_SIZE {
                return Err(LedgerError::invalid(format!(
                    "contract {} has an entry point larger than {MAX_INPUT_SIZE} bytes",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Contracts by index. Index 0 is the system slot and never holds a contract.
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    contracts: Vec<Option<ContractDescriptor>>,
}

impl ContractRegistry {
    /// Registry with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self {
            contracts: vec![None; capacity.max(1)],
        }
    }

    /// Number of slots, including index 0
    pub fn capacity(&self) -> usize {
        self.contracts.len()
    }

    /// Install `descriptor` at `index`
    pub fn register(&mut self, index: usize, descriptor: ContractDescriptor) -> Result<()> {
        if index == 0 || index >= self.contracts.len() {
            return Err(LedgerError::invalid(format!("contract index {index} out of range")));
        }
        if self.contracts[index].is_some() {
            return Err(LedgerError::invalid(format!("contract index {index} already taken")));
        }
        descriptor.validate()?;
        tracing::debug!(index, name = %descriptor.name, "Contract registered");
        self.contracts[index] = Some(descriptor);
        Ok(())
    }

    /// Descriptor at `index`
    pub fn get(&self, index: usize) -> Option<&ContractDescriptor> {
        self.contracts.get(index).and_then(Option::as_ref)
    }

    /// Registered contracts in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ContractDescriptor)> {
        self.contracts
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i, c)))
    }

    /// Index of the contract named `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.iter().find(|(_, c)| c.name == name).map(|(i, _)| i)
    }
}
