//! Contract runtime scenarios
//!
//! Two cooperating contracts exercise the cross-contract rules:
//! - nested procedure and function calls run on the caller's stack and
//!   leave every stack empty
//! - a failed reward transfer zeroes the reward but the call proceeds
//! - a reward stays with the caller when the callee cannot be entered
//! - calls to higher-index contracts are refused
//! - a fault anywhere in a call chain restores every touched state and
//!   disables the contract that faulted
//! - transfers to contracts are refused while an incoming-transfer hook runs

#![allow(clippy::unwrap_used, missing_docs)]

use ledger_contracts::codec::{read_i64, read_u64, write_i64, write_u64};
use ledger_contracts::{
    ContractDescriptor, ContractFault, ContractRegistry, ContractResult, ContractRuntime, EntryPoint, Frame,
    FunctionContext, FunctionHandler, ProcedureContext, ProcedureHandler, Qpi, RuntimeConfig, SystemProcedure,
};
use ledger_core::params::REJECTED_TRANSFER;
use ledger_core::{EventLog, Id, LedgerEvent};
use ledger_state::{AssetName, LedgerState, TableConfig};
use std::sync::Arc;

const BASE: usize = 1;
const CALLER: usize = 2;
const GREEDY: usize = 3;

fn base_add(qpi: &mut ProcedureContext<'_>, frame: Frame) -> ContractResult<()> {
    let step = read_u64(qpi.input(&frame), 0);
    let count = read_u64(qpi.state(), 0) + step;
    let reward = qpi.invocation_reward();
    let state = qpi.state_mut();
    write_u64(state, 0, count);
    write_i64(state, 8, reward);
    write_u64(qpi.output_mut(&frame), 0, count);
    Ok(())
}

fn base_fail(qpi: &mut ProcedureContext<'_>, _: Frame) -> ContractResult<()> {
    let count = read_u64(qpi.state(), 0);
    write_u64(qpi.state_mut(), 0, count + 1000);
    qpi.abort(7)
}

fn base_get(qpi: &mut FunctionContext<'_>, frame: Frame) -> ContractResult<()> {
    let count = read_u64(qpi.state(), 0);
    write_u64(qpi.output_mut(&frame), 0, count);
    Ok(())
}

fn base_incoming(qpi: &mut ProcedureContext<'_>, _: Frame) -> ContractResult<()> {
    let result = qpi.transfer(&Id::from_contract_index(CALLER), 1)?;
    write_i64(qpi.state_mut(), 16, result);
    Ok(())
}

fn caller_forward(qpi: &mut ProcedureContext<'_>, frame: Frame) -> ContractResult<()> {
    let input = qpi.input(&frame);
    let step = read_u64(input, 0);
    let reward = read_i64(input, 8);
    let output = qpi.call_procedure(BASE, 1, &step.to_le_bytes(), reward)?;
    let count = read_u64(&output, 0);
    let seen = read_u64(&qpi.call_function(BASE, 1, &[])?, 0);
    let state = qpi.state_mut();
    write_u64(state, 0, count);
    write_u64(state, 8, seen);
    write_u64(qpi.output_mut(&frame), 0, count);
    Ok(())
}

fn caller_forward_fail(qpi: &mut ProcedureContext<'_>, _: Frame) -> ContractResult<()> {
    write_u64(qpi.state_mut(), 0, 99);
    qpi.call_procedure(BASE, 2, &[], 0)?;
    Ok(())
}

fn caller_call_up(qpi: &mut ProcedureContext<'_>, _: Frame) -> ContractResult<()> {
    qpi.call_function(GREEDY, 1, &[])?;
    Ok(())
}

fn caller_pay_base(qpi: &mut ProcedureContext<'_>, frame: Frame) -> ContractResult<()> {
    let amount = read_i64(qpi.input(&frame), 0);
    let remaining = qpi.transfer(&Id::from_contract_index(BASE), amount)?;
    write_i64(qpi.output_mut(&frame), 0, remaining);
    Ok(())
}

fn caller_call_missing(qpi: &mut ProcedureContext<'_>, frame: Frame) -> ContractResult<()> {
    let reward = read_i64(qpi.input(&frame), 0);
    qpi.call_procedure(BASE, 9, &[], reward)?;
    Ok(())
}

fn greedy(_: &mut ProcedureContext<'_>, _: Frame) -> ContractResult<()> {
    Ok(())
}

fn greedy_get(_: &mut FunctionContext<'_>, _: Frame) -> ContractResult<()> {
    Ok(())
}

fn registry() -> ContractRegistry {
    let mut registry = ContractRegistry::new(8);
    registry
        .register(
            BASE,
            ContractDescriptor::new("BASE", AssetName::new("BASE").unwrap(), 1, 24)
                .with_procedure(1, EntryPoint::new(8, 8, 0, base_add as ProcedureHandler))
                .with_procedure(2, EntryPoint::new(0, 0, 0, base_fail as ProcedureHandler))
                .with_function(1, EntryPoint::new(0, 8, 0, base_get as FunctionHandler))
                .with_system_procedure(SystemProcedure::PostIncomingTransfer, 0, base_incoming),
        )
        .unwrap();
    registry
        .register(
            CALLER,
            ContractDescriptor::new("CALLER", AssetName::new("CALLER").unwrap(), 1, 16)
                .with_procedure(1, EntryPoint::new(16, 8, 0, caller_forward as ProcedureHandler))
                .with_procedure(2, EntryPoint::new(0, 0, 0, caller_forward_fail as ProcedureHandler))
                .with_procedure(3, EntryPoint::new(0, 0, 0, caller_call_up as ProcedureHandler))
                .with_procedure(4, EntryPoint::new(8, 8, 0, caller_pay_base as ProcedureHandler))
                .with_procedure(5, EntryPoint::new(8, 0, 0, caller_call_missing as ProcedureHandler)),
        )
        .unwrap();
    registry
        .register(
            GREEDY,
            ContractDescriptor::new("GREEDY", AssetName::new("GREEDY").unwrap(), 1, 8)
                .with_procedure(1, EntryPoint::new(0, 0, 1 << 20, greedy as ProcedureHandler))
                .with_function(1, EntryPoint::new(0, 0, 0, greedy_get as FunctionHandler)),
        )
        .unwrap();
    registry
}

fn setup() -> (ContractRuntime, Arc<EventLog>) {
    let log = Arc::new(EventLog::new());
    let ledger = Arc::new(LedgerState::new(&TableConfig::default(), log.clone()).unwrap());
    let config = RuntimeConfig {
        stack_size: 64 * 1024,
        ..RuntimeConfig::default()
    };
    let runtime = ContractRuntime::new(config, registry(), ledger, 4).unwrap();
    runtime.begin_epoch(1);
    (runtime, log)
}

fn id(n: u8) -> Id {
    Id([n; 32])
}

fn fund_and_invoke(
    runtime: &ContractRuntime,
    contract: usize,
    input_type: u16,
    reward: i64,
    input: &[u8],
) -> ContractResult<Vec<u8>> {
    let user = id(1);
    runtime.ledger().increase_energy(&user, reward);
    assert!(runtime.ledger().transfer(&user, &Id::from_contract_index(contract), reward) >= 0);
    runtime.invoke_procedure(contract, input_type, &user, reward, input)
}

fn forward_input(step: u64, reward: i64) -> Vec<u8> {
    let mut input = vec![0u8; 16];
    write_u64(&mut input, 0, step);
    write_i64(&mut input, 8, reward);
    input
}

#[test]
fn nested_calls_share_the_stack_and_release_it() {
    let (runtime, _) = setup();
    let output = fund_and_invoke(&runtime, CALLER, 1, 500, &forward_input(3, 100)).unwrap();
    assert_eq!(read_u64(&output, 0), 3);

    let caller_state = runtime.state_bytes(CALLER).unwrap();
    assert_eq!(read_u64(&caller_state, 0), 3);
    assert_eq!(read_u64(&caller_state, 8), 3);

    let base_state = runtime.state_bytes(BASE).unwrap();
    assert_eq!(read_i64(&base_state, 8), 100);
    assert_eq!(runtime.ledger().balance(&Id::from_contract_index(BASE)), 100);
    assert!(runtime.stacks_idle());
}

#[test]
fn failed_reward_transfer_zeroes_the_reward() {
    let (runtime, _) = setup();
    // the caller holds nothing, so the 100 it promises cannot be paid
    let output = fund_and_invoke(&runtime, CALLER, 1, 0, &forward_input(2, 100)).unwrap();
    assert_eq!(read_u64(&output, 0), 2);
    let base_state = runtime.state_bytes(BASE).unwrap();
    assert_eq!(read_i64(&base_state, 8), 0);
    assert_eq!(runtime.ledger().balance(&Id::from_contract_index(BASE)), 0);
}

#[test]
fn reward_stays_with_caller_when_callee_cannot_be_entered() {
    let (runtime, _) = setup();
    let mut input = vec![0u8; 8];
    write_i64(&mut input, 0, 100);
    let fault = fund_and_invoke(&runtime, CALLER, 5, 500, &input).unwrap_err();
    assert_eq!(fault, ContractFault::InvalidCallee);
    assert_eq!(runtime.ledger().balance(&Id::from_contract_index(CALLER)), 500);
    assert_eq!(runtime.ledger().balance(&Id::from_contract_index(BASE)), 0);
    assert!(runtime.stacks_idle());
}

#[test]
fn higher_index_callee_is_refused() {
    let (runtime, _) = setup();
    let fault = fund_and_invoke(&runtime, CALLER, 3, 0, &[]).unwrap_err();
    assert_eq!(fault, ContractFault::InvalidCallee);
    assert_eq!(runtime.fault(CALLER), Some(ContractFault::InvalidCallee));
    assert!(runtime.stacks_idle());
}

#[test]
fn nested_fault_restores_every_state() {
    let (runtime, log) = setup();
    fund_and_invoke(&runtime, CALLER, 1, 0, &forward_input(5, 0)).unwrap();
    let before_caller = runtime.state_bytes(CALLER).unwrap();
    let before_base = runtime.state_bytes(BASE).unwrap();

    let fault = fund_and_invoke(&runtime, CALLER, 2, 0, &[]).unwrap_err();
    assert_eq!(fault, ContractFault::Aborted(7));
    assert_eq!(runtime.state_bytes(CALLER).unwrap(), before_caller);
    assert_eq!(runtime.state_bytes(BASE).unwrap(), before_base);

    assert_eq!(runtime.fault(BASE), Some(ContractFault::Aborted(7)));
    assert_eq!(runtime.fault(CALLER), None);
    assert!(log.entries().iter().any(|e| e.event
        == LedgerEvent::ContractFault {
            contract: BASE as u32,
            code: ContractFault::Aborted(7).code(),
        }));

    // the disabled contract can no longer be reached from its caller
    let fault = fund_and_invoke(&runtime, CALLER, 1, 0, &forward_input(1, 0)).unwrap_err();
    assert_eq!(fault, ContractFault::InvalidCallee);
    assert!(runtime.stacks_idle());
}

#[test]
fn oversized_locals_fault_before_running() {
    let (runtime, _) = setup();
    let fault = fund_and_invoke(&runtime, GREEDY, 1, 0, &[]).unwrap_err();
    assert_eq!(fault, ContractFault::AllocLocalsFailed);
    assert!(runtime.stacks_idle());
}

#[test]
fn transfer_hook_cannot_pay_contracts() {
    let (runtime, _) = setup();
    let mut input = vec![0u8; 8];
    write_i64(&mut input, 0, 40);
    let output = fund_and_invoke(&runtime, CALLER, 4, 100, &input).unwrap();
    assert_eq!(read_i64(&output, 0), 60);

    let base_state = runtime.state_bytes(BASE).unwrap();
    assert_eq!(read_i64(&base_state, 16), REJECTED_TRANSFER);
    assert_eq!(runtime.ledger().balance(&Id::from_contract_index(BASE)), 40);
    assert_eq!(runtime.fault(BASE), None);
}

#[test]
fn contracts_in_ipo_cannot_be_invoked() {
    let (runtime, _) = setup();
    runtime.begin_epoch(0);
    assert!(runtime.in_ipo(BASE));
    assert_eq!(
        runtime.call_function(BASE, 1, &[]),
        Err(ContractFault::InvalidCallee)
    );
}
