//! Built-in contracts
//!
//! `QX` (index 1) charges fees for issuing assets and moving shares it
//! manages, and pays the fees it earned out as dividends to its
//! shareholders at the end of every epoch. `QUTIL` (index 2) fans one
//! payment out to many destinations and keeps a tally of the energy sent
//! to it.

use crate::codec::{read_i64, read_id, read_u64, read_u8, write_i64, write_id, write_u64};
use crate::context::{Frame, FunctionContext, IncomingTransfer, ProcedureContext, Qpi};
use crate::contract::{
    ContractDescriptor, ContractRegistry, EntryPoint, FunctionHandler, ProcedureHandler, SystemProcedure,
};
use crate::fault::ContractResult;
use ledger_core::params::MAX_AMOUNT;
use ledger_core::{Id, Result};
use ledger_state::AssetName;

/// Index of the exchange contract
pub const EXCHANGE_INDEX: usize = 1;

/// Index of the utility contract
pub const UTILITY_INDEX: usize = 2;

/// Exchange function: current fees
pub const EXCHANGE_FEES: u16 = 1;

/// Exchange procedure: issue an asset managed by the exchange
pub const EXCHANGE_ISSUE_ASSET: u16 = 1;

/// Exchange procedure: move exchange-managed shares
pub const EXCHANGE_TRANSFER_SHARES: u16 = 2;

/// Utility function: energy received so far
pub const UTILITY_RECEIVED: u16 = 1;

/// Utility procedure: pay up to `SEND_TO_MANY_SLOTS` destinations
pub const UTILITY_SEND_TO_MANY: u16 = 1;

/// Utility procedure: burn the invocation reward
pub const UTILITY_BURN: u16 = 2;

/// Fee charged for issuing an asset through the exchange
pub const ASSET_ISSUANCE_FEE: i64 = 1_000_000_000;

/// Fee charged per share transfer through the exchange
pub const TRANSFER_FEE: i64 = 1_000_000;

/// Destinations of one send-to-many call
pub const SEND_TO_MANY_SLOTS: usize = 25;

/// Fee burned per send-to-many call
pub const SEND_TO_MANY_FEE: i64 = 10;

// exchange state
const ISSUANCE_FEE_AT: usize = 0;
const TRANSFER_FEE_AT: usize = 8;
const EARNED_AT: usize = 16;
const DISTRIBUTED_AT: usize = 24;
const EXCHANGE_STATE_SIZE: usize = 32;

// utility state
const RECEIVED_TOTAL_AT: usize = 0;
const RECEIVED_COUNT_AT: usize = 8;
const UTILITY_STATE_SIZE: usize = 16;

const ISSUE_ASSET_INPUT_SIZE: usize = 24;
const TRANSFER_SHARES_INPUT_SIZE: usize = 80;
const SEND_TO_MANY_INPUT_SIZE: usize = SEND_TO_MANY_SLOTS * 40;

/// Input of `EXCHANGE_ISSUE_ASSET`: `name ‖ units ‖ unit ‖ decimals`
pub fn issue_asset_input(name: &AssetName, units: i64, unit: [u8; 7], decimals: i8) -> Vec<u8> {
    let mut input = vec![0u8; ISSUE_ASSET_INPUT_SIZE];
    write_u64(&mut input, 0, name.to_u64());
    write_i64(&mut input, 8, units);
    input[16..23].copy_from_slice(&unit);
    input[23] = decimals as u8;
    input
}

/// Input of `EXCHANGE_TRANSFER_SHARES`: `issuer ‖ new_owner ‖ name ‖ units`
pub fn transfer_shares_input(issuer: &Id, new_owner: &Id, name: &AssetName, units: i64) -> Vec<u8> {
    let mut input = vec![0u8; TRANSFER_SHARES_INPUT_SIZE];
    write_id(&mut input, 0, issuer);
    write_id(&mut input, 32, new_owner);
    write_u64(&mut input, 64, name.to_u64());
    write_i64(&mut input, 72, units);
    input
}

/// Input of `UTILITY_SEND_TO_MANY`; entries past `SEND_TO_MANY_SLOTS` are dropped
pub fn send_to_many_input(payments: &[(Id, i64)]) -> Vec<u8> {
    let mut input = vec![0u8; SEND_TO_MANY_INPUT_SIZE];
    for (slot, (destination, amount)) in payments.iter().take(SEND_TO_MANY_SLOTS).enumerate() {
        write_id(&mut input, slot * 40, destination);
        write_i64(&mut input, slot * 40 + 32, *amount);
    }
    input
}

fn refund(qpi: &mut ProcedureContext<'_>, amount: i64) -> ContractResult<()> {
    if amount > 0 {
        let invocator = qpi.invocator();
        qpi.transfer(&invocator, amount)?;
    }
    Ok(())
}

/// Take `fee` out of the invocation reward, refunding the rest.
/// Returns `false` (and refunds everything) if the reward is too small.
fn charge(qpi: &mut ProcedureContext<'_>, fee: i64) -> ContractResult<bool> {
    let reward = qpi.invocation_reward();
    if reward < fee {
        refund(qpi, reward)?;
        return Ok(false);
    }
    refund(qpi, reward - fee)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// QX
// ---------------------------------------------------------------------------

fn exchange_initialize(qpi: &mut ProcedureContext<'_>, _: Frame) -> ContractResult<()> {
    let state = qpi.state_mut();
    write_i64(state, ISSUANCE_FEE_AT, ASSET_ISSUANCE_FEE);
    write_i64(state, TRANSFER_FEE_AT, TRANSFER_FEE);
    Ok(())
}

fn exchange_fees(qpi: &mut FunctionContext<'_>, frame: Frame) -> ContractResult<()> {
    let issuance = read_i64(qpi.state(), ISSUANCE_FEE_AT);
    let transfer = read_i64(qpi.state(), TRANSFER_FEE_AT);
    let output = qpi.output_mut(&frame);
    write_i64(output, 0, issuance);
    write_i64(output, 8, transfer);
    Ok(())
}

fn record_earned(qpi: &mut ProcedureContext<'_>, fee: i64) {
    let earned = read_i64(qpi.state(), EARNED_AT);
    write_i64(qpi.state_mut(), EARNED_AT, earned + fee);
}

fn exchange_issue_asset(qpi: &mut ProcedureContext<'_>, frame: Frame) -> ContractResult<()> {
    let input = qpi.input(&frame);
    let name = AssetName::from_u64(read_u64(input, 0));
    let units = read_i64(input, 8);
    let mut unit = [0u8; 7];
    if let Some(raw) = input.get(16..23) {
        unit.copy_from_slice(raw);
    }
    let decimals = read_u8(input, 23) as i8;

    let fee = read_i64(qpi.state(), ISSUANCE_FEE_AT);
    if !charge(qpi, fee)? {
        return Ok(());
    }
    record_earned(qpi, fee);
    let issuer = qpi.invocator();
    let issued = qpi.issue_asset(&name, &issuer, decimals, unit, units)?;
    write_i64(qpi.output_mut(&frame), 0, issued);
    Ok(())
}

fn exchange_transfer_shares(qpi: &mut ProcedureContext<'_>, frame: Frame) -> ContractResult<()> {
    let input = qpi.input(&frame);
    let issuer = read_id(input, 0);
    let new_owner = read_id(input, 32);
    let name = AssetName::from_u64(read_u64(input, 64));
    let units = read_i64(input, 72);

    let fee = read_i64(qpi.state(), TRANSFER_FEE_AT);
    if !charge(qpi, fee)? {
        return Ok(());
    }
    record_earned(qpi, fee);
    let holder = qpi.invocator();
    let remaining = qpi.transfer_share_ownership_and_possession(&name, &issuer, &holder, &holder, units, &new_owner)?;
    write_i64(qpi.output_mut(&frame), 0, if remaining < 0 { 0 } else { units });
    Ok(())
}

fn exchange_end_epoch(qpi: &mut ProcedureContext<'_>, _: Frame) -> ContractResult<()> {
    let earned = read_i64(qpi.state(), EARNED_AT);
    let distributed = read_i64(qpi.state(), DISTRIBUTED_AT);
    let shares = qpi.computors() as i64;
    let per_share = (earned - distributed) / shares;
    if per_share > 0 && qpi.distribute_dividends(per_share)? {
        write_i64(qpi.state_mut(), DISTRIBUTED_AT, distributed + per_share * shares);
    }
    Ok(())
}

/// The exchange contract, selling its shares in the epoch before `construction_epoch`
pub fn exchange_contract(construction_epoch: u16) -> ContractDescriptor {
    ContractDescriptor::new(
        "QX",
        AssetName::from_raw(*b"QX\0\0\0\0\0"),
        construction_epoch,
        EXCHANGE_STATE_SIZE,
    )
    .with_function(EXCHANGE_FEES, EntryPoint::new(0, 16, 0, exchange_fees as FunctionHandler))
    .with_procedure(
        EXCHANGE_ISSUE_ASSET,
        EntryPoint::new(ISSUE_ASSET_INPUT_SIZE, 8, 0, exchange_issue_asset as ProcedureHandler),
    )
    .with_procedure(
        EXCHANGE_TRANSFER_SHARES,
        EntryPoint::new(TRANSFER_SHARES_INPUT_SIZE, 8, 0, exchange_transfer_shares as ProcedureHandler),
    )
    .with_system_procedure(SystemProcedure::Initialize, 0, exchange_initialize)
    .with_system_procedure(SystemProcedure::EndEpoch, 0, exchange_end_epoch)
}

// ---------------------------------------------------------------------------
// QUTIL
// ---------------------------------------------------------------------------

fn utility_received(qpi: &mut FunctionContext<'_>, frame: Frame) -> ContractResult<()> {
    let total = read_i64(qpi.state(), RECEIVED_TOTAL_AT);
    let count = read_u64(qpi.state(), RECEIVED_COUNT_AT);
    let output = qpi.output_mut(&frame);
    write_i64(output, 0, total);
    write_u64(output, 8, count);
    Ok(())
}

fn utility_send_to_many(qpi: &mut ProcedureContext<'_>, frame: Frame) -> ContractResult<()> {
    let input = qpi.input(&frame);
    let mut payments = Vec::new();
    let mut total: i64 = 0;
    for slot in 0..SEND_TO_MANY_SLOTS {
        let destination = read_id(input, slot * 40);
        let amount = read_i64(input, slot * 40 + 32);
        if destination.is_zero() || amount == 0 {
            continue;
        }
        if !(0..=MAX_AMOUNT).contains(&amount) {
            total = i64::MAX;
            break;
        }
        total = total.saturating_add(amount);
        payments.push((destination, amount));
    }

    let reward = qpi.invocation_reward();
    if total.saturating_add(SEND_TO_MANY_FEE) > reward {
        return refund(qpi, reward);
    }
    for (destination, amount) in &payments {
        qpi.transfer(destination, *amount)?;
    }
    qpi.burn(SEND_TO_MANY_FEE)?;
    refund(qpi, reward - total - SEND_TO_MANY_FEE)?;
    write_i64(qpi.output_mut(&frame), 0, total);
    Ok(())
}

fn utility_burn(qpi: &mut ProcedureContext<'_>, frame: Frame) -> ContractResult<()> {
    let amount = qpi.invocation_reward();
    let remaining = qpi.burn(amount)?;
    write_i64(qpi.output_mut(&frame), 0, remaining);
    Ok(())
}

fn utility_incoming(qpi: &mut ProcedureContext<'_>, frame: Frame) -> ContractResult<()> {
    let Some(transfer) = IncomingTransfer::from_bytes(qpi.input(&frame)) else {
        return Ok(());
    };
    let total = read_i64(qpi.state(), RECEIVED_TOTAL_AT);
    let count = read_u64(qpi.state(), RECEIVED_COUNT_AT);
    let state = qpi.state_mut();
    write_i64(state, RECEIVED_TOTAL_AT, total + transfer.amount);
    write_u64(state, RECEIVED_COUNT_AT, count + 1);
    Ok(())
}

/// The utility contract, selling its shares in the epoch before `construction_epoch`
pub fn utility_contract(construction_epoch: u16) -> ContractDescriptor {
    ContractDescriptor::new(
        "QUTIL",
        AssetName::from_raw(*b"QUTIL\0\0"),
        construction_epoch,
        UTILITY_STATE_SIZE,
    )
    .with_function(UTILITY_RECEIVED, EntryPoint::new(0, 16, 0, utility_received as FunctionHandler))
    .with_procedure(
        UTILITY_SEND_TO_MANY,
        EntryPoint::new(SEND_TO_MANY_INPUT_SIZE, 8, 0, utility_send_to_many as ProcedureHandler),
    )
    .with_procedure(UTILITY_BURN, EntryPoint::new(0, 8, 0, utility_burn as ProcedureHandler))
    .with_system_procedure(SystemProcedure::PostIncomingTransfer, 0, utility_incoming)
}

/// Registry of `capacity` slots holding both built-in contracts
pub fn standard_registry(capacity: usize, construction_epoch: u16) -> Result<ContractRegistry> {
    let mut registry = ContractRegistry::new(capacity);
    registry.register(EXCHANGE_INDEX, exchange_contract(construction_epoch))?;
    registry.register(UTILITY_INDEX, utility_contract(construction_epoch))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::runtime::ContractRuntime;
    use ledger_core::NullSink;
    use ledger_state::{LedgerState, TableConfig};
    use std::sync::Arc;

    fn id(n: u8) -> Id {
        Id([n; 32])
    }

    fn runtime() -> ContractRuntime {
        let ledger = Arc::new(LedgerState::new(&TableConfig::default(), Arc::new(NullSink)).unwrap());
        let runtime = ContractRuntime::new(
            RuntimeConfig::default(),
            standard_registry(8, 1).unwrap(),
            ledger,
            4,
        )
        .unwrap();
        runtime.begin_epoch(1);
        runtime.run_system_procedures(SystemProcedure::Initialize);
        runtime
    }

    /// Move `reward` to the contract, then invoke it, as transaction replay does
    fn invoke(runtime: &ContractRuntime, contract: usize, input_type: u16, source: &Id, reward: i64, input: &[u8]) -> Vec<u8> {
        let destination = Id::from_contract_index(contract);
        assert!(runtime.ledger().transfer(source, &destination, reward) >= 0);
        runtime
            .invoke_procedure(contract, input_type, source, reward, input)
            .unwrap()
    }

    #[test]
    fn test_exchange_initializes_fees() {
        let runtime = runtime();
        let fees = runtime.call_function(EXCHANGE_INDEX, EXCHANGE_FEES, &[]).unwrap();
        assert_eq!(read_i64(&fees, 0), ASSET_ISSUANCE_FEE);
        assert_eq!(read_i64(&fees, 8), TRANSFER_FEE);
    }

    #[test]
    fn test_issue_and_transfer_through_exchange() {
        let runtime = runtime();
        runtime.ledger().increase_energy(&id(1), 3 * ASSET_ISSUANCE_FEE);
        let name = AssetName::new("CFB").unwrap();

        let output = invoke(
            &runtime,
            EXCHANGE_INDEX,
            EXCHANGE_ISSUE_ASSET,
            &id(1),
            ASSET_ISSUANCE_FEE + 5,
            &issue_asset_input(&name, 1000, [0; 7], 0),
        );
        assert_eq!(read_i64(&output, 0), 1000);
        assert_eq!(runtime.ledger().balance(&id(1)), 2 * ASSET_ISSUANCE_FEE);

        let output = invoke(
            &runtime,
            EXCHANGE_INDEX,
            EXCHANGE_TRANSFER_SHARES,
            &id(1),
            TRANSFER_FEE,
            &transfer_shares_input(&id(1), &id(2), &name, 300),
        );
        assert_eq!(read_i64(&output, 0), 300);
        let ledger = runtime.ledger();
        assert_eq!(ledger.number_of_possessed_shares(&name, &id(1), &id(2), &id(2), 1, 1), 300);
        assert_eq!(ledger.number_of_possessed_shares(&name, &id(1), &id(1), &id(1), 1, 1), 700);
    }

    #[test]
    fn test_underpaid_issuance_is_refunded() {
        let runtime = runtime();
        runtime.ledger().increase_energy(&id(1), 500);
        let output = invoke(
            &runtime,
            EXCHANGE_INDEX,
            EXCHANGE_ISSUE_ASSET,
            &id(1),
            500,
            &issue_asset_input(&AssetName::new("CFB").unwrap(), 10, [0; 7], 0),
        );
        assert_eq!(read_i64(&output, 0), 0);
        assert_eq!(runtime.ledger().balance(&id(1)), 500);
    }

    #[test]
    fn test_send_to_many_pays_burns_and_refunds() {
        let runtime = runtime();
        runtime.ledger().increase_energy(&id(1), 1000);
        let input = send_to_many_input(&[(id(2), 100), (id(3), 200)]);
        let output = invoke(&runtime, UTILITY_INDEX, UTILITY_SEND_TO_MANY, &id(1), 400, &input);
        assert_eq!(read_i64(&output, 0), 300);
        let ledger = runtime.ledger();
        assert_eq!(ledger.balance(&id(2)), 100);
        assert_eq!(ledger.balance(&id(3)), 200);
        assert_eq!(ledger.balance(&id(1)), 1000 - 300 - SEND_TO_MANY_FEE);
        assert_eq!(runtime.fee_reserve(UTILITY_INDEX), SEND_TO_MANY_FEE);
        assert_eq!(ledger.balance(&Id::from_contract_index(UTILITY_INDEX)), 0);
    }

    #[test]
    fn test_utility_counts_incoming_transfers() {
        let runtime = runtime();
        runtime.ledger().increase_energy(&id(1), 1000);
        // paying itself still raises the hook once the invocation returns
        let utility = Id::from_contract_index(UTILITY_INDEX);
        let input = send_to_many_input(&[(utility, 50)]);
        invoke(&runtime, UTILITY_INDEX, UTILITY_SEND_TO_MANY, &id(1), 60, &input);
        let received = runtime.call_function(UTILITY_INDEX, UTILITY_RECEIVED, &[]).unwrap();
        assert_eq!(read_i64(&received, 0), 50);
        assert_eq!(read_u64(&received, 8), 1);
    }
}
