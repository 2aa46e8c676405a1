//! Protocol constants shared by every crate
//!
//! Values that differ between production and test networks (computor count,
//! table depths) are configuration; the constants here fix the production
//! defaults and the amounts that are never configurable.

/// Energy units issued per epoch
pub const ISSUANCE_RATE: i64 = 1_000_000_000_000;

/// Largest amount a single transfer may move
pub const MAX_AMOUNT: i64 = ISSUANCE_RATE * 1000;

/// Ceiling on the total energy in circulation; no revenue is issued past it.
pub const MAX_SUPPLY: i64 = ISSUANCE_RATE * 200;

/// Returned by transfers whose amount is out of range
pub const REJECTED_TRANSFER: i64 = -(MAX_AMOUNT + 1);

/// Size of a signature on the wire
pub const SIGNATURE_SIZE: usize = 64;

/// Largest transaction or function-call payload
pub const MAX_INPUT_SIZE: usize = 1024;

/// Number of contract slots in the computer partition
pub const MAX_NUMBER_OF_CONTRACTS: usize = 1024;

/// Production computor count
pub const NUMBER_OF_COMPUTORS: usize = 676;

/// Production transaction slots per tick
pub const NUMBER_OF_TRANSACTIONS_PER_TICK: usize = 1024;

/// Production spectrum depth (2^24 balance slots)
pub const SPECTRUM_DEPTH: u32 = 24;

/// Production universe depth (2^24 asset slots)
pub const ASSETS_DEPTH: u32 = 24;

/// Depth of the computer digest tree (one leaf per contract slot)
pub const CONTRACTS_DEPTH: u32 = 10;

/// Number of agreeing computors required for any decision: `floor(2N/3) + 1`.
pub const fn quorum(computors: usize) -> usize {
    computors * 2 / 3 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_quorum() {
        assert_eq!(quorum(NUMBER_OF_COMPUTORS), 451);
        assert_eq!(quorum(6), 5);
        assert_eq!(quorum(4), 3);
    }

    #[test]
    fn test_contract_tree_covers_every_slot() {
        assert_eq!(1usize << CONTRACTS_DEPTH, MAX_NUMBER_OF_CONTRACTS);
        assert!(REJECTED_TRANSFER < -MAX_AMOUNT);
    }
}
