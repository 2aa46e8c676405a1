//! IPO order book of a contract under construction
//!
//! One slot per computor share, kept sorted by price (highest first). A bid
//! for `quantity` shares is placed one unit at a time: each unit either
//! displaces the cheapest slot, refunding its bidder, or is itself refunded.

use ledger_core::{Id, LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Bid slots of one IPO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpoBook {
    bidders: Vec<Id>,
    prices: Vec<i64>,
}

/// Result of placing a bid
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BidPlacement {
    /// Units that entered the book
    pub registered: u32,
    /// Refunds owed, first-seen order, no zero amounts
    pub refunds: Vec<(Id, i64)>,
}

impl IpoBook {
    /// Empty book with one slot per share
    pub fn new(shares: usize) -> Self {
        Self {
            bidders: vec![Id::ZERO; shares],
            prices: vec![0; shares],
        }
    }

    /// Number of slots
    pub fn shares(&self) -> usize {
        self.prices.len()
    }

    /// Bidder holding slot `index`
    pub fn bidder(&self, index: usize) -> Id {
        self.bidders[index]
    }

    /// Price of slot `index`
    pub fn price(&self, index: usize) -> i64 {
        self.prices[index]
    }

    /// Place `quantity` units at `price` each for `source`.
    ///
    /// The caller has already debited `price * quantity` from `source` and
    /// must credit the returned refunds.
    pub fn place(&mut self, source: &Id, price: i64, quantity: u16) -> BidPlacement {
        let mut placement = BidPlacement::default();
        let Some(last) = self.prices.len().checked_sub(1) else {
            placement.refunds.push((*source, price * i64::from(quantity)));
            return placement;
        };

        let refund = |key: Id, amount: i64, refunds: &mut Vec<(Id, i64)>| {
            if amount == 0 {
                return;
            }
            match refunds.iter_mut().find(|(k, _)| *k == key) {
                Some((_, total)) => *total += amount,
                None => refunds.push((key, amount)),
            }
        };

        for _ in 0..quantity {
            if price <= self.prices[last] {
                refund(*source, price, &mut placement.refunds);
                continue;
            }
            refund(self.bidders[last], self.prices[last], &mut placement.refunds);
            self.bidders[last] = *source;
            self.prices[last] = price;
            let mut j = last;
            while j > 0 && self.prices[j - 1] < self.prices[j] {
                self.prices.swap(j - 1, j);
                self.bidders.swap(j - 1, j);
                j -= 1;
            }
            placement.registered += 1;
        }
        placement
    }

    /// Encode as `bidders ‖ prices`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.shares() * 40);
        for bidder in &self.bidders {
            out.extend_from_slice(bidder.as_bytes());
        }
        for price in &self.prices {
            out.extend_from_slice(&price.to_le_bytes());
        }
        out
    }

    /// Decode a book of `shares` slots
    pub fn from_bytes(shares: usize, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != shares * 40 {
            return Err(LedgerError::decode(format!(
                "IPO book has {} bytes, expected {}",
                bytes.len(),
                shares * 40
            )));
        }
        let (keys, prices) = bytes.split_at(shares * 32);
        let bidders = keys
            .chunks_exact(32)
            .map(|chunk| {
                let mut key = [0u8; 32];
                key.copy_from_slice(chunk);
                Id(key)
            })
            .collect();
        let prices = prices
            .chunks_exact(8)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                i64::from_le_bytes(raw)
            })
            .collect();
        Ok(Self { bidders, prices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> Id {
        Id([n; 32])
    }

    #[test]
    fn test_bids_fill_empty_book() {
        let mut book = IpoBook::new(4);
        let placed = book.place(&id(1), 10, 2);
        assert_eq!(placed.registered, 2);
        assert!(placed.refunds.is_empty());
        assert_eq!(book.price(0), 10);
        assert_eq!(book.price(1), 10);
        assert_eq!(book.price(2), 0);
    }

    #[test]
    fn test_higher_bid_displaces_lowest() {
        let mut book = IpoBook::new(2);
        book.place(&id(1), 10, 1);
        book.place(&id(2), 5, 1);
        let placed = book.place(&id(3), 20, 1);
        assert_eq!(placed.registered, 1);
        assert_eq!(placed.refunds, vec![(id(2), 5)]);
        assert_eq!(book.bidder(0), id(3));
        assert_eq!(book.bidder(1), id(1));
    }

    #[test]
    fn test_low_bid_refunded() {
        let mut book = IpoBook::new(2);
        book.place(&id(1), 10, 2);
        let placed = book.place(&id(2), 10, 3);
        assert_eq!(placed.registered, 0);
        assert_eq!(placed.refunds, vec![(id(2), 30)]);
    }

    #[test]
    fn test_refunds_aggregate_by_bidder() {
        let mut book = IpoBook::new(2);
        book.place(&id(1), 10, 2);
        let placed = book.place(&id(2), 11, 3);
        assert_eq!(placed.registered, 2);
        assert_eq!(placed.refunds, vec![(id(1), 20), (id(2), 11)]);
        assert_eq!(book.price(0), 11);
        assert_eq!(book.price(1), 11);
    }

    #[test]
    fn test_book_encoding() {
        let mut book = IpoBook::new(3);
        book.place(&id(4), 7, 2);
        let restored = IpoBook::from_bytes(3, &book.to_bytes()).unwrap();
        assert_eq!(restored, book);
        assert!(IpoBook::from_bytes(2, &book.to_bytes()).is_err());
    }
}
