use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// A single provider's offer against an open service request.
///
/// `bid_index` is the position the ledger assigned this bid within the
/// request's bid array, used by consumers to resolve ties (spec §9,
/// Open Question (a): lowest index wins a tied lowest price).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub provider: Address,
    pub price: u64,
    pub bid_index: u64,
}

impl Bid {
    pub fn new(provider: Address, price: u64, bid_index: u64) -> Self {
        Self {
            provider,
            price,
            bid_index,
        }
    }
}

/// Pick the winning bid from a non-empty slice: lowest `price`, ties broken
/// by lowest `bid_index`. Returns `None` for an empty slice.
pub fn cheapest(bids: &[Bid]) -> Option<&Bid> {
    bids.iter()
        .min_by_key(|b| (b.price, b.bid_index))
}

/// Bids priced at or below `max_price`, preserving ledger order.
pub fn qualifying(bids: &[Bid], max_price: u64) -> Vec<&Bid> {
    bids.iter().filter(|b| b.price <= max_price).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(provider: u64, price: u64, bid_index: u64) -> Bid {
        Bid::new(Address::from_low_u64_be(provider), price, bid_index)
    }

    #[test]
    fn cheapest_picks_lowest_price() {
        let bids = vec![bid(1, 30, 0), bid(2, 10, 1), bid(3, 20, 2)];
        assert_eq!(cheapest(&bids).unwrap().provider, Address::from_low_u64_be(2));
    }

    #[test]
    fn cheapest_breaks_ties_by_lowest_bid_index() {
        let bids = vec![bid(1, 10, 2), bid(2, 10, 0), bid(3, 10, 1)];
        assert_eq!(cheapest(&bids).unwrap().provider, Address::from_low_u64_be(2));
    }

    #[test]
    fn cheapest_on_empty_is_none() {
        assert!(cheapest(&[]).is_none());
    }

    #[test]
    fn qualifying_filters_by_max_price() {
        let bids = vec![bid(1, 30, 0), bid(2, 10, 1), bid(3, 20, 2)];
        let q = qualifying(&bids, 20);
        assert_eq!(q.len(), 2);
    }
}
