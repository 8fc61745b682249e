use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use core_types::{uid, Cents, ListingId, RowUid, UserSnapshot};

/// Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidRow {
    pub uid: RowUid,
    pub listing_id: ListingId,
    pub bidder: UserSnapshot,
    pub amount: Cents,
    pub placed_at: DateTime<Utc>,
}

/// Append-only bid record. Monotonicity of amounts per listing is enforced
/// by the controller against the listing's `current_bid` before any append
/// lands here.
pub struct BidLedger {
    rows: RwLock<Vec<BidRow>>,
}

impl BidLedger {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn append(
        &self,
        listing_id: ListingId,
        bidder: UserSnapshot,
        amount: Cents,
        placed_at: DateTime<Utc>,
    ) -> BidRow {
        let row = BidRow {
            uid: uid::bid_uid(listing_id, bidder.id, amount, placed_at.timestamp_millis()),
            listing_id,
            bidder,
            amount,
            placed_at,
        };
        self.rows.write().push(row.clone());
        row
    }

    /// Highest first, independent of insertion order; ties keep insertion
    /// order (stable sort) so the earlier bid stays in front.
    pub fn bids_for(&self, listing_id: ListingId) -> Vec<BidRow> {
        let mut rows: Vec<BidRow> = self
            .rows
            .read()
            .iter()
            .filter(|r| r.listing_id == listing_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.amount.cmp(&a.amount));
        rows
    }

    pub fn count_for(&self, listing_id: ListingId) -> u32 {
        self.rows
            .read()
            .iter()
            .filter(|r| r.listing_id == listing_id)
            .count() as u32
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl Default for BidLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bids_for_sorts_highest_first() {
        let ledger = BidLedger::new();
        let now = Utc::now();
        ledger.append(1, UserSnapshot::new(10, "a"), 1_000, now);
        ledger.append(1, UserSnapshot::new(11, "b"), 1_500, now);
        ledger.append(2, UserSnapshot::new(12, "c"), 9_999, now);
        ledger.append(1, UserSnapshot::new(13, "d"), 1_200, now);

        let rows = ledger.bids_for(1);
        let amounts: Vec<Cents> = rows.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![1_500, 1_200, 1_000]);
        assert_eq!(ledger.count_for(1), 3);
        assert_eq!(ledger.count_for(2), 1);
    }
}
