// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Deterministic 128-bit identifiers for ledger rows.
//!
//! Rows are immutable once appended, so a content-derived uid doubles as an
//! audit handle: replaying the same ledger yields the same uids.

use blake3::Hasher;

use crate::types::{Cents, ListingId, UserId};

pub const UID_LEN: usize = 16;
pub type RowUid = [u8; UID_LEN];

struct UidBuilder {
    hasher: Hasher,
}

impl UidBuilder {
    fn new(domain: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(&(domain.len() as u32).to_le_bytes());
        hasher.update(domain);
        Self { hasher }
    }

    fn write_len_prefixed(&mut self, bytes: &[u8]) {
        self.hasher.update(&(bytes.len() as u32).to_le_bytes());
        self.hasher.update(bytes);
    }

    fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_len_prefixed(value.as_bytes());
        self
    }

    fn write_i64(&mut self, value: i64) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    fn write_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    fn finish(self) -> [u8; UID_LEN] {
        let hash = self.hasher.finalize();
        let mut bytes = [0u8; UID_LEN];
        bytes.copy_from_slice(&hash.as_bytes()[..UID_LEN]);
        bytes
    }
}

/// Build a uid for a bid row.
pub fn bid_uid(listing_id: ListingId, bidder_id: UserId, amount: Cents, placed_at_ms: i64) -> RowUid {
    let mut builder = UidBuilder::new(b"bid_uid.v1");
    builder
        .write_u64(listing_id)
        .write_u64(bidder_id)
        .write_i64(amount)
        .write_i64(placed_at_ms);
    builder.finish()
}

/// Build a uid for a break entry. `seq` is the per-listing entry ordinal, so
/// a user holding several spots in the same break gets distinct uids.
pub fn break_entry_uid(listing_id: ListingId, user_id: UserId, seq: u64, joined_at_ms: i64) -> RowUid {
    let mut builder = UidBuilder::new(b"break_entry_uid.v1");
    builder
        .write_u64(listing_id)
        .write_u64(user_id)
        .write_u64(seq)
        .write_i64(joined_at_ms);
    builder.finish()
}

/// Build a uid for a wallet transaction. `seq` is the ledger row ordinal.
pub fn wallet_txn_uid(
    user_id: UserId,
    amount: Cents,
    kind_tag: &str,
    seq: u64,
    created_at_ms: i64,
) -> RowUid {
    let mut builder = UidBuilder::new(b"wallet_txn_uid.v1");
    builder
        .write_u64(user_id)
        .write_i64(amount)
        .write_str(kind_tag)
        .write_u64(seq)
        .write_i64(created_at_ms);
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uids_are_stable_and_distinct() {
        let a = bid_uid(1, 7, 1_500, 1_700_000_000_000);
        let b = bid_uid(1, 7, 1_500, 1_700_000_000_000);
        let c = bid_uid(1, 7, 1_600, 1_700_000_000_000);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn txn_seq_disambiguates_identical_operations() {
        let a = wallet_txn_uid(3, -500, "purchase", 0, 1_700_000_000_000);
        let b = wallet_txn_uid(3, -500, "purchase", 1, 1_700_000_000_000);
        assert_ne!(a, b);
    }
}
