use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use core_types::{uid, EntryId, EntryStatus, ListingId, RowUid, UserId, UserSnapshot};

/// One participant's reservation in a timed break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakEntry {
    pub id: EntryId,
    pub uid: RowUid,
    pub listing_id: ListingId,
    pub user: UserSnapshot,
    pub status: EntryStatus,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistRow {
    pub listing_id: ListingId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub cancelled: bool,
}

struct BreakLedgerInner {
    entries: Vec<BreakEntry>,
    waitlist: Vec<WaitlistRow>,
    next_entry_id: EntryId,
}

/// Append-only record of break entries plus the per-break waitlist queue.
/// Capacity and status transitions are validated by the controller against
/// the listing before rows are appended or flipped here.
pub struct BreakLedger {
    inner: RwLock<BreakLedgerInner>,
}

impl BreakLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BreakLedgerInner {
                entries: Vec::new(),
                waitlist: Vec::new(),
                next_entry_id: 1,
            }),
        }
    }

    pub fn append(
        &self,
        listing_id: ListingId,
        user: UserSnapshot,
        joined_at: DateTime<Utc>,
    ) -> BreakEntry {
        let mut inner = self.inner.write();
        let seq = inner
            .entries
            .iter()
            .filter(|e| e.listing_id == listing_id)
            .count() as u64;
        let id = inner.next_entry_id;
        inner.next_entry_id += 1;
        let entry = BreakEntry {
            id,
            uid: uid::break_entry_uid(listing_id, user.id, seq, joined_at.timestamp_millis()),
            listing_id,
            user,
            status: EntryStatus::Authorized,
            joined_at,
        };
        inner.entries.push(entry.clone());
        entry
    }

    pub fn entry(&self, entry_id: EntryId) -> Option<BreakEntry> {
        self.inner
            .read()
            .entries
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
    }

    /// All entries for a listing in join order, cancelled included.
    pub fn entries_for(&self, listing_id: ListingId) -> Vec<BreakEntry> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| e.listing_id == listing_id)
            .cloned()
            .collect()
    }

    /// Count of entries still occupying a spot.
    pub fn active_count(&self, listing_id: ListingId) -> u32 {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| e.listing_id == listing_id && e.status != EntryStatus::Cancelled)
            .count() as u32
    }

    pub fn user_active_count(&self, listing_id: ListingId, user_id: UserId) -> u32 {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| {
                e.listing_id == listing_id
                    && e.user.id == user_id
                    && e.status != EntryStatus::Cancelled
            })
            .count() as u32
    }

    pub fn set_entry_status(&self, entry_id: EntryId, status: EntryStatus) -> bool {
        let mut inner = self.inner.write();
        match inner.entries.iter_mut().find(|e| e.id == entry_id) {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    /// Flips every `Authorized` entry to `Charged` and returns the flipped
    /// rows; settlement charges exactly these.
    pub fn charge_authorized(&self, listing_id: ListingId) -> Vec<BreakEntry> {
        let mut inner = self.inner.write();
        let mut charged = Vec::new();
        for entry in inner
            .entries
            .iter_mut()
            .filter(|e| e.listing_id == listing_id && e.status == EntryStatus::Authorized)
        {
            entry.status = EntryStatus::Charged;
            charged.push(entry.clone());
        }
        charged
    }

    /// Cancels every non-cancelled entry, returning each row with the status
    /// it held before cancellation so the caller can refund `Charged` ones.
    pub fn cancel_all_active(&self, listing_id: ListingId) -> Vec<(BreakEntry, EntryStatus)> {
        let mut inner = self.inner.write();
        let mut out = Vec::new();
        for entry in inner
            .entries
            .iter_mut()
            .filter(|e| e.listing_id == listing_id && e.status != EntryStatus::Cancelled)
        {
            let prior = entry.status;
            entry.status = EntryStatus::Cancelled;
            out.push((entry.clone(), prior));
        }
        out
    }

    /// Idempotent: re-joining returns the existing position.
    pub fn join_waitlist(
        &self,
        listing_id: ListingId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> u32 {
        let mut inner = self.inner.write();
        let already = inner
            .waitlist
            .iter()
            .any(|w| w.listing_id == listing_id && w.user_id == user_id && !w.cancelled);
        if !already {
            inner.waitlist.push(WaitlistRow {
                listing_id,
                user_id,
                joined_at,
                cancelled: false,
            });
        }
        Self::position_locked(&inner.waitlist, listing_id, user_id)
            .expect("row present after join")
    }

    /// 1-indexed rank among non-cancelled rows ordered by join time.
    pub fn waitlist_position(&self, listing_id: ListingId, user_id: UserId) -> Option<u32> {
        Self::position_locked(&self.inner.read().waitlist, listing_id, user_id)
    }

    pub fn leave_waitlist(&self, listing_id: ListingId, user_id: UserId) -> bool {
        let mut inner = self.inner.write();
        match inner
            .waitlist
            .iter_mut()
            .find(|w| w.listing_id == listing_id && w.user_id == user_id && !w.cancelled)
        {
            Some(row) => {
                row.cancelled = true;
                true
            }
            None => false,
        }
    }

    fn position_locked(waitlist: &[WaitlistRow], listing_id: ListingId, user_id: UserId) -> Option<u32> {
        let mut rank = 0;
        for row in waitlist.iter().filter(|w| w.listing_id == listing_id && !w.cancelled) {
            rank += 1;
            if row.user_id == user_id {
                return Some(rank);
            }
        }
        None
    }
}

impl Default for BreakLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: UserId) -> UserSnapshot {
        UserSnapshot::new(id, format!("user-{id}"))
    }

    #[test]
    fn active_counts_skip_cancelled_entries() {
        let ledger = BreakLedger::new();
        let now = Utc::now();
        let a = ledger.append(1, user(10), now);
        ledger.append(1, user(11), now);
        ledger.append(2, user(10), now);

        assert_eq!(ledger.active_count(1), 2);
        ledger.set_entry_status(a.id, EntryStatus::Cancelled);
        assert_eq!(ledger.active_count(1), 1);
        assert_eq!(ledger.user_active_count(1, 10), 0);
        assert_eq!(ledger.user_active_count(2, 10), 1);
    }

    #[test]
    fn charge_authorized_flips_only_authorized_rows() {
        let ledger = BreakLedger::new();
        let now = Utc::now();
        ledger.append(1, user(10), now);
        let b = ledger.append(1, user(11), now);
        ledger.set_entry_status(b.id, EntryStatus::Cancelled);

        let charged = ledger.charge_authorized(1);
        assert_eq!(charged.len(), 1);
        assert_eq!(charged[0].user.id, 10);
        assert_eq!(charged[0].status, EntryStatus::Charged);
        // second settlement pass finds nothing
        assert!(ledger.charge_authorized(1).is_empty());
    }

    #[test]
    fn cancel_all_active_reports_prior_status() {
        let ledger = BreakLedger::new();
        let now = Utc::now();
        let a = ledger.append(1, user(10), now);
        ledger.append(1, user(11), now);
        ledger.set_entry_status(a.id, EntryStatus::Charged);

        let cancelled = ledger.cancel_all_active(1);
        assert_eq!(cancelled.len(), 2);
        assert_eq!(cancelled[0].1, EntryStatus::Charged);
        assert_eq!(cancelled[1].1, EntryStatus::Authorized);
        assert_eq!(ledger.active_count(1), 0);
    }

    #[test]
    fn waitlist_rank_is_join_ordered_and_skips_cancelled() {
        let ledger = BreakLedger::new();
        let now = Utc::now();
        assert_eq!(ledger.join_waitlist(1, 10, now), 1);
        assert_eq!(ledger.join_waitlist(1, 11, now), 2);
        assert_eq!(ledger.join_waitlist(1, 12, now), 3);
        // idempotent
        assert_eq!(ledger.join_waitlist(1, 11, now), 2);

        assert!(ledger.leave_waitlist(1, 10));
        assert_eq!(ledger.waitlist_position(1, 11), Some(1));
        assert_eq!(ledger.waitlist_position(1, 12), Some(2));
        assert_eq!(ledger.waitlist_position(1, 10), None);
    }
}
