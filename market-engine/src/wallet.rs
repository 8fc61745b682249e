use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use core_types::{uid, Cents, ListingId, RowUid, TxnKind, UserId};
use identity::{IdentityError, IdentityProvider};

use crate::error::Result;

/// Immutable ledger row. `balance_after` is a snapshot taken at append time,
/// never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTxn {
    pub uid: RowUid,
    pub user_id: UserId,
    pub amount: Cents,
    pub kind: TxnKind,
    pub description: String,
    pub balance_after: Cents,
    pub reference: Option<ListingId>,
    pub created_at: DateTime<Utc>,
}

/// Append-only transaction log. Every balance change in the engine lands
/// here first, then the same delta is applied to the live balance through
/// the identity collaborator, so the two can never diverge.
pub struct WalletLedger {
    rows: Mutex<Vec<WalletTxn>>,
}

impl WalletLedger {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    /// Ledger first, live balance second. The row lock is held across the
    /// identity call so two records for the same user cannot interleave.
    pub fn record(
        &self,
        identity: &dyn IdentityProvider,
        user_id: UserId,
        amount: Cents,
        kind: TxnKind,
        description: impl Into<String>,
        reference: Option<ListingId>,
    ) -> Result<WalletTxn> {
        let mut rows = self.rows.lock();
        let balance_before = identity
            .user(user_id)
            .ok_or(IdentityError::UnknownUser { user_id })?
            .balance;
        let created_at = Utc::now();
        let row = WalletTxn {
            uid: uid::wallet_txn_uid(
                user_id,
                amount,
                kind.tag(),
                rows.len() as u64,
                created_at.timestamp_millis(),
            ),
            user_id,
            amount,
            kind,
            description: description.into(),
            balance_after: balance_before + amount,
            reference,
            created_at,
        };
        rows.push(row.clone());
        identity.apply_balance_delta(user_id, amount)?;
        Ok(row)
    }

    /// In append order; the last row carries the user's current balance.
    pub fn transactions_for(&self, user_id: UserId) -> Vec<WalletTxn> {
        self.rows
            .lock()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn latest_for(&self, user_id: UserId) -> Option<WalletTxn> {
        self.rows
            .lock()
            .iter()
            .rev()
            .find(|r| r.user_id == user_id)
            .cloned()
    }

    /// True when the live balance matches the latest row's `balance_after`
    /// (or the user has no rows). A mismatch is a programming defect, not a
    /// runtime condition to recover from.
    pub fn audit(&self, identity: &dyn IdentityProvider, user_id: UserId) -> bool {
        let live = identity.user(user_id).map(|u| u.balance);
        match (self.latest_for(user_id), live) {
            (Some(row), Some(balance)) => row.balance_after == balance,
            (None, _) => true,
            (Some(_), None) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

impl Default for WalletLedger {
    fn default() -> Self {
        Self::new()
    }
}
