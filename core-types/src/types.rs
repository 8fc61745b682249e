// Copyright (c) James Kassemi, SC, US. All rights reserved.

use serde::{Deserialize, Serialize};

/// Money in integer cents. Signed: ledger deltas carry their direction.
pub type Cents = i64;

/// Render cents as a dollar string for messages and status lines.
pub fn format_cents(amount: Cents) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

pub type ListingId = u64;
pub type UserId = u64;
pub type EntryId = u64;
pub type NotificationId = u64;

/// Lifecycle of a timed break.
///
/// `Completed`, `Cancelled` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakStatus {
    Open,
    FullPendingSchedule,
    Scheduled,
    Live,
    Completed,
    Cancelled,
    Expired,
}

impl BreakStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BreakStatus::Completed | BreakStatus::Cancelled | BreakStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Authorized,
    Charged,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnKind {
    Deposit,
    Withdrawal,
    Purchase,
    Release,
}

impl TxnKind {
    /// Stable tag folded into row uids.
    pub fn tag(self) -> &'static str {
        match self {
            TxnKind::Deposit => "deposit",
            TxnKind::Withdrawal => "withdrawal",
            TxnKind::Purchase => "purchase",
            TxnKind::Release => "release",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    Mint,
    NearMint,
    LightlyPlayed,
    Played,
    Damaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradingCompany {
    Psa,
    Bgs,
    Cgc,
    Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantTag {
    Holo,
    ReverseHolo,
    FullArt,
    AltArt,
    FirstEdition,
    Shadowless,
    Promo,
}

/// Card energy types, colorless included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyType {
    Grass,
    Fire,
    Water,
    Lightning,
    Psychic,
    Fighting,
    Darkness,
    Metal,
    Fairy,
    Dragon,
    Colorless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    RawSingle,
    GradedSingle,
    SealedProduct,
    BreakSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SealedKind {
    BoosterBox,
    EliteTrainerBox,
    BoosterPack,
    CollectionBox,
    Tin,
}

/// Identity fields frozen onto rows at creation time. The live profile is
/// owned by the identity provider; rows never read it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub verified: bool,
}

impl UserSnapshot {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            avatar_url: None,
            verified: false,
        }
    }
}
