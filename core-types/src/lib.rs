// Copyright (c) James Kassemi, SC, US. All rights reserved.

pub mod listing;
pub mod types;
pub mod uid;

pub use listing::{
    AuctionState, BreakState, CardAttributes, DraftMode, Listing, ListingDraft, ListingMode,
};
pub use types::{
    format_cents, BreakStatus, Category, Cents, Condition, EnergyType, EntryId, EntryStatus,
    GradingCompany, ListingId, NotificationId, SealedKind, TxnKind, UserId, UserSnapshot,
    VariantTag,
};
pub use uid::{RowUid, UID_LEN};
