use thiserror::Error;

use core_types::{BreakStatus, Cents, EntryId, ListingId, UserId};
use identity::IdentityError;

use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, MarketError>;

/// Every mutator failure is expected and recoverable; the message is surfaced
/// to the caller verbatim.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("listing {listing_id} not found")]
    NotFound { listing_id: ListingId },
    #[error("break entry {entry_id} not found")]
    EntryNotFound { entry_id: EntryId },
    #[error("break entry {entry_id} is already cancelled")]
    EntryAlreadyCancelled { entry_id: EntryId },
    #[error("no signed-in user")]
    SignedOut,
    #[error("operation not valid for listing {listing_id}'s mode")]
    WrongMode { listing_id: ListingId },
    #[error("listing {listing_id} is already sold")]
    AlreadySold { listing_id: ListingId },
    #[error("bid of {offered} is below the minimum of {floor}")]
    BidTooLow { offered: Cents, floor: Cents },
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: Cents, available: Cents },
    #[error("break is full ({target} spots taken)")]
    BreakFull { target: u32 },
    #[error("break is not accepting entries while {status:?}")]
    BreakClosed { status: BreakStatus },
    #[error("entry limit of {limit} per user reached")]
    EntryLimitReached { limit: u32 },
    #[error("scheduled time {live_at} is not in the future")]
    ScheduleNotFuture { live_at: chrono::DateTime<chrono::Utc> },
    #[error("break cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: BreakStatus, to: BreakStatus },
    #[error("user {user_id} is not allowed to perform this action")]
    Forbidden { user_id: UserId },
    #[error("amount {amount} is not a positive value")]
    InvalidAmount { amount: Cents },
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
