//! Listing lifecycle and transaction engine.
//!
//! The crate exposes:
//! - [`MarketController`]: high-level API orchestrating the catalog and the
//!   bid/break/wallet ledgers.
//! - [`Catalog`]: the listing store with the per-listing atomicity primitive.
//! - [`BidLedger`] / [`BreakLedger`] / [`WalletLedger`]: append-only records
//!   that derive current state.
//! - [`NotificationSink`] / [`NotificationLog`]: fire-and-forget transition
//!   events.
//! - [`SnapshotStore`]: injected persistence for the catalog.

pub mod bids;
pub mod breaks;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod notify;
pub mod storage;
pub mod wallet;

pub use bids::{BidLedger, BidRow};
pub use breaks::{BreakEntry, BreakLedger, WaitlistRow};
pub use catalog::Catalog;
pub use config::MarketConfig;
pub use controller::{BreakSettlement, EngineStatus, MarketController};
pub use error::{MarketError, Result};
pub use notify::{Notification, NotificationKind, NotificationLog, NotificationSink};
pub use storage::{CatalogSnapshot, JsonSnapshotStore, MemorySnapshotStore, SnapshotStore, StorageError};
pub use wallet::{WalletLedger, WalletTxn};
