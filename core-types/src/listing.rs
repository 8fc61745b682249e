use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    BreakStatus, Category, Cents, Condition, EnergyType, GradingCompany, ListingId, SealedKind,
    UserId, UserSnapshot, VariantTag,
};

/// One selling unit. The transaction mode lives in [`ListingMode`] so an
/// auction can never carry break state and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub title: String,
    pub description: String,
    /// Starting price for auctions, sale price for direct sales, per-spot
    /// entry fee for timed breaks.
    pub price: Cents,
    pub seller: UserSnapshot,
    pub created_at: DateTime<Utc>,
    pub is_sold: bool,
    pub card: CardAttributes,
    pub mode: ListingMode,
}

impl Listing {
    pub fn auction(&self) -> Option<&AuctionState> {
        match &self.mode {
            ListingMode::Auction(state) => Some(state),
            _ => None,
        }
    }

    pub fn auction_mut(&mut self) -> Option<&mut AuctionState> {
        match &mut self.mode {
            ListingMode::Auction(state) => Some(state),
            _ => None,
        }
    }

    pub fn timed_break(&self) -> Option<&BreakState> {
        match &self.mode {
            ListingMode::TimedBreak(state) => Some(state),
            _ => None,
        }
    }

    pub fn timed_break_mut(&mut self) -> Option<&mut BreakState> {
        match &mut self.mode {
            ListingMode::TimedBreak(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_timed_break(&self) -> bool {
        matches!(self.mode, ListingMode::TimedBreak(_))
    }

    pub fn bids_count(&self) -> u32 {
        self.auction().map(|a| a.bids_count).unwrap_or(0)
    }

    /// Deadline used by ending-soon ordering: auction close, else break
    /// close, else none.
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        match &self.mode {
            ListingMode::Auction(state) => state.ends_at,
            ListingMode::TimedBreak(state) => state.closes_at,
            ListingMode::DirectSale => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ListingMode {
    DirectSale,
    Auction(AuctionState),
    TimedBreak(BreakState),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionState {
    /// 0 until the first bid lands.
    pub current_bid: Cents,
    pub bids_count: u32,
    pub high_bidder: Option<UserId>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl AuctionState {
    pub fn new(ends_at: Option<DateTime<Utc>>) -> Self {
        Self {
            current_bid: 0,
            bids_count: 0,
            high_bidder: None,
            ends_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakState {
    pub target_participants: u32,
    pub current_participants: u32,
    pub status: BreakStatus,
    pub closes_at: Option<DateTime<Utc>>,
    pub scheduled_live_at: Option<DateTime<Utc>>,
    pub live_link: Option<String>,
    pub live_started_at: Option<DateTime<Utc>>,
    pub live_ended_at: Option<DateTime<Utc>>,
    pub max_entries_per_user: u32,
    /// Set only at completion.
    pub results_media: Vec<String>,
    pub results_notes: Option<String>,
}

impl BreakState {
    pub fn new(
        target_participants: u32,
        max_entries_per_user: u32,
        closes_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            target_participants,
            current_participants: 0,
            status: BreakStatus::Open,
            closes_at,
            scheduled_live_at: None,
            live_link: None,
            live_started_at: None,
            live_ended_at: None,
            max_entries_per_user,
            results_media: Vec::new(),
            results_notes: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.current_participants >= self.target_participants
    }
}

/// Seller-supplied fields for a new listing. Ids, seller snapshot and all
/// transactional state are stamped by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub price: Cents,
    pub card: CardAttributes,
    pub mode: DraftMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DraftMode {
    DirectSale,
    Auction {
        ends_at: Option<DateTime<Utc>>,
    },
    TimedBreak {
        target_participants: u32,
        max_entries_per_user: u32,
        closes_at: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardAttributes {
    pub pokemon_name: Option<String>,
    pub set_name: Option<String>,
    pub series: Option<String>,
    pub set_id: Option<String>,
    pub language: Option<String>,
    pub booster_name: Option<String>,
    pub condition: Option<Condition>,
    pub grading: Option<GradingCompany>,
    pub variant_tags: Vec<VariantTag>,
    pub energy_types: Vec<EnergyType>,
    pub category: Option<Category>,
    pub sealed_kind: Option<SealedKind>,
}
