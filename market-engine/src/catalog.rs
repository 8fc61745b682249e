use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use core_types::{
    AuctionState, BreakState, DraftMode, Listing, ListingDraft, ListingId, ListingMode,
    UserSnapshot,
};

use crate::error::{MarketError, Result};

struct CatalogInner {
    /// Newest first; `create` prepends.
    listings: Vec<Listing>,
    next_id: ListingId,
}

/// The set of all listings. Holds no business rules: validation lives with
/// the ledger mutators, which reach listings through [`Catalog::with_listing_mut`]
/// so check-then-act on one listing is atomic with respect to other callers.
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CatalogInner {
                listings: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Rebuild from a persisted snapshot.
    pub fn from_parts(listings: Vec<Listing>, next_id: ListingId) -> Self {
        Self {
            inner: RwLock::new(CatalogInner { listings, next_id }),
        }
    }

    pub fn create(
        &self,
        draft: ListingDraft,
        seller: UserSnapshot,
        default_entry_cap: u32,
        now: DateTime<Utc>,
    ) -> Listing {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;

        let mode = match draft.mode {
            DraftMode::DirectSale => ListingMode::DirectSale,
            DraftMode::Auction { ends_at } => ListingMode::Auction(AuctionState::new(ends_at)),
            DraftMode::TimedBreak {
                target_participants,
                max_entries_per_user,
                closes_at,
            } => {
                let cap = if max_entries_per_user == 0 {
                    default_entry_cap
                } else {
                    max_entries_per_user
                };
                ListingMode::TimedBreak(BreakState::new(target_participants, cap, closes_at))
            }
        };

        let listing = Listing {
            id,
            title: draft.title,
            description: draft.description,
            price: draft.price,
            seller,
            created_at: now,
            is_sold: false,
            card: draft.card,
            mode,
        };
        inner.listings.insert(0, listing.clone());
        listing
    }

    /// Merge-style mutation. Returns `false` without touching anything when
    /// the id is absent; callers treat that as not-found.
    pub fn update<F>(&self, id: ListingId, f: F) -> bool
    where
        F: FnOnce(&mut Listing),
    {
        let mut inner = self.inner.write();
        match inner.listings.iter_mut().find(|l| l.id == id) {
            Some(listing) => {
                f(listing);
                true
            }
            None => false,
        }
    }

    /// Validation plus mutation under one write lock. The closure's error
    /// leaves the listing untouched only if the closure mutates nothing
    /// before failing; mutators therefore run every check before the first
    /// write.
    pub fn with_listing_mut<F, T>(&self, id: ListingId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Listing) -> Result<T>,
    {
        let mut inner = self.inner.write();
        let listing = inner
            .listings
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(MarketError::NotFound { listing_id: id })?;
        f(listing)
    }

    /// Runs `f` over every listing under one write lock, collecting the
    /// non-`None` results. Used by sweep-style maintenance.
    pub fn map_listings_mut<F, T>(&self, mut f: F) -> Vec<T>
    where
        F: FnMut(&mut Listing) -> Option<T>,
    {
        let mut inner = self.inner.write();
        inner.listings.iter_mut().filter_map(|l| f(l)).collect()
    }

    pub fn get(&self, id: ListingId) -> Option<Listing> {
        self.inner.read().listings.iter().find(|l| l.id == id).cloned()
    }

    /// Consistent copy of the whole catalog under one read lock; projections
    /// never observe a half-applied update.
    pub fn snapshot(&self) -> Vec<Listing> {
        self.inner.read().listings.clone()
    }

    pub fn next_id(&self) -> ListingId {
        self.inner.read().next_id
    }

    pub fn len(&self) -> usize {
        self.inner.read().listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().listings.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
