use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};

use core_types::{
    format_cents, BreakStatus, Cents, EntryId, EntryStatus, Listing, ListingDraft, ListingId,
    ListingMode, TxnKind, UserId,
};
use identity::{IdentityError, IdentityProvider, UserProfile};

use crate::{
    bids::{BidLedger, BidRow},
    breaks::{BreakEntry, BreakLedger},
    catalog::Catalog,
    config::MarketConfig,
    error::{MarketError, Result},
    notify::{Notification, NotificationKind, NotificationSink},
    storage::{CatalogSnapshot, SnapshotStore},
    wallet::{WalletLedger, WalletTxn},
};

/// Outcome of a break settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakSettlement {
    pub charged: u32,
    pub total: Cents,
}

/// Counts reported to the status logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStatus {
    pub listings: usize,
    pub direct_sales: usize,
    pub auctions: usize,
    pub breaks: usize,
    pub open_breaks: usize,
    pub live_breaks: usize,
    pub bids: usize,
    pub wallet_rows: usize,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} listings ({} sales, {} auctions, {} breaks; {} open, {} live), {} bids, {} wallet rows",
            self.listings,
            self.direct_sales,
            self.auctions,
            self.breaks,
            self.open_breaks,
            self.live_breaks,
            self.bids,
            self.wallet_rows
        )
    }
}

/// High-level API orchestrating the catalog and the three ledgers.
///
/// Single-writer per listing: every check-then-act runs inside one catalog
/// write lock, so two mutators on the same listing can never both observe
/// the pre-mutation state.
pub struct MarketController {
    config: MarketConfig,
    catalog: Catalog,
    bids: BidLedger,
    breaks: BreakLedger,
    wallet: WalletLedger,
    identity: Arc<dyn IdentityProvider>,
    sink: Arc<dyn NotificationSink>,
    store: Box<dyn SnapshotStore>,
}

impl MarketController {
    pub fn bootstrap(
        config: MarketConfig,
        identity: Arc<dyn IdentityProvider>,
        sink: Arc<dyn NotificationSink>,
        store: Box<dyn SnapshotStore>,
    ) -> Result<Self> {
        let catalog = match store.load()? {
            Some(snapshot) => {
                info!(
                    "catalog restored: {} listings, next id {}",
                    snapshot.listings.len(),
                    snapshot.next_listing_id
                );
                Catalog::from_parts(snapshot.listings, snapshot.next_listing_id)
            }
            None => Catalog::new(),
        };
        Ok(Self {
            config,
            catalog,
            bids: BidLedger::new(),
            breaks: BreakLedger::new(),
            wallet: WalletLedger::new(),
            identity,
            sink,
            store,
        })
    }

    // ---- catalog -----------------------------------------------------------

    /// Creates a listing for the signed-in user; the seller snapshot is
    /// frozen here.
    pub fn create_listing(&self, draft: ListingDraft) -> Result<Listing> {
        let seller = self.identity.current_user().ok_or(MarketError::SignedOut)?;
        let listing = self.catalog.create(
            draft,
            seller.snapshot(),
            self.config.default_max_entries_per_user,
            Utc::now(),
        );
        info!("listing {} created: {:?}", listing.id, listing.title);
        self.persist_catalog()?;
        Ok(listing)
    }

    pub fn listing(&self, id: ListingId) -> Option<Listing> {
        self.catalog.get(id)
    }

    /// Consistent snapshot for read-side projections.
    pub fn listings(&self) -> Vec<Listing> {
        self.catalog.snapshot()
    }

    // ---- bids --------------------------------------------------------------

    /// Authorization-only: no funds move at bid time.
    pub fn place_bid(&self, listing_id: ListingId, bidder_id: UserId, amount: Cents) -> Result<BidRow> {
        let bidder = self.user(bidder_id)?;
        let seller_id = self.catalog.with_listing_mut(listing_id, |listing| {
            if listing.is_sold {
                return Err(MarketError::AlreadySold { listing_id });
            }
            let starting_price = listing.price;
            let seller_id = listing.seller.id;
            let auction = listing
                .auction_mut()
                .ok_or(MarketError::WrongMode { listing_id })?;
            // the first bid may equal the starting price; later bids must
            // strictly exceed the current high bid
            let floor = if auction.bids_count == 0 {
                starting_price
            } else {
                auction.current_bid + 1
            };
            if amount < floor {
                return Err(MarketError::BidTooLow { offered: amount, floor });
            }
            if bidder.balance < amount {
                return Err(MarketError::InsufficientFunds {
                    required: amount,
                    available: bidder.balance,
                });
            }
            auction.current_bid = amount;
            auction.bids_count += 1;
            auction.high_bidder = Some(bidder_id);
            Ok(seller_id)
        })?;

        let row = self
            .bids
            .append(listing_id, bidder.snapshot(), amount, Utc::now());
        debug!(
            "bid {} on listing {} by user {}",
            format_cents(amount),
            listing_id,
            bidder_id
        );
        self.notify(
            seller_id,
            NotificationKind::NewBid,
            "New bid",
            format!(
                "{} bid {} on your listing",
                row.bidder.display_name,
                format_cents(amount)
            ),
            Some(listing_id),
        );
        Ok(row)
    }

    /// Highest first for current-leader display.
    pub fn bids_by_listing(&self, listing_id: ListingId) -> Vec<BidRow> {
        self.bids.bids_for(listing_id)
    }

    // ---- wallet ------------------------------------------------------------

    pub fn deposit_funds(&self, user_id: UserId, amount: Cents) -> Result<WalletTxn> {
        if amount <= 0 {
            return Err(MarketError::InvalidAmount { amount });
        }
        self.wallet.record(
            self.identity.as_ref(),
            user_id,
            amount,
            TxnKind::Deposit,
            "deposit",
            None,
        )
    }

    pub fn withdraw_funds(&self, user_id: UserId, amount: Cents) -> Result<WalletTxn> {
        if amount <= 0 {
            return Err(MarketError::InvalidAmount { amount });
        }
        let balance = self.user(user_id)?.balance;
        if balance < amount {
            return Err(MarketError::InsufficientFunds {
                required: amount,
                available: balance,
            });
        }
        self.wallet.record(
            self.identity.as_ref(),
            user_id,
            -amount,
            TxnKind::Withdrawal,
            "withdrawal",
            None,
        )
    }

    /// Idempotent against double charges: a sold listing can never be bought
    /// again.
    pub fn buy_now(&self, listing_id: ListingId, buyer_id: UserId) -> Result<WalletTxn> {
        let buyer = self.user(buyer_id)?;
        let (price, seller_id, title) = self.catalog.with_listing_mut(listing_id, |listing| {
            if !matches!(listing.mode, ListingMode::DirectSale) {
                return Err(MarketError::WrongMode { listing_id });
            }
            if listing.is_sold {
                return Err(MarketError::AlreadySold { listing_id });
            }
            if buyer.balance < listing.price {
                return Err(MarketError::InsufficientFunds {
                    required: listing.price,
                    available: buyer.balance,
                });
            }
            listing.is_sold = true;
            Ok((listing.price, listing.seller.id, listing.title.clone()))
        })?;

        let txn = self.wallet.record(
            self.identity.as_ref(),
            buyer_id,
            -price,
            TxnKind::Purchase,
            format!("purchase: {title}"),
            Some(listing_id),
        )?;
        info!(
            "listing {} sold to user {} for {}",
            listing_id,
            buyer_id,
            format_cents(price)
        );
        self.notify(
            seller_id,
            NotificationKind::Sale,
            "Item sold",
            format!("{} sold for {}", title, format_cents(price)),
            Some(listing_id),
        );
        self.persist_catalog()?;
        Ok(txn)
    }

    pub fn transactions_for(&self, user_id: UserId) -> Vec<WalletTxn> {
        self.wallet.transactions_for(user_id)
    }

    /// Ledger/live-balance consistency probe; a `false` here is a defect.
    pub fn audit_wallet(&self, user_id: UserId) -> bool {
        self.wallet.audit(self.identity.as_ref(), user_id)
    }

    // ---- breaks ------------------------------------------------------------

    /// Reserves one spot. The balance check is authorization only; the
    /// charge happens at settlement.
    pub fn join_break(&self, listing_id: ListingId, user_id: UserId) -> Result<BreakEntry> {
        let user = self.user(user_id)?;
        let (fee, seller_id, title, became_full) =
            self.catalog.with_listing_mut(listing_id, |listing| {
                let fee = listing.price;
                let seller_id = listing.seller.id;
                let title = listing.title.clone();
                let held = self.breaks.user_active_count(listing_id, user_id);
                let state = listing
                    .timed_break_mut()
                    .ok_or(MarketError::WrongMode { listing_id })?;
                if state.is_full() {
                    return Err(MarketError::BreakFull {
                        target: state.target_participants,
                    });
                }
                if state.status != BreakStatus::Open {
                    return Err(MarketError::BreakClosed {
                        status: state.status,
                    });
                }
                if held >= state.max_entries_per_user {
                    return Err(MarketError::EntryLimitReached {
                        limit: state.max_entries_per_user,
                    });
                }
                if user.balance < fee {
                    return Err(MarketError::InsufficientFunds {
                        required: fee,
                        available: user.balance,
                    });
                }
                state.current_participants += 1;
                let became_full = state.is_full();
                if became_full {
                    state.status = BreakStatus::FullPendingSchedule;
                }
                Ok((fee, seller_id, title, became_full))
            })?;

        let entry = self.breaks.append(listing_id, user.snapshot(), Utc::now());
        debug!(
            "user {} joined break {} (fee {})",
            user_id,
            listing_id,
            format_cents(fee)
        );
        if became_full {
            info!("break {} is full, awaiting schedule", listing_id);
            self.notify(
                seller_id,
                NotificationKind::BreakFull,
                "Break full",
                format!("{title} is fully subscribed and ready to schedule"),
                Some(listing_id),
            );
        }
        self.persist_catalog()?;
        Ok(entry)
    }

    pub fn schedule_break(
        &self,
        listing_id: ListingId,
        actor_id: UserId,
        live_at: DateTime<Utc>,
        link: impl Into<String>,
    ) -> Result<()> {
        let now = Utc::now();
        if live_at <= now {
            return Err(MarketError::ScheduleNotFuture { live_at });
        }
        let link = link.into();
        let title = self.catalog.with_listing_mut(listing_id, |listing| {
            Self::require_owner(listing, actor_id)?;
            let state = listing
                .timed_break_mut()
                .ok_or(MarketError::WrongMode { listing_id })?;
            if state.status != BreakStatus::FullPendingSchedule {
                return Err(MarketError::InvalidTransition {
                    from: state.status,
                    to: BreakStatus::Scheduled,
                });
            }
            state.status = BreakStatus::Scheduled;
            state.scheduled_live_at = Some(live_at);
            state.live_link = Some(link.clone());
            Ok(listing.title.clone())
        })?;

        info!("break {} scheduled for {}", listing_id, live_at);
        self.notify_participants(
            listing_id,
            NotificationKind::BreakScheduled,
            "Break scheduled",
            format!("{title} goes live at {live_at}"),
        );
        self.persist_catalog()
    }

    pub fn start_break(&self, listing_id: ListingId, actor_id: UserId) -> Result<()> {
        let title = self.catalog.with_listing_mut(listing_id, |listing| {
            Self::require_owner(listing, actor_id)?;
            let state = listing
                .timed_break_mut()
                .ok_or(MarketError::WrongMode { listing_id })?;
            if state.status != BreakStatus::Scheduled {
                return Err(MarketError::InvalidTransition {
                    from: state.status,
                    to: BreakStatus::Live,
                });
            }
            state.status = BreakStatus::Live;
            state.live_started_at = Some(Utc::now());
            Ok(listing.title.clone())
        })?;

        info!("break {} is live", listing_id);
        self.notify_participants(
            listing_id,
            NotificationKind::BreakStart,
            "Break live",
            format!("{title} is live now"),
        );
        self.persist_catalog()
    }

    /// Ends the live event and settles it: every authorized entry converts
    /// to charged and a purchase transaction is ledgered per participant.
    pub fn complete_break(
        &self,
        listing_id: ListingId,
        actor_id: UserId,
        results_media: Vec<String>,
        results_notes: Option<String>,
    ) -> Result<BreakSettlement> {
        let (fee, title) = self.catalog.with_listing_mut(listing_id, |listing| {
            Self::require_owner(listing, actor_id)?;
            let fee = listing.price;
            let state = listing
                .timed_break_mut()
                .ok_or(MarketError::WrongMode { listing_id })?;
            if state.status != BreakStatus::Live {
                return Err(MarketError::InvalidTransition {
                    from: state.status,
                    to: BreakStatus::Completed,
                });
            }
            state.status = BreakStatus::Completed;
            state.live_ended_at = Some(Utc::now());
            state.results_media = results_media.clone();
            state.results_notes = results_notes.clone();
            Ok((fee, listing.title.clone()))
        })?;

        let charged = self.breaks.charge_authorized(listing_id);
        for entry in &charged {
            self.wallet.record(
                self.identity.as_ref(),
                entry.user.id,
                -fee,
                TxnKind::Purchase,
                format!("break settlement: {title}"),
                Some(listing_id),
            )?;
            self.notify(
                entry.user.id,
                NotificationKind::BreakEnd,
                "Break completed",
                format!("{} ended; you were charged {}", title, format_cents(fee)),
                Some(listing_id),
            );
        }
        let settlement = BreakSettlement {
            charged: charged.len() as u32,
            total: fee * charged.len() as Cents,
        };
        info!(
            "break {} completed: {} entries charged, {} total",
            listing_id,
            settlement.charged,
            format_cents(settlement.total)
        );
        self.persist_catalog()?;
        Ok(settlement)
    }

    /// Cancels from any non-terminal state; charged entries are refunded.
    pub fn cancel_break(&self, listing_id: ListingId, actor_id: UserId) -> Result<()> {
        let (fee, title) = self.catalog.with_listing_mut(listing_id, |listing| {
            Self::require_owner(listing, actor_id)?;
            let fee = listing.price;
            let state = listing
                .timed_break_mut()
                .ok_or(MarketError::WrongMode { listing_id })?;
            if state.status.is_terminal() {
                return Err(MarketError::InvalidTransition {
                    from: state.status,
                    to: BreakStatus::Cancelled,
                });
            }
            state.status = BreakStatus::Cancelled;
            Ok((fee, listing.title.clone()))
        })?;

        let cancelled = self.breaks.cancel_all_active(listing_id);
        self.catalog.update(listing_id, |listing| {
            if let Some(state) = listing.timed_break_mut() {
                state.current_participants = 0;
            }
        });
        for (entry, prior) in &cancelled {
            if *prior == EntryStatus::Charged {
                self.wallet.record(
                    self.identity.as_ref(),
                    entry.user.id,
                    fee,
                    TxnKind::Release,
                    format!("break cancelled refund: {title}"),
                    Some(listing_id),
                )?;
                self.notify(
                    entry.user.id,
                    NotificationKind::FundsReleased,
                    "Funds released",
                    format!("{} refunded for {}", format_cents(fee), title),
                    Some(listing_id),
                );
            }
            self.notify(
                entry.user.id,
                NotificationKind::BreakCancelled,
                "Break cancelled",
                format!("{title} was cancelled"),
                Some(listing_id),
            );
        }
        info!("break {} cancelled ({} entries released)", listing_id, cancelled.len());
        self.persist_catalog()
    }

    /// Owner removal is allowed while the break is non-terminal; self
    /// removal is blocked once the break is live or terminal. Frees the spot
    /// and reverts a full break to open.
    pub fn remove_break_entry(&self, entry_id: EntryId, actor_id: UserId) -> Result<()> {
        let entry = self
            .breaks
            .entry(entry_id)
            .ok_or(MarketError::EntryNotFound { entry_id })?;
        if entry.status == EntryStatus::Cancelled {
            return Err(MarketError::EntryAlreadyCancelled { entry_id });
        }
        let listing_id = entry.listing_id;
        self.catalog.with_listing_mut(listing_id, |listing| {
            let owner = listing.seller.id == actor_id;
            let state = listing
                .timed_break_mut()
                .ok_or(MarketError::WrongMode { listing_id })?;
            if owner {
                if state.status.is_terminal() {
                    return Err(MarketError::BreakClosed {
                        status: state.status,
                    });
                }
            } else if entry.user.id == actor_id {
                if matches!(
                    state.status,
                    BreakStatus::Live | BreakStatus::Completed | BreakStatus::Cancelled
                ) {
                    return Err(MarketError::BreakClosed {
                        status: state.status,
                    });
                }
            } else {
                return Err(MarketError::Forbidden { user_id: actor_id });
            }
            state.current_participants = state.current_participants.saturating_sub(1);
            if state.status == BreakStatus::FullPendingSchedule {
                state.status = BreakStatus::Open;
            }
            Ok(())
        })?;

        self.breaks.set_entry_status(entry_id, EntryStatus::Cancelled);
        debug!("entry {} removed from break {}", entry_id, listing_id);
        self.notify(
            entry.user.id,
            NotificationKind::EntryRemoved,
            "Entry removed",
            "Your break entry was removed and the spot released".to_string(),
            Some(listing_id),
        );
        self.persist_catalog()
    }

    /// Sweep hook: expires every open break whose close deadline has passed.
    /// The caller owns the clock.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<ListingId>> {
        let expired: Vec<(ListingId, String)> = self.catalog.map_listings_mut(|listing| {
            let title = listing.title.clone();
            let state = listing.timed_break_mut()?;
            let overdue = state.status == BreakStatus::Open
                && state.closes_at.map(|c| c <= now).unwrap_or(false);
            if !overdue {
                return None;
            }
            state.status = BreakStatus::Expired;
            state.current_participants = 0;
            Some((listing.id, title))
        });

        for (listing_id, title) in &expired {
            info!("break {} expired", listing_id);
            for (entry, _) in self.breaks.cancel_all_active(*listing_id) {
                self.notify(
                    entry.user.id,
                    NotificationKind::BreakExpired,
                    "Break expired",
                    format!("{title} did not fill before its deadline"),
                    Some(*listing_id),
                );
            }
        }
        if !expired.is_empty() {
            self.persist_catalog()?;
        }
        Ok(expired.into_iter().map(|(id, _)| id).collect())
    }

    pub fn entries_for(&self, listing_id: ListingId) -> Vec<BreakEntry> {
        self.breaks.entries_for(listing_id)
    }

    // ---- waitlist ----------------------------------------------------------

    /// Queues the user; idempotent. Returns the 1-indexed position.
    pub fn join_waitlist(&self, listing_id: ListingId, user_id: UserId) -> Result<u32> {
        let user = self.user(user_id)?;
        let listing = self
            .catalog
            .get(listing_id)
            .ok_or(MarketError::NotFound { listing_id })?;
        let state = listing
            .timed_break()
            .ok_or(MarketError::WrongMode { listing_id })?;
        if state.status.is_terminal() {
            return Err(MarketError::BreakClosed {
                status: state.status,
            });
        }
        Ok(self.breaks.join_waitlist(listing_id, user.id, Utc::now()))
    }

    pub fn waitlist_position(&self, listing_id: ListingId, user_id: UserId) -> Option<u32> {
        self.breaks.waitlist_position(listing_id, user_id)
    }

    pub fn leave_waitlist(&self, listing_id: ListingId, user_id: UserId) -> bool {
        self.breaks.leave_waitlist(listing_id, user_id)
    }

    // ---- status ------------------------------------------------------------

    pub fn status_snapshot(&self) -> EngineStatus {
        let listings = self.catalog.snapshot();
        let mut status = EngineStatus {
            listings: listings.len(),
            bids: self.bids.len(),
            wallet_rows: self.wallet.len(),
            ..EngineStatus::default()
        };
        for listing in &listings {
            match &listing.mode {
                ListingMode::DirectSale => status.direct_sales += 1,
                ListingMode::Auction(_) => status.auctions += 1,
                ListingMode::TimedBreak(state) => {
                    status.breaks += 1;
                    match state.status {
                        BreakStatus::Open => status.open_breaks += 1,
                        BreakStatus::Live => status.live_breaks += 1,
                        _ => {}
                    }
                }
            }
        }
        status
    }

    /// Snapshot + persist, used at shutdown regardless of the
    /// persist-on-mutation setting.
    pub fn persist(&self) -> Result<()> {
        self.store.persist(&self.snapshot_for_store())?;
        Ok(())
    }

    // ---- internals ---------------------------------------------------------

    fn user(&self, user_id: UserId) -> Result<UserProfile> {
        self.identity
            .user(user_id)
            .ok_or(MarketError::Identity(IdentityError::UnknownUser { user_id }))
    }

    fn require_owner(listing: &Listing, actor_id: UserId) -> Result<()> {
        if listing.seller.id != actor_id {
            return Err(MarketError::Forbidden { user_id: actor_id });
        }
        Ok(())
    }

    fn notify(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        title: &str,
        message: String,
        link_to: Option<ListingId>,
    ) {
        self.sink.deliver(Notification {
            id: 0,
            user_id,
            kind,
            title: title.to_string(),
            message,
            is_read: false,
            link_to,
            created_at: Utc::now(),
        });
    }

    fn notify_participants(
        &self,
        listing_id: ListingId,
        kind: NotificationKind,
        title: &str,
        message: String,
    ) {
        let mut seen: Vec<UserId> = Vec::new();
        for entry in self.breaks.entries_for(listing_id) {
            if entry.status == EntryStatus::Cancelled || seen.contains(&entry.user.id) {
                continue;
            }
            seen.push(entry.user.id);
            self.notify(entry.user.id, kind, title, message.clone(), Some(listing_id));
        }
    }

    fn snapshot_for_store(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            listings: self.catalog.snapshot(),
            next_listing_id: self.catalog.next_id(),
        }
    }

    fn persist_catalog(&self) -> Result<()> {
        if self.config.persist_on_mutation {
            self.store.persist(&self.snapshot_for_store())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_types::{CardAttributes, DraftMode};
    use identity::{profile, InMemoryIdentity};

    use crate::notify::NotificationLog;
    use crate::storage::MemorySnapshotStore;

    const SELLER: UserId = 1;
    const ALICE: UserId = 2;
    const BOB: UserId = 3;
    const CAROL: UserId = 4;

    struct Harness {
        identity: Arc<InMemoryIdentity>,
        log: Arc<NotificationLog>,
        engine: MarketController,
    }

    fn harness() -> Harness {
        let identity = Arc::new(InMemoryIdentity::new());
        identity.insert(profile(SELLER, "rex", 0));
        identity.insert(profile(ALICE, "alice", 10_000));
        identity.insert(profile(BOB, "bob", 10_000));
        identity.insert(profile(CAROL, "carol", 10_000));
        identity.sign_in(SELLER);

        let log = Arc::new(NotificationLog::new());
        let engine = MarketController::bootstrap(
            MarketConfig::default(),
            identity.clone(),
            log.clone(),
            Box::new(MemorySnapshotStore::new()),
        )
        .unwrap();
        Harness {
            identity,
            log,
            engine,
        }
    }

    fn draft(title: &str, price: Cents, mode: DraftMode) -> ListingDraft {
        ListingDraft {
            title: title.to_string(),
            description: String::new(),
            price,
            card: CardAttributes::default(),
            mode,
        }
    }

    fn auction(h: &Harness, price: Cents) -> ListingId {
        h.engine
            .create_listing(draft("auction", price, DraftMode::Auction { ends_at: None }))
            .unwrap()
            .id
    }

    fn sale(h: &Harness, price: Cents) -> ListingId {
        h.engine
            .create_listing(draft("sale", price, DraftMode::DirectSale))
            .unwrap()
            .id
    }

    fn timed_break(h: &Harness, fee: Cents, target: u32, cap: u32) -> ListingId {
        h.engine
            .create_listing(draft(
                "break",
                fee,
                DraftMode::TimedBreak {
                    target_participants: target,
                    max_entries_per_user: cap,
                    closes_at: None,
                },
            ))
            .unwrap()
            .id
    }

    fn break_status(h: &Harness, id: ListingId) -> BreakStatus {
        h.engine.listing(id).unwrap().timed_break().unwrap().status
    }

    #[test]
    fn bid_ladder_enforces_strict_increase() {
        let h = harness();
        let id = auction(&h, 1_000);

        // first bid may equal the starting price
        h.engine.place_bid(id, ALICE, 1_000).unwrap();
        let listing = h.engine.listing(id).unwrap();
        assert_eq!(listing.auction().unwrap().current_bid, 1_000);
        assert_eq!(listing.auction().unwrap().bids_count, 1);

        // equal re-bid is rejected and leaves state unchanged
        let err = h.engine.place_bid(id, BOB, 1_000).unwrap_err();
        assert!(matches!(err, MarketError::BidTooLow { offered: 1_000, floor: 1_001 }));
        let listing = h.engine.listing(id).unwrap();
        assert_eq!(listing.auction().unwrap().current_bid, 1_000);
        assert_eq!(listing.auction().unwrap().bids_count, 1);

        h.engine.place_bid(id, BOB, 1_500).unwrap();
        let listing = h.engine.listing(id).unwrap();
        assert_eq!(listing.auction().unwrap().current_bid, 1_500);
        assert_eq!(listing.auction().unwrap().bids_count, 2);
        assert_eq!(listing.auction().unwrap().high_bidder, Some(BOB));
    }

    #[test]
    fn bid_state_always_matches_the_ledger() {
        let h = harness();
        let id = auction(&h, 100);
        h.engine.place_bid(id, ALICE, 100).unwrap();
        h.engine.place_bid(id, BOB, 250).unwrap();
        h.engine.place_bid(id, ALICE, 300).unwrap();

        let listing = h.engine.listing(id).unwrap();
        let rows = h.engine.bids_by_listing(id);
        assert_eq!(listing.auction().unwrap().bids_count as usize, rows.len());
        assert_eq!(
            listing.auction().unwrap().current_bid,
            rows.iter().map(|r| r.amount).max().unwrap()
        );
        // highest first
        assert_eq!(rows[0].amount, 300);
    }

    #[test]
    fn bid_below_first_floor_is_rejected() {
        let h = harness();
        let id = auction(&h, 1_000);
        let err = h.engine.place_bid(id, ALICE, 999).unwrap_err();
        assert!(matches!(err, MarketError::BidTooLow { floor: 1_000, .. }));
    }

    #[test]
    fn bid_requires_listing_and_auction_mode_and_funds() {
        let h = harness();
        assert!(matches!(
            h.engine.place_bid(99, ALICE, 100).unwrap_err(),
            MarketError::NotFound { listing_id: 99 }
        ));

        let sale_id = sale(&h, 100);
        assert!(matches!(
            h.engine.place_bid(sale_id, ALICE, 100).unwrap_err(),
            MarketError::WrongMode { .. }
        ));

        let id = auction(&h, 100);
        let err = h.engine.place_bid(id, ALICE, 50_000).unwrap_err();
        assert!(matches!(
            err,
            MarketError::InsufficientFunds { required: 50_000, available: 10_000 }
        ));
        // authorization only: no bid row, no wallet row
        assert!(h.engine.bids_by_listing(id).is_empty());
        assert!(h.engine.transactions_for(ALICE).is_empty());
    }

    #[test]
    fn bids_never_move_funds() {
        let h = harness();
        let id = auction(&h, 100);
        h.engine.place_bid(id, ALICE, 5_000).unwrap();
        assert_eq!(h.identity.balance(ALICE), Some(10_000));
        assert!(h.engine.transactions_for(ALICE).is_empty());
    }

    #[test]
    fn buy_now_charges_once_and_only_once() {
        let h = harness();
        let id = sale(&h, 4_000);

        let txn = h.engine.buy_now(id, ALICE).unwrap();
        assert_eq!(txn.amount, -4_000);
        assert_eq!(txn.kind, TxnKind::Purchase);
        assert_eq!(txn.balance_after, 6_000);
        assert!(h.engine.listing(id).unwrap().is_sold);

        let err = h.engine.buy_now(id, BOB).unwrap_err();
        assert!(matches!(err, MarketError::AlreadySold { .. }));
        assert_eq!(h.identity.balance(BOB), Some(10_000));
        assert!(h.engine.audit_wallet(ALICE));
        assert!(h.engine.audit_wallet(BOB));
    }

    #[test]
    fn buy_now_with_insufficient_funds_leaves_listing_unsold() {
        let h = harness();
        let id = sale(&h, 50_000);
        let err = h.engine.buy_now(id, ALICE).unwrap_err();
        assert!(matches!(err, MarketError::InsufficientFunds { .. }));
        assert!(!h.engine.listing(id).unwrap().is_sold);
        assert!(h.engine.transactions_for(ALICE).is_empty());
    }

    #[test]
    fn deposits_and_withdrawals_ledger_before_balance() {
        let h = harness();
        h.engine.deposit_funds(ALICE, 2_500).unwrap();
        assert_eq!(h.identity.balance(ALICE), Some(12_500));

        let err = h.engine.withdraw_funds(ALICE, 15_000).unwrap_err();
        assert!(matches!(
            err,
            MarketError::InsufficientFunds { required: 15_000, available: 12_500 }
        ));
        assert_eq!(h.identity.balance(ALICE), Some(12_500));

        h.engine.withdraw_funds(ALICE, 500).unwrap();
        assert_eq!(h.identity.balance(ALICE), Some(12_000));

        let rows = h.engine.transactions_for(ALICE);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.last().unwrap().balance_after, 12_000);
        assert!(h.engine.audit_wallet(ALICE));

        assert!(matches!(
            h.engine.deposit_funds(ALICE, 0).unwrap_err(),
            MarketError::InvalidAmount { amount: 0 }
        ));
    }

    #[test]
    fn join_break_fills_to_capacity_and_not_beyond() {
        let h = harness();
        let id = timed_break(&h, 2_000, 2, 4);

        h.engine.join_break(id, ALICE).unwrap();
        assert_eq!(break_status(&h, id), BreakStatus::Open);

        h.engine.join_break(id, BOB).unwrap();
        let listing = h.engine.listing(id).unwrap();
        assert_eq!(listing.timed_break().unwrap().current_participants, 2);
        assert_eq!(break_status(&h, id), BreakStatus::FullPendingSchedule);

        let err = h.engine.join_break(id, CAROL).unwrap_err();
        assert!(matches!(err, MarketError::BreakFull { target: 2 }));
        assert_eq!(h.engine.entries_for(id).len(), 2);
    }

    #[test]
    fn join_break_enforces_the_per_user_entry_cap() {
        let h = harness();
        let id = timed_break(&h, 100, 10, 2);

        h.engine.join_break(id, ALICE).unwrap();
        h.engine.join_break(id, ALICE).unwrap();
        let err = h.engine.join_break(id, ALICE).unwrap_err();
        assert!(matches!(err, MarketError::EntryLimitReached { limit: 2 }));
        assert_eq!(h.engine.entries_for(id).len(), 2);
    }

    #[test]
    fn join_break_authorizes_against_the_balance() {
        let h = harness();
        let id = timed_break(&h, 50_000, 5, 4);
        let err = h.engine.join_break(id, ALICE).unwrap_err();
        assert!(matches!(err, MarketError::InsufficientFunds { .. }));
        // authorization only: a successful join moves no funds either
        let id2 = timed_break(&h, 2_000, 5, 4);
        h.engine.join_break(id2, ALICE).unwrap();
        assert_eq!(h.identity.balance(ALICE), Some(10_000));
    }

    #[test]
    fn participant_counts_track_non_cancelled_entries() {
        let h = harness();
        let id = timed_break(&h, 100, 3, 4);
        h.engine.join_break(id, ALICE).unwrap();
        h.engine.join_break(id, BOB).unwrap();

        let entry = h.engine.entries_for(id)[0].clone();
        h.engine.remove_break_entry(entry.id, ALICE).unwrap();

        let listing = h.engine.listing(id).unwrap();
        let active = h
            .engine
            .entries_for(id)
            .iter()
            .filter(|e| e.status != EntryStatus::Cancelled)
            .count() as u32;
        assert_eq!(listing.timed_break().unwrap().current_participants, active);
        assert_eq!(active, 1);
    }

    #[test]
    fn removing_an_entry_reopens_a_full_break() {
        let h = harness();
        let id = timed_break(&h, 100, 2, 4);
        h.engine.join_break(id, ALICE).unwrap();
        h.engine.join_break(id, BOB).unwrap();
        assert_eq!(break_status(&h, id), BreakStatus::FullPendingSchedule);

        let entry = h.engine.entries_for(id)[1].clone();
        assert_eq!(entry.user.id, BOB);
        h.engine.remove_break_entry(entry.id, BOB).unwrap();

        assert_eq!(break_status(&h, id), BreakStatus::Open);
        assert_eq!(
            h.engine.listing(id).unwrap().timed_break().unwrap().current_participants,
            1
        );
        // the freed spot is joinable again
        h.engine.join_break(id, CAROL).unwrap();
        assert_eq!(break_status(&h, id), BreakStatus::FullPendingSchedule);
    }

    #[test]
    fn entry_removal_permissions() {
        let h = harness();
        let id = timed_break(&h, 100, 2, 4);
        h.engine.join_break(id, ALICE).unwrap();
        let entry = h.engine.entries_for(id)[0].clone();

        // a stranger cannot remove someone else's entry
        let err = h.engine.remove_break_entry(entry.id, BOB).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden { user_id: BOB }));

        // the owner can
        h.engine.remove_break_entry(entry.id, SELLER).unwrap();
        let err = h.engine.remove_break_entry(entry.id, SELLER).unwrap_err();
        assert!(matches!(err, MarketError::EntryAlreadyCancelled { .. }));
    }

    #[test]
    fn self_removal_is_blocked_once_live() {
        let h = harness();
        let id = timed_break(&h, 100, 1, 4);
        h.engine.join_break(id, ALICE).unwrap();
        h.engine
            .schedule_break(id, SELLER, Utc::now() + Duration::hours(1), "https://live")
            .unwrap();
        h.engine.start_break(id, SELLER).unwrap();

        let entry = h.engine.entries_for(id)[0].clone();
        let err = h.engine.remove_break_entry(entry.id, ALICE).unwrap_err();
        assert!(matches!(err, MarketError::BreakClosed { status: BreakStatus::Live }));
    }

    #[test]
    fn schedule_requires_owner_full_state_and_future_date() {
        let h = harness();
        let id = timed_break(&h, 100, 2, 4);
        let future = Utc::now() + Duration::hours(2);

        // not full yet
        let err = h.engine.schedule_break(id, SELLER, future, "x").unwrap_err();
        assert!(matches!(
            err,
            MarketError::InvalidTransition { from: BreakStatus::Open, to: BreakStatus::Scheduled }
        ));

        h.engine.join_break(id, ALICE).unwrap();
        h.engine.join_break(id, BOB).unwrap();

        let err = h
            .engine
            .schedule_break(id, SELLER, Utc::now() - Duration::minutes(1), "x")
            .unwrap_err();
        assert!(matches!(err, MarketError::ScheduleNotFuture { .. }));

        let err = h.engine.schedule_break(id, ALICE, future, "x").unwrap_err();
        assert!(matches!(err, MarketError::Forbidden { user_id: ALICE }));

        h.engine.schedule_break(id, SELLER, future, "https://live").unwrap();
        let state = h.engine.listing(id).unwrap().timed_break().unwrap().clone();
        assert_eq!(state.status, BreakStatus::Scheduled);
        assert_eq!(state.scheduled_live_at, Some(future));
        assert_eq!(state.live_link.as_deref(), Some("https://live"));
    }

    #[test]
    fn completion_settles_every_authorized_entry() {
        let h = harness();
        let id = timed_break(&h, 2_000, 2, 4);
        h.engine.join_break(id, ALICE).unwrap();
        h.engine.join_break(id, BOB).unwrap();
        h.engine
            .schedule_break(id, SELLER, Utc::now() + Duration::hours(1), "https://live")
            .unwrap();
        h.engine.start_break(id, SELLER).unwrap();

        let settlement = h
            .engine
            .complete_break(id, SELLER, vec!["results.jpg".to_string()], Some("notes".to_string()))
            .unwrap();
        assert_eq!(settlement, BreakSettlement { charged: 2, total: 4_000 });

        assert_eq!(break_status(&h, id), BreakStatus::Completed);
        for entry in h.engine.entries_for(id) {
            assert_eq!(entry.status, EntryStatus::Charged);
        }
        for user in [ALICE, BOB] {
            let latest = h.engine.transactions_for(user).pop().unwrap();
            assert_eq!(latest.kind, TxnKind::Purchase);
            assert_eq!(latest.amount, -2_000);
            assert_eq!(latest.reference, Some(id));
            assert_eq!(h.identity.balance(user), Some(8_000));
            assert!(h.engine.audit_wallet(user));
        }

        // settlement never runs twice
        let err = h.engine.complete_break(id, SELLER, vec![], None).unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { from: BreakStatus::Completed, .. }));
    }

    #[test]
    fn cancel_releases_spots_and_is_terminal() {
        let h = harness();
        let id = timed_break(&h, 2_000, 2, 4);
        h.engine.join_break(id, ALICE).unwrap();
        h.engine.join_break(id, BOB).unwrap();

        h.engine.cancel_break(id, SELLER).unwrap();
        assert_eq!(break_status(&h, id), BreakStatus::Cancelled);
        assert_eq!(
            h.engine.listing(id).unwrap().timed_break().unwrap().current_participants,
            0
        );
        // nothing was charged pre-completion, so nothing is refunded
        assert!(h.engine.transactions_for(ALICE).is_empty());

        let err = h.engine.cancel_break(id, SELLER).unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { from: BreakStatus::Cancelled, .. }));
        let err = h.engine.join_break(id, CAROL).unwrap_err();
        assert!(matches!(err, MarketError::BreakClosed { .. }));
    }

    #[test]
    fn sweep_expires_only_overdue_open_breaks() {
        let h = harness();
        let now = Utc::now();

        let overdue = h
            .engine
            .create_listing(draft(
                "overdue",
                100,
                DraftMode::TimedBreak {
                    target_participants: 4,
                    max_entries_per_user: 1,
                    closes_at: Some(now - Duration::hours(1)),
                },
            ))
            .unwrap()
            .id;
        let upcoming = h
            .engine
            .create_listing(draft(
                "upcoming",
                100,
                DraftMode::TimedBreak {
                    target_participants: 4,
                    max_entries_per_user: 1,
                    closes_at: Some(now + Duration::hours(1)),
                },
            ))
            .unwrap()
            .id;
        h.engine.join_break(overdue, ALICE).unwrap();

        let expired = h.engine.expire_overdue(now).unwrap();
        assert_eq!(expired, vec![overdue]);
        assert_eq!(break_status(&h, overdue), BreakStatus::Expired);
        assert_eq!(break_status(&h, upcoming), BreakStatus::Open);
        // entries released without financial effect
        assert_eq!(
            h.engine.entries_for(overdue)[0].status,
            EntryStatus::Cancelled
        );
        assert!(h.engine.transactions_for(ALICE).is_empty());

        // second sweep is a no-op
        assert!(h.engine.expire_overdue(now).unwrap().is_empty());
    }

    #[test]
    fn waitlist_ranks_by_join_time() {
        let h = harness();
        let id = timed_break(&h, 100, 1, 1);
        h.engine.join_break(id, ALICE).unwrap();

        assert_eq!(h.engine.join_waitlist(id, BOB).unwrap(), 1);
        assert_eq!(h.engine.join_waitlist(id, CAROL).unwrap(), 2);
        assert_eq!(h.engine.join_waitlist(id, BOB).unwrap(), 1);

        assert!(h.engine.leave_waitlist(id, BOB));
        assert_eq!(h.engine.waitlist_position(id, CAROL), Some(1));
        assert_eq!(h.engine.waitlist_position(id, BOB), None);
    }

    #[test]
    fn transitions_notify_the_right_users() {
        let h = harness();
        let id = timed_break(&h, 2_000, 1, 4);
        h.engine.join_break(id, ALICE).unwrap();
        // full on first join: seller hears about it
        assert!(h
            .log
            .for_user(SELLER)
            .iter()
            .any(|n| n.kind == NotificationKind::BreakFull));

        h.engine
            .schedule_break(id, SELLER, Utc::now() + Duration::hours(1), "https://live")
            .unwrap();
        h.engine.start_break(id, SELLER).unwrap();
        h.engine.complete_break(id, SELLER, vec![], None).unwrap();

        let kinds: Vec<NotificationKind> =
            h.log.for_user(ALICE).iter().map(|n| n.kind).collect();
        assert!(kinds.contains(&NotificationKind::BreakScheduled));
        assert!(kinds.contains(&NotificationKind::BreakStart));
        assert!(kinds.contains(&NotificationKind::BreakEnd));

        let auction_id = auction(&h, 100);
        h.engine.place_bid(auction_id, BOB, 150).unwrap();
        assert!(h
            .log
            .for_user(SELLER)
            .iter()
            .any(|n| n.kind == NotificationKind::NewBid && n.link_to == Some(auction_id)));
    }

    #[test]
    fn create_listing_requires_a_signed_in_user() {
        let h = harness();
        h.identity.sign_out();
        let err = h
            .engine
            .create_listing(draft("x", 100, DraftMode::DirectSale))
            .unwrap_err();
        assert!(matches!(err, MarketError::SignedOut));
    }

    #[test]
    fn status_snapshot_counts_by_mode() {
        let h = harness();
        sale(&h, 100);
        auction(&h, 100);
        let id = timed_break(&h, 100, 2, 4);
        h.engine.join_break(id, ALICE).unwrap();

        let status = h.engine.status_snapshot();
        assert_eq!(status.listings, 3);
        assert_eq!(status.direct_sales, 1);
        assert_eq!(status.auctions, 1);
        assert_eq!(status.breaks, 1);
        assert_eq!(status.open_breaks, 1);
        assert_eq!(status.bids, 0);
    }
}
