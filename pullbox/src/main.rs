// Copyright (c) James Kassemi, SC, US. All rights reserved.

mod config;

use std::{
    env, process,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

use chrono::{Duration as ChronoDuration, Utc};
use thiserror::Error;

use crate::config::{AppConfig, ConfigError, Environment};
use core_types::{format_cents, CardAttributes, Category, Condition, DraftMode, ListingDraft};
use identity::{profile, InMemoryIdentity, UserRole};
use market_engine::{
    JsonSnapshotStore, MarketConfig, MarketController, MarketError, NotificationLog,
};
use query_engine::{project, AppScope, FilterState, SortOrder};

fn main() {
    if let Err(err) = run() {
        eprintln!("pullbox failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let env_mode = parse_environment()?;
    let config = AppConfig::load(env_mode)?;

    let identity = Arc::new(InMemoryIdentity::new());
    let notifications = Arc::new(NotificationLog::new());
    let store = JsonSnapshotStore::new(&config.snapshot_path);
    let market_config =
        MarketConfig::new().with_default_entry_cap(config.default_max_entries_per_user);
    let controller = Arc::new(MarketController::bootstrap(
        market_config,
        identity.clone(),
        notifications.clone(),
        Box::new(store),
    )?);

    println!(
        "pullbox booted in {:?} mode; snapshot at {}",
        env_mode, config.snapshot_path
    );

    if env_mode == Environment::Dev && config.seed_demo && controller.listings().is_empty() {
        seed_demo(&identity, &controller, config.seed_balance_cents)?;
        println!("demo catalog seeded");
    }

    let catalog = controller.listings();
    let filters = FilterState::new();
    println!(
        "discovery: {} marketplace rows, {} break rows",
        project(&catalog, AppScope::Marketplace, &filters, SortOrder::Newest).len(),
        project(&catalog, AppScope::Breaks, &filters, SortOrder::EndingSoon).len()
    );
    println!("status: {}", controller.status_snapshot());
    println!("Engine is running; press Ctrl+C to shut down.");

    let sweep = MaintenanceLoop::spawn(
        "expiry-sweep",
        Duration::from_secs(config.sweep_interval_s.max(1)),
        {
            let controller = controller.clone();
            move || match controller.expire_overdue(Utc::now()) {
                Ok(expired) if !expired.is_empty() => {
                    println!("expired {} overdue break(s): {expired:?}", expired.len());
                }
                Ok(_) => {}
                Err(err) => eprintln!("expiry sweep failed: {err}"),
            }
        },
    );
    let status = MaintenanceLoop::spawn(
        "status-logger",
        Duration::from_secs(config.status_interval_s.max(1)),
        {
            let controller = controller.clone();
            move || println!("status: {}", controller.status_snapshot())
        },
    );

    wait_for_shutdown_signal()?;
    println!("Shutdown signal received; stopping maintenance threads...");
    status.shutdown();
    sweep.shutdown();
    controller.persist()?;
    println!("catalog snapshot persisted");
    Ok(())
}

fn parse_environment() -> Result<Environment, AppError> {
    let arg = env::args().nth(1).ok_or(AppError::Usage)?;
    Environment::from_str(&arg).map_err(AppError::from)
}

fn wait_for_shutdown_signal() -> Result<(), AppError> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    rx.recv()?;
    Ok(())
}

/// Seeds a handful of users and listings so a dev boot has something on the
/// shelves: one direct sale, one auction with a live ladder, one break that
/// is filling, and one break that will expire on the next sweep.
fn seed_demo(
    identity: &InMemoryIdentity,
    controller: &MarketController,
    balance: i64,
) -> Result<(), MarketError> {
    let mut rex = profile(1, "rex", 0);
    rex.role = UserRole::Breaker;
    rex.verified = true;
    identity.insert(rex);
    identity.insert(profile(2, "mara", balance));
    identity.insert(profile(3, "kenji", balance));
    identity.sign_in(1);

    let charizard = controller.create_listing(ListingDraft {
        title: "Charizard Base Set Holo".to_string(),
        description: "Unlimited print, pack fresh".to_string(),
        price: 42_000,
        card: CardAttributes {
            pokemon_name: Some("Charizard".to_string()),
            set_name: Some("Base Set".to_string()),
            condition: Some(Condition::NearMint),
            category: Some(Category::RawSingle),
            ..CardAttributes::default()
        },
        mode: DraftMode::DirectSale,
    })?;

    let auction = controller.create_listing(ListingDraft {
        title: "Umbreon VMAX Alt Art".to_string(),
        description: "Evolving Skies chase card".to_string(),
        price: 25_000,
        card: CardAttributes {
            pokemon_name: Some("Umbreon".to_string()),
            set_name: Some("Evolving Skies".to_string()),
            category: Some(Category::RawSingle),
            ..CardAttributes::default()
        },
        mode: DraftMode::Auction { ends_at: Some(Utc::now() + ChronoDuration::days(3)) },
    })?;

    let filling = controller.create_listing(ListingDraft {
        title: "Surging Sparks booster box break".to_string(),
        description: "36 packs, pick your spot".to_string(),
        price: 1_500,
        card: CardAttributes {
            set_name: Some("Surging Sparks".to_string()),
            category: Some(Category::BreakSlot),
            ..CardAttributes::default()
        },
        mode: DraftMode::TimedBreak {
            target_participants: 12,
            max_entries_per_user: 3,
            closes_at: Some(Utc::now() + ChronoDuration::days(2)),
        },
    })?;

    controller.create_listing(ListingDraft {
        title: "Stalled vintage break".to_string(),
        description: "Never filled".to_string(),
        price: 9_000,
        card: CardAttributes {
            category: Some(Category::BreakSlot),
            ..CardAttributes::default()
        },
        mode: DraftMode::TimedBreak {
            target_participants: 30,
            max_entries_per_user: 1,
            closes_at: Some(Utc::now() - ChronoDuration::hours(1)),
        },
    })?;

    controller.deposit_funds(2, 5_000)?;
    controller.place_bid(auction.id, 2, 25_000)?;
    controller.place_bid(auction.id, 3, 27_500)?;
    controller.join_break(filling.id, 2)?;
    controller.join_break(filling.id, 3)?;

    println!(
        "seeded: {} for sale at {}, auction leading at {}",
        charizard.title,
        format_cents(charizard.price),
        format_cents(27_500)
    );
    Ok(())
}

/// Background tick loop with a prompt shutdown, shared by the expiry sweep
/// and the status logger.
struct MaintenanceLoop {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MaintenanceLoop {
    fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    // sleep in short slices so shutdown stays prompt
                    let mut remaining = interval;
                    while !flag.load(Ordering::Relaxed) && remaining > Duration::ZERO {
                        let nap = remaining.min(Duration::from_millis(250));
                        thread::sleep(nap);
                        remaining = remaining.saturating_sub(nap);
                    }
                    if flag.load(Ordering::Relaxed) {
                        break;
                    }
                    tick();
                }
            })
            .expect("spawn maintenance thread");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: pullbox <dev|prod>")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Market(#[from] MarketError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("failed while waiting for shutdown signal: {0}")]
    ShutdownWait(#[from] mpsc::RecvError),
}
