//! Serves menu snapshots by combining the [Aggregator] with the [MenuCache].
//!
//! A request for a date is answered as follows:
//! 1. Dates outside of the configured window are rejected right away.
//! 2. A fresh cache entry is returned as is (unless a refresh is requested).
//! 3. Otherwise the menus are aggregated and the result is cached and returned.
//! 4. If the aggregation fails, any previously cached entry (no matter how old) is returned and
//!    marked as [Freshness::Stale]. Only if there is none, [MenuError::Unavailable] is reported.
//!
//! Note that concurrent requests for the same uncached date each run their own aggregation.
//! As the food identity store is idempotent, this costs some upstream requests but never yields
//! inconsistent ids.
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::cache::{CacheStatus, Clock, MenuCache, MenuEntry, SystemClock};
use crate::config::Config;
use crate::foods::{FoodIdentityStore, InMemoryFoodStore, SqliteFoodStore};
use crate::menu::aggregator::Aggregator;
use crate::menu::fetcher::SourceFetcher;
use crate::menu::upstream::{HttpUpstream, Upstream};
use crate::menu::{date_key, MenuSnapshot};
use crate::platform::Platform;
use crate::settings::Settings;

/// Describes why no menu could be delivered.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MenuError {
    /// The requested date lies too far in the future.
    #[error("Cannot provide menus for {date}: At most {max_days} days ahead are permitted")]
    #[allow(missing_docs)]
    TooFarAhead { date: NaiveDate, max_days: i64 },
    /// The requested date lies too far in the past.
    #[error("Cannot provide menus for {date}: At most {max_days} days back are permitted")]
    #[allow(missing_docs)]
    TooFarBack { date: NaiveDate, max_days: i64 },
    /// Aggregating failed and nothing is cached for this date.
    #[error("No menus are available for {date}: {reason}")]
    #[allow(missing_docs)]
    Unavailable { date: NaiveDate, reason: String },
}

/// Tells whether a response was freshly computed or served as fallback.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Computed within the TTL.
    Fresh,
    /// An outdated snapshot served as the menus couldn't be re-computed.
    Stale,
}

/// The menus of a date along with some metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MenuResponse {
    /// The date as `YYYY-MM-DD`.
    pub date: String,
    /// Tells whether the menus are up to date.
    pub freshness: Freshness,
    /// The point in time the menus were computed.
    pub computed_at: DateTime<Utc>,
    /// The actual menus.
    pub menus: Arc<MenuSnapshot>,
}

impl MenuResponse {
    fn new(date: String, entry: MenuEntry, freshness: Freshness) -> Self {
        MenuResponse {
            date,
            freshness,
            computed_at: entry.timestamp,
            menus: entry.value,
        }
    }
}

/// Limits the dates for which menus can be requested, relative to today.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DateWindow {
    /// The max number of days after today.
    pub max_days_ahead: i64,
    /// The max number of days before today.
    pub max_days_back: i64,
}

impl DateWindow {
    /// Ensures that the given date is within the window around **today**.
    ///
    /// # Examples
    /// ```
    /// # use rations::service::{DateWindow, MenuError};
    /// # use chrono::NaiveDate;
    /// let window = DateWindow { max_days_ahead: 14, max_days_back: 30 };
    /// let today = NaiveDate::from_ymd_opt(2025, 9, 17).unwrap();
    ///
    /// assert_eq!(window.check(NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(), today).is_ok(), true);
    /// assert_eq!(
    ///     matches!(
    ///         window.check(NaiveDate::from_ymd_opt(2025, 10, 2).unwrap(), today),
    ///         Err(MenuError::TooFarAhead { .. })
    ///     ),
    ///     true
    /// );
    /// assert_eq!(
    ///     matches!(
    ///         window.check(NaiveDate::from_ymd_opt(2025, 8, 17).unwrap(), today),
    ///         Err(MenuError::TooFarBack { .. })
    ///     ),
    ///     true
    /// );
    /// ```
    pub fn check(&self, date: NaiveDate, today: NaiveDate) -> Result<(), MenuError> {
        let offset = date.signed_duration_since(today).num_days();
        if offset > self.max_days_ahead {
            Err(MenuError::TooFarAhead {
                date,
                max_days: self.max_days_ahead,
            })
        } else if -offset > self.max_days_back {
            Err(MenuError::TooFarBack {
                date,
                max_days: self.max_days_back,
            })
        } else {
            Ok(())
        }
    }
}

impl From<&Settings> for DateWindow {
    fn from(settings: &Settings) -> Self {
        DateWindow {
            max_days_ahead: settings.max_days_ahead,
            max_days_back: settings.max_days_back,
        }
    }
}

/// Provides the menus of a date, backed by a cache.
pub struct MenuService {
    aggregator: ArcSwap<Aggregator>,
    window: ArcSwap<DateWindow>,
    cache: MenuCache,
    foods: Arc<dyn FoodIdentityStore>,
    clock: Arc<dyn Clock>,
}

impl MenuService {
    /// Creates a new service which fetches its menus via the given upstream.
    pub fn new(
        settings: &Settings,
        upstream: Arc<dyn Upstream>,
        foods: Arc<dyn FoodIdentityStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        MenuService {
            aggregator: ArcSwap::new(Arc::new(create_aggregator(
                settings,
                upstream,
                foods.clone(),
            ))),
            window: ArcSwap::new(Arc::new(DateWindow::from(settings))),
            cache: MenuCache::new(settings.cache_size, settings.cache_ttl, clock.clone()),
            foods,
            clock,
        }
    }

    /// Applies changed settings.
    ///
    /// The cache keeps its contents (apart from entries evicted by a smaller capacity). The
    /// food identity store is left untouched.
    pub fn reconfigure(&self, settings: &Settings, upstream: Arc<dyn Upstream>) {
        self.cache.reconfigure(settings.cache_size, settings.cache_ttl);
        self.window.store(Arc::new(DateWindow::from(settings)));
        self.aggregator.store(Arc::new(create_aggregator(
            settings,
            upstream,
            self.foods.clone(),
        )));
    }

    /// Returns the current local date as seen by the clock of this service.
    pub fn today(&self) -> NaiveDate {
        self.clock.wall_time().with_timezone(&Local).date_naive()
    }

    /// Returns the menus of the given date.
    ///
    /// If **refresh** is true, a fresh cache entry is ignored and the menus are re-computed.
    pub async fn menus(&self, date: NaiveDate, refresh: bool) -> Result<MenuResponse, MenuError> {
        self.window.load().check(date, self.today())?;

        let key = date_key(date);
        if !refresh {
            if let Some(entry) = self.cache.get(&key).filter(|entry| self.cache.is_fresh(entry)) {
                log::debug!("Serving the menus of {} from the cache.", key);
                return Ok(MenuResponse::new(key, entry, Freshness::Fresh));
            }
        }

        let aggregator = self.aggregator.load_full();
        match aggregator.aggregate(date).await {
            Ok(snapshot) => {
                log::debug!("Caching the menus of {}.", key);
                let entry = self.cache.put(&key, snapshot);
                Ok(MenuResponse::new(key, entry, Freshness::Fresh))
            }
            Err(error) => match self.cache.get(&key) {
                Some(entry) => {
                    log::warn!(
                        "Failed to compute the menus of {}: {:#} - serving the cached version.",
                        key,
                        error
                    );
                    Ok(MenuResponse::new(key, entry, Freshness::Stale))
                }
                None => {
                    log::error!("Failed to compute the menus of {}: {:#}", key, error);
                    Err(MenuError::Unavailable {
                        date,
                        reason: format!("{:#}", error),
                    })
                }
            },
        }
    }

    /// Determines if a fresh snapshot of the given date is cached.
    pub fn is_cached(&self, date: NaiveDate) -> bool {
        self.cache
            .get(&date_key(date))
            .map(|entry| self.cache.is_fresh(&entry))
            .unwrap_or(false)
    }

    /// Reports the state of the cache.
    pub fn status(&self) -> CacheStatus {
        self.cache.status()
    }

    /// Drops all cached snapshots.
    pub fn flush(&self) {
        log::info!("Flushing the menu cache...");
        self.cache.flush();
    }
}

fn create_aggregator(
    settings: &Settings,
    upstream: Arc<dyn Upstream>,
    foods: Arc<dyn FoodIdentityStore>,
) -> Aggregator {
    let fetcher = SourceFetcher::new(
        upstream,
        foods,
        settings.upstream.as_str(),
        settings.ignored.clone(),
    );

    Aggregator::new(
        Arc::new(fetcher),
        settings.slots.clone(),
        settings.unit_timeout,
    )
}

fn create_upstream(settings: &Settings) -> Arc<dyn Upstream> {
    Arc::new(HttpUpstream::new(
        settings.connect_timeout,
        settings.read_timeout,
        settings.retry_policy(),
    ))
}

fn open_food_store(settings: &Settings) -> anyhow::Result<Arc<dyn FoodIdentityStore>> {
    match &settings.food_database {
        Some(path) => {
            log::info!("Storing food identities in {}...", path);
            Ok(Arc::new(SqliteFoodStore::open(path)?))
        }
        None => {
            log::info!("No food database configured - food ids are only kept in memory.");
            Ok(Arc::new(InMemoryFoodStore::new()))
        }
    }
}

/// Creates and installs a **MenuService** for the given platform.
///
/// The settings are read from the [Config] (if installed). A listener is forked which applies
/// all config changes to the running service.
pub fn install(platform: Arc<Platform>) -> anyhow::Result<Arc<MenuService>> {
    let config = platform.find::<Config>();
    let settings = config
        .as_ref()
        .map(|config| Settings::from_config(&config.current()))
        .unwrap_or_default();

    let service = Arc::new(MenuService::new(
        &settings,
        create_upstream(&settings),
        open_food_store(&settings)?,
        Arc::new(SystemClock),
    ));
    platform.register::<MenuService>(service.clone());

    if let Some(config) = config {
        let service = service.clone();
        let mut config_changed = config.notifier();
        crate::spawn!(async move {
            let mut food_database = settings.food_database;

            while platform.is_running() {
                // Missed notifications don't matter as the current config is read anyway...
                if let Err(RecvError::Closed) = config_changed.recv().await {
                    return;
                }

                let settings = Settings::from_config(&config.current());
                if settings.food_database != food_database {
                    log::warn!("A changed food database is only picked up after a restart.");
                    food_database = settings.food_database.clone();
                }

                service.reconfigure(&settings, create_upstream(&settings));
                log::info!("Applied the changed configuration to the menu service.");
            }
        });
    }

    Ok(service)
}
