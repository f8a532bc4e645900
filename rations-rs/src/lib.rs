//! Rations aggregates the daily menus of dining halls and keeps them in a bounded cache.
//!
//! # Introduction
//! The upstream menu API (Nutrislice) is organized by school and meal: a single request yields
//! one meal of one dining hall for a whole week. Displaying "what is served today" therefore
//! takes one request per hall and meal. **Rations** runs these requests concurrently, drops the
//! stations nobody wants to rate (beverages, condiments and the like), assigns every food a
//! stable id and folds everything into a single [MenuSnapshot](menu::MenuSnapshot):
//!
//! ```text
//! hall -> meal (breakfast / lunch / dinner) -> station -> [ { id, name, meal } ]
//! ```
//!
//! Snapshots are cached per date. If the upstream misbehaves, a previously computed (but
//! expired) snapshot is served instead of an error.
//!
//! # Features
//! * **Concurrent fan-out with per slot deadlines**: a slow or broken slot is skipped, it never
//!   stalls or fails the whole day. See [aggregator](menu::aggregator).
//! * **Stable food ids** which survive restarts when backed by SQLite. See [foods].
//! * **LRU cache with TTL and stale fallback**. See [cache] and [service].
//! * **Reload-aware config facility**: cache size, TTL, timeouts, halls and ignored stations can
//!   be changed while running. See [config] and [settings].
//! * **Cache warming** on startup. See [warmer].
//!
//! # Examples
//! A complete example of using Rations can be found in **rations-io**. A short example on how
//! to initialize the library can be found here: [Builder](builder::Builder).
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod cache;
pub mod config;
pub mod fmt;
pub mod foods;
pub mod menu;
pub mod platform;
pub mod retry;
pub mod service;
pub mod settings;
pub mod signals;
pub mod warmer;

/// Contains the version of the Rations library.
pub const RATIONS_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the Rations build being used.
pub const RATIONS_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up the
/// library, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // Tests might try to initialize the logging system several times...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Executes the given future via `tokio::spawn` and discards the join handle.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate rations;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
/// ```
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}

#[cfg(test)]
mod testing {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::Bytes;
    use chrono::NaiveDate;
    use hyper::StatusCode;

    use crate::foods::{FoodId, FoodIdentityStore, FoodKey};
    use crate::menu::date_key;
    use crate::menu::upstream::{FetchError, Upstream};

    /// Executes async code within a single threaded tokio runtime.
    pub fn test_async<F: std::future::Future>(future: F) {
        use tokio::runtime;

        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let _ = rt.block_on(future);
    }

    /// Determines how the [FakeUpstream] answers a request.
    pub enum Reply {
        Json(String),
        Status(u16),
        /// Answers with the given payload after the given delay.
        Delayed(Duration, String),
        /// Never answers (well, not within any test).
        Hang,
    }

    /// Answers upstream requests as scripted and records every requested URL.
    #[derive(Clone)]
    pub struct FakeUpstream {
        respond: Arc<dyn Fn(&str) -> Reply + Send + Sync>,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl FakeUpstream {
        pub fn new(respond: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
            FakeUpstream {
                respond: Arc::new(respond),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Answers each request with a week listing a "Burger" at the "Grill" on the requested
        /// date.
        pub fn serving_every_date() -> Self {
            FakeUpstream::new(|url| {
                Reply::Json(week_json(requested_date(url), &[("Grill", &["Burger"])]))
            })
        }

        /// Computes the reply for the given URL without recording it.
        pub fn reply(&self, url: &str) -> Reply {
            (self.respond)(url)
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Upstream for FakeUpstream {
        async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
            self.requests.lock().unwrap().push(url.to_owned());

            match self.reply(url) {
                Reply::Json(body) => Ok(Bytes::from(body)),
                Reply::Status(status) => Err(FetchError::Status(
                    StatusCode::from_u16(status).unwrap(),
                )),
                Reply::Delayed(delay, body) => {
                    tokio::time::sleep(delay).await;
                    Ok(Bytes::from(body))
                }
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(60 * 60)).await;
                    Err(FetchError::Timeout(Duration::from_secs(60 * 60)))
                }
            }
        }
    }

    /// Extracts the date from a weekly menu URL (".../{year}/{month}/{day}/?format=json").
    pub fn requested_date(url: &str) -> NaiveDate {
        let parts = url.split('/').rev().skip(1).take(3).collect::<Vec<_>>();

        NaiveDate::from_ymd_opt(
            parts[2].parse().unwrap(),
            parts[1].parse().unwrap(),
            parts[0].parse().unwrap(),
        )
        .unwrap()
    }

    /// Builds an upstream payload which lists the given stations and foods on the given date.
    ///
    /// Each station gets its own numeric id, items reference their station by number (as the
    /// upstream does) while the lookup table uses strings as keys.
    pub fn week_json(date: NaiveDate, stations: &[(&str, &[&str])]) -> String {
        let mut menu_items = Vec::new();
        let mut menu_info = serde_json::Map::new();

        for (index, (station, foods)) in stations.iter().enumerate() {
            let station_id = 100 + index;
            menu_items.push(serde_json::json!({
                "menu_id": station_id,
                "is_section_title": true,
                "food": null
            }));
            for food in foods.iter() {
                menu_items.push(serde_json::json!({
                    "menu_id": station_id,
                    "is_section_title": false,
                    "food": { "name": food }
                }));
            }

            let _ = menu_info.insert(
                station_id.to_string(),
                serde_json::json!({ "section_options": { "display_name": station } }),
            );
        }

        serde_json::json!({
            "days": [{
                "date": date_key(date),
                "menu_items": menu_items,
                "menu_info": menu_info
            }]
        })
        .to_string()
    }

    /// An identity store which is permanently broken.
    pub struct FailingFoodStore;

    #[async_trait::async_trait]
    impl FoodIdentityStore for FailingFoodStore {
        async fn upsert(&self, key: &FoodKey) -> anyhow::Result<FoodId> {
            Err(anyhow::anyhow!("Failed to register {}: database is locked", key))
        }
    }
}
