//! Derives the typed settings of the menu service from the system configuration.
//!
//! Every value has a default, so that an empty (or missing) **settings.yml** yields a fully
//! functional service. Invalid values are reported in the log and replaced by their default.
//!
//! The full set of supported keys looks like this:
//! ```yaml
//! menus:
//!     upstream: "https://dininguiowa.api.nutrislice.com"
//!     connect_timeout: 3s
//!     read_timeout: 10s
//!     retries: 3
//!     retry_delay: 500ms
//!     unit_timeout: 15s
//!     ignore: [ "Beverages", "Condiments", "Desserts" ]
//!     halls:
//!         Burge:
//!             school: burge-market
//!             meals: [ breakfast, lunch, dinner-3 ]
//! cache:
//!     ttl: 30m
//!     size: 64
//! dates:
//!     max_days_ahead: 14
//!     max_days_back: 30
//! foods:
//!     database: "data/foods.db"
//! warmer:
//!     enabled: true
//!     days: 2
//! ```
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::config::Handle;
use crate::fmt::format_duration;
use crate::menu::{default_slots, IgnoreList, MenuSlot};
use crate::retry::RetryPolicy;

/// The upstream API queried if nothing else is configured.
pub const DEFAULT_UPSTREAM: &str = "https://dininguiowa.api.nutrislice.com";

const MAX_RETRIES: i64 = 10;
const MAX_CACHE_SIZE: i64 = 10_000;
const MAX_DAYS: i64 = 366;
const MAX_WARMER_DAYS: i64 = 31;

/// Contains all tunables of the menu service.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// The base URL of the upstream API.
    pub upstream: String,
    /// The max time to establish a connection to the upstream.
    pub connect_timeout: Duration,
    /// The max time for a single request / response exchange.
    pub read_timeout: Duration,
    /// The total number of attempts per upstream request.
    pub retries: u32,
    /// The base delay between two attempts (grows linearly).
    pub retry_delay: Duration,
    /// The max time to wait for a single slot during aggregation.
    pub unit_timeout: Duration,
    /// The stations to drop.
    pub ignored: IgnoreList,
    /// The slots to fetch per day.
    pub slots: Vec<MenuSlot>,
    /// The duration for which a snapshot is considered fresh.
    pub cache_ttl: Duration,
    /// The max number of dates to cache.
    pub cache_size: usize,
    /// How many days into the future menus may be requested.
    pub max_days_ahead: i64,
    /// How many days into the past menus may be requested.
    pub max_days_back: i64,
    /// The SQLite database holding the food identities. In-memory if absent.
    pub food_database: Option<String>,
    /// Determines if the cache is warmed on startup.
    pub warmer_enabled: bool,
    /// The number of days (starting with today) to warm.
    pub warmer_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            upstream: DEFAULT_UPSTREAM.to_owned(),
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(10),
            retries: 3,
            retry_delay: Duration::from_millis(500),
            unit_timeout: Duration::from_secs(15),
            ignored: IgnoreList::default(),
            slots: default_slots(),
            cache_ttl: Duration::from_secs(30 * 60),
            cache_size: 64,
            max_days_ahead: 14,
            max_days_back: 30,
            food_database: None,
            warmer_enabled: true,
            warmer_days: 2,
        }
    }
}

impl Settings {
    /// Reads the settings from the given config, falling back to the defaults where needed.
    pub fn from_config(config: &Handle) -> Self {
        let defaults = Settings::default();

        Settings {
            upstream: config
                .query("menus.upstream")
                .as_str()
                .map(|url| url.trim_end_matches('/').to_owned())
                .filter(|url| !url.is_empty())
                .unwrap_or(defaults.upstream),
            connect_timeout: duration(config, "menus.connect_timeout", defaults.connect_timeout),
            read_timeout: duration(config, "menus.read_timeout", defaults.read_timeout),
            retries: integer(config, "menus.retries", defaults.retries.into(), 1..=MAX_RETRIES) as u32,
            retry_delay: duration(config, "menus.retry_delay", defaults.retry_delay),
            unit_timeout: duration(config, "menus.unit_timeout", defaults.unit_timeout),
            ignored: ignore_list(config).unwrap_or(defaults.ignored),
            slots: slots(config).unwrap_or(defaults.slots),
            cache_ttl: duration(config, "cache.ttl", defaults.cache_ttl),
            cache_size: integer(
                config,
                "cache.size",
                defaults.cache_size as i64,
                1..=MAX_CACHE_SIZE,
            ) as usize,
            max_days_ahead: integer(
                config,
                "dates.max_days_ahead",
                defaults.max_days_ahead,
                0..=MAX_DAYS,
            ),
            max_days_back: integer(
                config,
                "dates.max_days_back",
                defaults.max_days_back,
                0..=MAX_DAYS,
            ),
            food_database: config
                .query("foods.database")
                .as_str()
                .filter(|path| !path.is_empty())
                .map(str::to_owned),
            warmer_enabled: config
                .query("warmer.enabled")
                .as_bool()
                .unwrap_or(defaults.warmer_enabled),
            warmer_days: integer(
                config,
                "warmer.days",
                defaults.warmer_days.into(),
                0..=MAX_WARMER_DAYS,
            ) as u32,
        }
    }

    /// Returns the retry schedule for upstream requests.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(self.retries, self.retry_delay)
    }
}

fn duration(config: &Handle, key: &str, default: Duration) -> Duration {
    match config.query(key).as_duration() {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(error) => {
            log::error!(
                "Invalid value for {}: {:#} - using {} instead.",
                key,
                error,
                format_duration(default)
            );
            default
        }
    }
}

fn integer(config: &Handle, key: &str, default: i64, range: RangeInclusive<i64>) -> i64 {
    let setting = config.query(key);
    if !setting.is_present() {
        return default;
    }

    match setting.as_int() {
        Some(value) if range.contains(&value) => value,
        _ => {
            log::error!(
                "Invalid value for {}: Expected an integer between {} and {} - using {} instead.",
                key,
                range.start(),
                range.end(),
                default
            );
            default
        }
    }
}

fn ignore_list(config: &Handle) -> Option<IgnoreList> {
    let setting = config.query("menus.ignore");
    if !setting.is_present() {
        return None;
    }

    let stations = setting.elements();
    if stations.iter().any(|station| station.as_str().is_none()) {
        log::error!("Invalid value for menus.ignore: Expected a list of station names - using the defaults.");
        return None;
    }

    Some(IgnoreList::new(stations.iter().filter_map(|station| station.as_str())))
}

fn slots(config: &Handle) -> Option<Vec<MenuSlot>> {
    let setting = config.query("menus.halls");
    if !setting.is_present() {
        return None;
    }

    let mut result = Vec::new();
    for (hall, definition) in setting.entries() {
        let school = match definition.query("school").as_str() {
            Some(school) => school,
            None => {
                log::error!("The dining hall {} has no school slug and is skipped.", hall);
                continue;
            }
        };

        for meal in definition.query("meals").elements() {
            match meal.as_str() {
                Some(meal_slug) => result.push(MenuSlot::new(hall, school, meal_slug)),
                None => log::error!("Skipping an invalid meal slug of the dining hall {}.", hall),
            }
        }
    }

    if result.is_empty() {
        log::error!("menus.halls defines no usable slot - using the defaults.");
        None
    } else {
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::menu::{Meal, MenuSlot};
    use crate::settings::Settings;
    use std::time::Duration;

    fn settings(yaml: &str) -> Settings {
        let config = Config::new("settings.yml");
        config.load_from_string(yaml, None).unwrap();
        Settings::from_config(&config.current())
    }

    #[test]
    fn an_empty_config_yields_the_defaults() {
        assert_eq!(settings(""), Settings::default());

        let defaults = Settings::default();
        assert_eq!(defaults.slots.len(), 9);
        assert_eq!(defaults.cache_ttl, Duration::from_secs(1800));
        assert_eq!(defaults.cache_size, 64);
        assert_eq!(defaults.food_database, None);
    }

    #[test]
    fn values_are_read() {
        let settings = settings(
            "
menus:
    upstream: http://localhost:8080/
    read_timeout: 2s
    retries: 5
    ignore: [Beverages]
    halls:
        North:
            school: north-hall
            meals: [brunch-1, dinner]
cache:
    ttl: 5m
    size: 8
dates:
    max_days_ahead: 7
foods:
    database: data/foods.db
warmer:
    enabled: false
",
        );

        assert_eq!(settings.upstream, "http://localhost:8080");
        assert_eq!(settings.read_timeout, Duration::from_secs(2));
        assert_eq!(settings.connect_timeout, Duration::from_secs(3));
        assert_eq!(settings.retry_policy().attempts, 5);
        assert_eq!(settings.ignored.len(), 1);
        assert_eq!(
            settings.slots,
            vec![
                MenuSlot::new("North", "north-hall", "brunch-1"),
                MenuSlot::new("North", "north-hall", "dinner")
            ]
        );
        assert_eq!(settings.slots[0].meal(), Meal::Breakfast);
        assert_eq!(settings.cache_ttl, Duration::from_secs(300));
        assert_eq!(settings.cache_size, 8);
        assert_eq!(settings.max_days_ahead, 7);
        assert_eq!(settings.max_days_back, 30);
        assert_eq!(settings.food_database.as_deref(), Some("data/foods.db"));
        assert_eq!(settings.warmer_enabled, false);
    }

    #[test]
    fn invalid_values_fall_back_to_the_defaults() {
        let settings = settings(
            "
menus:
    retries: 0
    unit_timeout: forever
    ignore: [1, 2]
    halls:
        Nowhere:
            meals: [lunch]
cache:
    size: lots
    ttl: 999999999999999d
warmer:
    days: 4294967297
",
        );

        let defaults = Settings::default();
        assert_eq!(settings.retries, defaults.retries);
        assert_eq!(settings.unit_timeout, defaults.unit_timeout);
        assert_eq!(settings.ignored, defaults.ignored);
        assert_eq!(settings.slots, defaults.slots);
        assert_eq!(settings.cache_size, defaults.cache_size);
        assert_eq!(settings.cache_ttl, defaults.cache_ttl);
        assert_eq!(settings.warmer_days, defaults.warmer_days);
    }

    #[test]
    fn out_of_range_values_fall_back_to_the_defaults() {
        let settings = settings(
            "
menus:
    retries: 1000
cache:
    size: 0
dates:
    max_days_ahead: -1
    max_days_back: 100000
warmer:
    days: 32
",
        );

        let defaults = Settings::default();
        assert_eq!(settings.retries, defaults.retries);
        assert_eq!(settings.cache_size, defaults.cache_size);
        assert_eq!(settings.max_days_ahead, defaults.max_days_ahead);
        assert_eq!(settings.max_days_back, defaults.max_days_back);
        assert_eq!(settings.warmer_days, defaults.warmer_days);
    }

    #[test]
    fn bounds_are_inclusive() {
        let settings = settings("warmer:\n    days: 31\ndates:\n    max_days_ahead: 366\n");
        assert_eq!(settings.warmer_days, 31);
        assert_eq!(settings.max_days_ahead, 366);
    }
}
