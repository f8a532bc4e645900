//! Populates the menu cache in the background right after startup.
//!
//! Without warming, the first request of the day would have to wait for a full aggregation.
//! The warmer computes the menus of today and the following day(s) on a detached task, so that
//! startup is never delayed and a failing upstream merely results in a log message.
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::menu::date_key;
use crate::platform::Platform;
use crate::service::MenuService;
use crate::settings::Settings;

/// Returns **days** consecutive dates, starting with **today**.
///
/// The list ends early if the calendar runs out of representable dates.
///
/// # Examples
/// ```
/// # use rations::warmer::upcoming_dates;
/// # use chrono::NaiveDate;
/// let today = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
/// assert_eq!(
///     upcoming_dates(today, 2),
///     vec![today, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()]
/// );
/// ```
pub fn upcoming_dates(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..i64::from(days))
        .map_while(|offset| today.checked_add_signed(Duration::days(offset)))
        .collect()
}

/// Computes the menus of all given dates which aren't freshly cached yet.
///
/// This runs on a detached task. The returned handle yields the number of dates which have
/// been computed, but there is no need to await it.
pub fn warm_dates(service: Arc<MenuService>, dates: Vec<NaiveDate>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut warmed = 0;
        for date in dates {
            if service.is_cached(date) {
                log::debug!("The menus of {} are already cached.", date_key(date));
                continue;
            }

            match service.menus(date, false).await {
                Ok(response) => {
                    log::info!(
                        "Warmed the menus of {} ({} foods, {:?}).",
                        response.date,
                        response.menus.food_count(),
                        response.freshness
                    );
                    warmed += 1;
                }
                Err(error) => log::warn!("Failed to warm the menu cache: {}", error),
            }
        }

        warmed
    })
}

/// Starts warming the cache of the **MenuService** registered in the given platform.
///
/// Whether and how many days are warmed is controlled by **warmer.enabled** and **warmer.days**.
pub fn install(platform: Arc<Platform>) {
    let settings = platform
        .find::<Config>()
        .map(|config| Settings::from_config(&config.current()))
        .unwrap_or_default();

    if !settings.warmer_enabled || settings.warmer_days == 0 {
        log::info!("The cache warmer is disabled.");
        return;
    }

    match platform.find::<MenuService>() {
        Some(service) => {
            let dates = upcoming_dates(service.today(), settings.warmer_days);
            log::info!("Warming the menu cache for {} day(s)...", dates.len());
            let _ = warm_dates(service, dates);
        }
        None => log::warn!("Cannot warm the menu cache as no menu service is installed."),
    }
}
