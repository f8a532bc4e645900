//! Fetches and categorizes the menu of a single slot.
//!
//! The [SourceFetcher] performs exactly one upstream call per invocation. Everything that can go
//! wrong on the network or with the payload is a *soft failure*: it is logged and reported as
//! [SlotOutcome::Unavailable] so that a single broken slot never aborts the aggregation of a
//! whole day. A failing identity store on the other hand is reported as error, as handing out
//! foods without stable ids would corrupt the ratings attached to them.
use std::sync::Arc;

use chrono::NaiveDate;

use crate::foods::{FoodIdentityStore, FoodKey};
use crate::menu::nutrislice::{menu_url, WeekMenu};
use crate::menu::upstream::Upstream;
use crate::menu::{date_key, FoodItem, IgnoreList, MenuSlot, StationMap};

/// Represents the result of fetching a single slot.
#[derive(Debug, PartialEq)]
pub enum SlotOutcome {
    /// The upstream answered. The map is empty if nothing qualifying is served on that day.
    Menu(StationMap),
    /// The upstream couldn't be reached or sent garbage. Contains a short description.
    Unavailable(String),
}

/// Fetches the menu of one slot for one date.
pub struct SourceFetcher {
    upstream: Arc<dyn Upstream>,
    foods: Arc<dyn FoodIdentityStore>,
    base_url: String,
    ignored: IgnoreList,
}

impl SourceFetcher {
    /// Creates a new fetcher which talks to the API at **base_url** via the given upstream.
    pub fn new(
        upstream: Arc<dyn Upstream>,
        foods: Arc<dyn FoodIdentityStore>,
        base_url: impl Into<String>,
        ignored: IgnoreList,
    ) -> Self {
        SourceFetcher {
            upstream,
            foods,
            base_url: base_url.into(),
            ignored,
        }
    }

    /// Fetches the stations and foods served in the given slot on the given date.
    ///
    /// Every food which survives the ignore list is registered in the identity store, using the
    /// canonical meal of the slot.
    pub async fn fetch(&self, slot: &MenuSlot, date: NaiveDate) -> anyhow::Result<SlotOutcome> {
        let url = menu_url(&self.base_url, slot, date);
        let body = match self.upstream.fetch(&url).await {
            Ok(body) => body,
            Err(error) => {
                log::warn!(
                    "Failed to fetch {} / {} for {}: {}",
                    slot.hall,
                    slot.meal_slug,
                    date_key(date),
                    error
                );
                return Ok(SlotOutcome::Unavailable(error.to_string()));
            }
        };

        let week = match WeekMenu::parse(&body) {
            Ok(week) => week,
            Err(error) => {
                log::warn!(
                    "Received an invalid menu for {} / {} on {}: {:#}",
                    slot.hall,
                    slot.meal_slug,
                    date_key(date),
                    error
                );
                return Ok(SlotOutcome::Unavailable(format!("{:#}", error)));
            }
        };

        let day = match week.day(date) {
            Some(day) => day,
            None => {
                log::debug!(
                    "{} / {} lists no menu for {}.",
                    slot.hall,
                    slot.meal_slug,
                    date_key(date)
                );
                return Ok(SlotOutcome::Menu(StationMap::new()));
            }
        };

        let meal = slot.meal();
        let categorized = day
            .categorize(&self.ignored)
            .into_iter()
            .collect::<Vec<_>>();

        let mut stations = StationMap::new();
        for (station, names) in categorized {
            let mut foods = Vec::with_capacity(names.len());
            for name in names {
                let id = self
                    .foods
                    .upsert(&FoodKey::new(
                        name.as_str(),
                        station.as_str(),
                        slot.hall.as_str(),
                        meal,
                    ))
                    .await?;
                foods.push(FoodItem { id, name, meal });
            }

            let _ = stations.insert(station, foods);
        }

        Ok(SlotOutcome::Menu(stations))
    }
}

#[cfg(test)]
mod tests {
    use crate::foods::{FoodIdentityStore, FoodKey, InMemoryFoodStore};
    use crate::menu::fetcher::{SlotOutcome, SourceFetcher};
    use crate::menu::{IgnoreList, Meal, MenuSlot};
    use crate::testing::{week_json, FailingFoodStore, FakeUpstream, Reply};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 17).unwrap()
    }

    fn fetcher(upstream: FakeUpstream, foods: Arc<dyn FoodIdentityStore>) -> SourceFetcher {
        SourceFetcher::new(
            Arc::new(upstream),
            foods,
            "http://menus.test",
            IgnoreList::default(),
        )
    }

    #[tokio::test]
    async fn foods_are_categorized_and_registered() {
        let payload = week_json(
            date(),
            &[
                ("Grill", &["Burger", "Fries"]),
                ("Beverages", &["Coffee"]),
                ("Deli", &["Turkey Club"]),
            ],
        );
        let upstream = FakeUpstream::new(move |_| Reply::Json(payload.clone()));
        let foods = Arc::new(InMemoryFoodStore::new());
        let fetcher = fetcher(upstream.clone(), foods.clone());

        let slot = MenuSlot::new("Burge", "burge-market", "dinner-3");
        let stations = match fetcher.fetch(&slot, date()).await.unwrap() {
            SlotOutcome::Menu(stations) => stations,
            other => panic!("Unexpected outcome: {:?}", other),
        };

        assert_eq!(
            stations.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["Grill", "Deli"]
        );
        assert_eq!(
            stations["Grill"]
                .iter()
                .map(|food| food.name.as_str())
                .collect::<Vec<_>>(),
            vec!["Burger", "Fries"]
        );
        assert_eq!(
            stations["Grill"].iter().all(|food| food.meal == Meal::Dinner),
            true
        );
        assert_eq!(foods.len(), 3);

        let burger = foods
            .upsert(&FoodKey::new("Burger", "Grill", "Burge", Meal::Dinner))
            .await
            .unwrap();
        assert_eq!(stations["Grill"][0].id, burger);

        assert_eq!(
            upstream.requests(),
            vec!["http://menus.test/menu/api/weeks/school/burge-market/menu-type/dinner-3/2025/9/17/?format=json"]
        );
    }

    #[tokio::test]
    async fn ids_are_stable_across_fetches() {
        let payload = week_json(date(), &[("Grill", &["Burger"])]);
        let upstream = FakeUpstream::new(move |_| Reply::Json(payload.clone()));
        let fetcher = fetcher(upstream, Arc::new(InMemoryFoodStore::new()));
        let slot = MenuSlot::new("Burge", "burge-market", "lunch");

        let first = fetcher.fetch(&slot, date()).await.unwrap();
        let second = fetcher.fetch(&slot, date()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_days_yield_an_empty_menu() {
        let payload = week_json(date().succ_opt().unwrap(), &[("Grill", &["Burger"])]);
        let upstream = FakeUpstream::new(move |_| Reply::Json(payload.clone()));
        let fetcher = fetcher(upstream, Arc::new(InMemoryFoodStore::new()));

        let outcome = fetcher
            .fetch(&MenuSlot::new("Burge", "burge-market", "lunch"), date())
            .await
            .unwrap();
        assert_eq!(outcome, SlotOutcome::Menu(Default::default()));
    }

    #[tokio::test]
    async fn upstream_problems_are_soft_failures() {
        let slot = MenuSlot::new("Catlett", "catlett-market-place", "lunch-2");

        let failing = fetcher(
            FakeUpstream::new(|_| Reply::Status(503)),
            Arc::new(InMemoryFoodStore::new()),
        );
        assert_eq!(
            matches!(
                failing.fetch(&slot, date()).await.unwrap(),
                SlotOutcome::Unavailable(_)
            ),
            true
        );

        let garbage = fetcher(
            FakeUpstream::new(|_| Reply::Json("<html>Maintenance</html>".to_owned())),
            Arc::new(InMemoryFoodStore::new()),
        );
        assert_eq!(
            matches!(
                garbage.fetch(&slot, date()).await.unwrap(),
                SlotOutcome::Unavailable(_)
            ),
            true
        );
    }

    #[tokio::test]
    async fn identity_store_failures_are_propagated() {
        let payload = week_json(date(), &[("Grill", &["Burger"])]);
        let fetcher = fetcher(
            FakeUpstream::new(move |_| Reply::Json(payload.clone())),
            Arc::new(FailingFoodStore),
        );

        assert_eq!(
            fetcher
                .fetch(&MenuSlot::new("Burge", "burge-market", "lunch"), date())
                .await
                .is_err(),
            true
        );
    }
}
