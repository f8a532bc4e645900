//! Contains the menu model along with the machinery which fetches and aggregates it.
//!
//! A [MenuSnapshot] describes what is served on a single day: for each dining hall, for each
//! canonical [Meal], the stations and the foods they offer. Snapshots are computed by the
//! [Aggregator](aggregator::Aggregator) which fans out one [SourceFetcher](fetcher::SourceFetcher)
//! call per configured [MenuSlot].
//!
//! Two invariants hold for every snapshot:
//! * stations listed in the [IgnoreList] never show up.
//! * meals without any qualifying food are omitted instead of being stored as empty maps.
use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};

use crate::foods::FoodId;

pub mod aggregator;
pub mod fetcher;
mod meal;
pub mod nutrislice;
pub mod upstream;

pub use meal::Meal;

/// Describes a single food as served at a station.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodItem {
    /// The stable id assigned by the food identity store.
    pub id: FoodId,
    /// The display name of the food.
    pub name: String,
    /// The canonical meal this food is served for.
    pub meal: Meal,
}

/// Maps station display names onto the foods they serve.
///
/// Stations keep the order of their first appearance in the upstream response and so do the
/// foods of each station.
pub type StationMap = LinkedHashMap<String, Vec<FoodItem>>;

/// Represents all menus of a single day: hall -> meal -> station -> foods.
///
/// # Examples
/// ```
/// # use rations::menu::{FoodItem, Meal, MenuSnapshot, StationMap};
/// let mut snapshot = MenuSnapshot::new();
///
/// let mut stations = StationMap::new();
/// stations.insert("Grill".to_owned(), vec![FoodItem { id: 1, name: "Burger".to_owned(), meal: Meal::Lunch }]);
/// assert_eq!(snapshot.insert("Burge", Meal::Lunch, stations), true);
///
/// // Empty meals are never stored...
/// assert_eq!(snapshot.insert("Burge", Meal::Dinner, StationMap::new()), false);
///
/// assert_eq!(snapshot.slot_count(), 1);
/// assert_eq!(snapshot.stations("Burge", Meal::Lunch).unwrap()["Grill"][0].name, "Burger");
/// assert_eq!(snapshot.stations("Burge", Meal::Dinner).is_none(), true);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuSnapshot {
    halls: BTreeMap<String, BTreeMap<Meal, StationMap>>,
}

impl MenuSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        MenuSnapshot::default()
    }

    /// Stores the stations of the given hall and meal.
    ///
    /// An empty station map is discarded, so that absent keys always mean "nothing served".
    /// Returns **true** if the stations were stored.
    pub fn insert(&mut self, hall: &str, meal: Meal, stations: StationMap) -> bool {
        if stations.is_empty() {
            return false;
        }

        let _ = self
            .halls
            .entry(hall.to_owned())
            .or_default()
            .insert(meal, stations);

        true
    }

    /// Returns the meals served in the given hall.
    pub fn hall(&self, hall: &str) -> Option<&BTreeMap<Meal, StationMap>> {
        self.halls.get(hall)
    }

    /// Returns the stations of the given hall and meal.
    pub fn stations(&self, hall: &str, meal: Meal) -> Option<&StationMap> {
        self.halls.get(hall).and_then(|meals| meals.get(&meal))
    }

    /// Iterates over all halls which serve at least one meal.
    pub fn halls(&self) -> impl Iterator<Item = (&String, &BTreeMap<Meal, StationMap>)> {
        self.halls.iter()
    }

    /// Returns the number of populated (hall, meal) combinations.
    pub fn slot_count(&self) -> usize {
        self.halls.values().map(|meals| meals.len()).sum()
    }

    /// Returns the total number of foods in this snapshot.
    pub fn food_count(&self) -> usize {
        self.halls
            .values()
            .flat_map(|meals| meals.values())
            .flat_map(|stations| stations.values())
            .map(|foods| foods.len())
            .sum()
    }

    /// Determines if nothing at all is served.
    pub fn is_empty(&self) -> bool {
        self.halls.is_empty()
    }
}

/// Describes one physical meal service of a dining hall and how to fetch it upstream.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MenuSlot {
    /// The display name of the dining hall, e.g. "Burge".
    pub hall: String,
    /// The upstream school slug, e.g. "burge-market".
    pub school: String,
    /// The upstream meal slug, e.g. "dinner-3".
    pub meal_slug: String,
}

impl MenuSlot {
    /// Creates a new slot.
    pub fn new(hall: impl Into<String>, school: impl Into<String>, meal_slug: impl Into<String>) -> Self {
        MenuSlot {
            hall: hall.into(),
            school: school.into(),
            meal_slug: meal_slug.into(),
        }
    }

    /// Returns the canonical meal served in this slot.
    pub fn meal(&self) -> Meal {
        Meal::classify(&self.meal_slug)
    }
}

/// Returns the menu slots of the three dining halls known to the upstream API.
pub fn default_slots() -> Vec<MenuSlot> {
    [
        ("Burge", "burge-market", ["breakfast", "lunch", "dinner-3"]),
        (
            "Catlett",
            "catlett-market-place",
            ["breakfast-2", "lunch-2", "dinner-2"],
        ),
        (
            "Hillcrest",
            "hillcrest-market-place",
            ["breakfast-3", "lunch-3", "dinner"],
        ),
    ]
    .iter()
    .flat_map(|(hall, school, meals)| {
        meals
            .iter()
            .map(move |meal_slug| MenuSlot::new(*hall, *school, *meal_slug))
    })
    .collect()
}

/// Contains the names of stations which are dropped entirely.
///
/// Foods of an ignored station are neither shown nor registered in the identity store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IgnoreList {
    stations: HashSet<String>,
}

impl IgnoreList {
    /// Creates a list ignoring exactly the given stations.
    pub fn new<I, S>(stations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IgnoreList {
            stations: stations.into_iter().map(Into::into).collect(),
        }
    }

    /// Determines if the given station is to be dropped.
    pub fn contains(&self, station: &str) -> bool {
        self.stations.contains(station)
    }

    /// Returns the number of ignored stations.
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Determines if no station is ignored at all.
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

impl Default for IgnoreList {
    fn default() -> Self {
        IgnoreList::new([
            "Beverages",
            "Condiments",
            "Breads & Spreads, Cereal, and Waffle Bar",
            "Desserts",
            "Salad Bar",
            "Yogurt Bar",
        ])
    }
}

/// Formats a date the way it is used as cache key and in upstream payloads.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
