//! Assigns stable ids to foods.
//!
//! A food is identified by its natural key: name, station, dining hall and canonical meal. The
//! first time such a key is observed, the [FoodIdentityStore] creates a record and hands out a
//! new id. Every later observation of the same key yields the very same id, so that ratings
//! collected for "Scrambled Eggs at the Grill of Burge for breakfast" accumulate day after day.
//!
//! Two implementations are provided:
//! * [InMemoryFoodStore] which keeps everything in a map and is used if no database is
//!   configured (and within tests).
//! * [SqliteFoodStore] which persists the foods table in an SQLite database shared with the
//!   ratings side of the application.
use std::fmt::{Display, Formatter};

use crate::menu::Meal;

mod memory;
mod sqlite;

pub use memory::InMemoryFoodStore;
pub use sqlite::SqliteFoodStore;

/// The stable id of a food.
pub type FoodId = i64;

/// Represents the natural key of a food.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FoodKey {
    /// The display name of the food.
    pub name: String,
    /// The display name of the station serving it.
    pub station: String,
    /// The dining hall serving it.
    pub hall: String,
    /// The canonical meal it is served for.
    pub meal: Meal,
}

impl FoodKey {
    /// Creates a new key.
    pub fn new(
        name: impl Into<String>,
        station: impl Into<String>,
        hall: impl Into<String>,
        meal: Meal,
    ) -> Self {
        FoodKey {
            name: name.into(),
            station: station.into(),
            hall: hall.into(),
            meal,
        }
    }
}

impl Display for FoodKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} / {} / {})",
            self.name, self.station, self.hall, self.meal
        )
    }
}

/// Maps the natural key of a food onto its stable id.
///
/// Implementations must be safe to call concurrently and idempotent: calling **upsert** twice
/// (or retrying it after a transient failure) for the same key always yields the same id.
#[async_trait::async_trait]
pub trait FoodIdentityStore: Send + Sync {
    /// Returns the id of the given food, creating a record on first sight.
    async fn upsert(&self, key: &FoodKey) -> anyhow::Result<FoodId>;
}
