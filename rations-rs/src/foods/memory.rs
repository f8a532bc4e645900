use std::collections::HashMap;
use std::sync::Mutex;

use crate::foods::{FoodId, FoodIdentityStore, FoodKey};

/// Keeps all food identities in memory.
///
/// Ids are handed out sequentially, starting with 1. As nothing is persisted, ids are only
/// stable for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryFoodStore {
    foods: Mutex<HashMap<FoodKey, FoodId>>,
}

impl InMemoryFoodStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        InMemoryFoodStore::default()
    }

    /// Returns the number of known foods.
    pub fn len(&self) -> usize {
        self.foods.lock().map(|foods| foods.len()).unwrap_or(0)
    }

    /// Determines if no food has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl FoodIdentityStore for InMemoryFoodStore {
    async fn upsert(&self, key: &FoodKey) -> anyhow::Result<FoodId> {
        let mut foods = self
            .foods
            .lock()
            .map_err(|_| anyhow::anyhow!("The in-memory food store is poisoned!"))?;

        let next_id = foods.len() as FoodId + 1;
        Ok(*foods.entry(key.clone()).or_insert(next_id))
    }
}
