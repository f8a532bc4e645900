//! Computes the [MenuSnapshot] of a day by fanning out one fetch per configured slot.
//!
//! Each slot runs as its own tokio task which is bounded by the **unit timeout**. A slot which
//! exceeds it is abandoned: its pending upstream call is dropped and whatever it would have
//! delivered is discarded. Therefore the aggregation as a whole never takes (much) longer than
//! the unit timeout, no matter how slow single upstream calls are.
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use crate::fmt::format_duration;
use crate::menu::fetcher::{SlotOutcome, SourceFetcher};
use crate::menu::{date_key, MenuSlot, MenuSnapshot};

/// Folds the menus of all slots into one snapshot.
pub struct Aggregator {
    fetcher: Arc<SourceFetcher>,
    slots: Vec<MenuSlot>,
    unit_timeout: Duration,
}

impl Aggregator {
    /// Creates a new aggregator for the given slots.
    pub fn new(fetcher: Arc<SourceFetcher>, slots: Vec<MenuSlot>, unit_timeout: Duration) -> Self {
        Aggregator {
            fetcher,
            slots,
            unit_timeout,
        }
    }

    /// Computes the snapshot for the given date.
    ///
    /// Slots which fail softly or time out are omitted. An error is only reported if not a
    /// single slot delivered a menu (so that "nothing served" can be told apart from "upstream
    /// down") or if the identity store failed.
    pub async fn aggregate(&self, date: NaiveDate) -> anyhow::Result<MenuSnapshot> {
        let units = self.slots.iter().cloned().map(|slot| {
            let fetcher = self.fetcher.clone();
            let unit_timeout = self.unit_timeout;
            async move {
                // An abandoned fetch is dropped within its task, so it never reaches the store.
                let task = tokio::spawn({
                    let slot = slot.clone();
                    async move {
                        match tokio::time::timeout(unit_timeout, fetcher.fetch(&slot, date)).await {
                            Ok(result) => result,
                            Err(_) => {
                                log::warn!(
                                    "{} / {} did not complete within {} and is skipped.",
                                    slot.hall,
                                    slot.meal_slug,
                                    format_duration(unit_timeout)
                                );
                                Ok(SlotOutcome::Unavailable("Timeout".to_owned()))
                            }
                        }
                    }
                });

                let outcome = match task.await {
                    Ok(result) => result,
                    Err(error) => Ok(SlotOutcome::Unavailable(format!(
                        "The fetch task crashed: {}",
                        error
                    ))),
                };

                (slot, outcome)
            }
        });

        let results = futures::future::join_all(units).await;

        let mut snapshot = MenuSnapshot::new();
        let mut answered = 0;
        let mut failures = Vec::new();
        for (slot, outcome) in results {
            match outcome? {
                SlotOutcome::Menu(stations) => {
                    answered += 1;
                    let _ = snapshot.insert(&slot.hall, slot.meal(), stations);
                }
                SlotOutcome::Unavailable(reason) => {
                    failures.push(format!("{} / {}: {}", slot.hall, slot.meal_slug, reason))
                }
            }
        }

        if answered == 0 && !self.slots.is_empty() {
            return Err(anyhow::anyhow!(
                "Not a single menu could be fetched for {} ({})",
                date_key(date),
                failures.join(", ")
            ));
        }

        log::debug!(
            "Aggregated the menus of {}: {} of {} slots answered, {} foods in total.",
            date_key(date),
            answered,
            self.slots.len(),
            snapshot.food_count()
        );

        Ok(snapshot)
    }
}
