//! Understands the weekly menu format served by the upstream (Nutrislice) API.
//!
//! A single request yields the menus of a whole week for one school and one meal. The relevant
//! parts of the payload look like this:
//!
//! ```json
//! {
//!   "days": [{
//!     "date": "2025-09-17",
//!     "menu_items": [
//!       { "menu_id": 8812, "is_section_title": false, "food": { "name": "Scrambled Eggs" } }
//!     ],
//!     "menu_info": {
//!       "8812": { "section_options": { "display_name": "Grill" } }
//!     }
//!   }]
//! }
//! ```
//!
//! Note that items only reference their station by id. The display name of a station is
//! resolved through the `menu_info` lookup table of the same day.
use std::collections::HashMap;

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use linked_hash_map::LinkedHashMap;
use serde::Deserialize;
use serde_json::Value;

use crate::menu::{date_key, IgnoreList, MenuSlot};

/// The response of a weekly menu request.
#[derive(Deserialize, Debug, Default)]
pub struct WeekMenu {
    #[serde(default)]
    days: Vec<DayMenu>,
}

/// The menu of a single day within a [WeekMenu].
#[derive(Deserialize, Debug, Default)]
pub struct DayMenu {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    menu_items: Vec<MenuItem>,
    #[serde(default)]
    menu_info: HashMap<String, StationInfo>,
}

#[derive(Deserialize, Debug)]
struct MenuItem {
    #[serde(default)]
    menu_id: Option<Value>,
    #[serde(default)]
    is_section_title: Option<bool>,
    #[serde(default)]
    food: Option<Food>,
}

#[derive(Deserialize, Debug)]
struct Food {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StationInfo {
    #[serde(default)]
    section_options: Option<SectionOptions>,
}

#[derive(Deserialize, Debug)]
struct SectionOptions {
    #[serde(default)]
    display_name: Option<String>,
}

/// Maps station names onto the names of the foods they serve, in upstream order.
pub type CategorizedNames = LinkedHashMap<String, Vec<String>>;

/// Builds the URL to fetch the week containing **date** for the given slot.
///
/// # Examples
/// ```
/// # use rations::menu::MenuSlot;
/// # use rations::menu::nutrislice::menu_url;
/// # use chrono::NaiveDate;
/// let slot = MenuSlot::new("Burge", "burge-market", "dinner-3");
/// let date = NaiveDate::from_ymd_opt(2025, 9, 7).unwrap();
///
/// assert_eq!(
///     menu_url("https://dininguiowa.api.nutrislice.com/", &slot, date),
///     "https://dininguiowa.api.nutrislice.com/menu/api/weeks/school/burge-market/menu-type/dinner-3/2025/9/7/?format=json"
/// );
/// ```
pub fn menu_url(base: &str, slot: &MenuSlot, date: NaiveDate) -> String {
    format!(
        "{}/menu/api/weeks/school/{}/menu-type/{}/{}/{}/{}/?format=json",
        base.trim_end_matches('/'),
        slot.school,
        slot.meal_slug,
        date.year(),
        date.month(),
        date.day()
    )
}

impl WeekMenu {
    /// Parses the raw response body.
    pub fn parse(body: &[u8]) -> anyhow::Result<WeekMenu> {
        serde_json::from_slice(body).context("The upstream response is not a valid weekly menu")
    }

    /// Returns the menu of the given day if it is part of this week.
    pub fn day(&self, date: NaiveDate) -> Option<&DayMenu> {
        let key = date_key(date);
        self.days
            .iter()
            .find(|day| day.date.as_deref() == Some(key.as_str()))
    }
}

impl DayMenu {
    /// Groups the foods of this day by the display name of their station.
    ///
    /// Section titles, entries without a food and foods whose station cannot be resolved are
    /// skipped. So are all foods of an ignored station.
    pub fn categorize(&self, ignored: &IgnoreList) -> CategorizedNames {
        let stations = self.station_names();
        let mut result = CategorizedNames::new();

        for item in &self.menu_items {
            if item.is_section_title.unwrap_or(false) {
                continue;
            }

            let name = match item.food.as_ref().and_then(|food| food.name.as_ref()) {
                Some(name) if !name.trim().is_empty() => name,
                _ => continue,
            };

            let station = match item
                .menu_id
                .as_ref()
                .and_then(station_key)
                .and_then(|id| stations.get(id.as_str()))
            {
                Some(station) => *station,
                None => continue,
            };

            if ignored.contains(station) {
                continue;
            }

            match result.get_mut(station) {
                Some(foods) => foods.push(name.clone()),
                None => {
                    let _ = result.insert(station.to_owned(), vec![name.clone()]);
                }
            }
        }

        result
    }

    fn station_names(&self) -> HashMap<&str, &str> {
        self.menu_info
            .iter()
            .filter_map(|(id, info)| {
                info.section_options
                    .as_ref()
                    .and_then(|options| options.display_name.as_deref())
                    .map(|name| (id.as_str(), name))
            })
            .collect()
    }
}

/// Station ids show up as numbers in items but as strings in the lookup table.
fn station_key(menu_id: &Value) -> Option<String> {
    match menu_id {
        Value::Number(number) => Some(number.to_string()),
        Value::String(string) => Some(string.clone()),
        _ => None,
    }
}
