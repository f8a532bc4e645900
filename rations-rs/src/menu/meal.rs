use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Enumerates the canonical meals of a day.
///
/// The upstream API knows many variants of each meal (e.g. "dinner-3" or "breakfast-2"), which
/// are all mapped onto one of these using [Meal::classify].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Meal {
    /// Breakfast, also the fallback for unknown slugs.
    Breakfast,
    /// Lunch.
    Lunch,
    /// Dinner.
    Dinner,
}

impl Meal {
    /// Maps an upstream meal slug onto its canonical meal.
    ///
    /// The checks are performed in a fixed order: a slug containing "lunch" is lunch, otherwise
    /// a slug containing "dinner" is dinner and everything else is breakfast. Therefore a
    /// (hypothetical) slug like "lunch-dinner" resolves to lunch.
    ///
    /// # Examples
    /// ```
    /// # use rations::menu::Meal;
    /// assert_eq!(Meal::classify("dinner-3"), Meal::Dinner);
    /// assert_eq!(Meal::classify("breakfast-2"), Meal::Breakfast);
    /// assert_eq!(Meal::classify("lunch"), Meal::Lunch);
    /// assert_eq!(Meal::classify("brunch"), Meal::Breakfast);
    /// ```
    pub fn classify(slug: &str) -> Meal {
        const PRECEDENCE: [(&str, Meal); 2] = [("lunch", Meal::Lunch), ("dinner", Meal::Dinner)];

        PRECEDENCE
            .iter()
            .find(|(pattern, _)| slug.contains(pattern))
            .map(|(_, meal)| *meal)
            .unwrap_or(Meal::Breakfast)
    }

    /// Returns the lowercase name as used in snapshots and the identity store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Meal::Breakfast => "breakfast",
            Meal::Lunch => "lunch",
            Meal::Dinner => "dinner",
        }
    }
}

impl Display for Meal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::menu::Meal;

    #[test]
    fn upstream_slugs_are_canonicalized() {
        assert_eq!(Meal::classify("breakfast"), Meal::Breakfast);
        assert_eq!(Meal::classify("breakfast-3"), Meal::Breakfast);
        assert_eq!(Meal::classify("lunch-2"), Meal::Lunch);
        assert_eq!(Meal::classify("dinner"), Meal::Dinner);
        assert_eq!(Meal::classify("dinner-2"), Meal::Dinner);
        assert_eq!(Meal::classify(""), Meal::Breakfast);
    }

    #[test]
    fn lunch_takes_precedence_over_dinner() {
        assert_eq!(Meal::classify("dinner-or-lunch"), Meal::Lunch);
    }

    #[test]
    fn meals_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Meal::Dinner).unwrap(), "\"dinner\"");
        assert_eq!(Meal::Lunch.to_string(), "lunch");
    }
}
