use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{CategoryId, ParseEnumError, Subject, normalize};

/// Kind of a recorded score, ordered by precedence (lowest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    Placeholder,
    Automatic,
    Manual,
}

impl ScoreKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Placeholder => "placeholder",
            Self::Automatic => "automatic",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "placeholder" | "p" => Ok(Self::Placeholder),
            "automatic" | "a" => Ok(Self::Automatic),
            "manual" | "m" => Ok(Self::Manual),
            _ => Err(ParseEnumError {
                expected: "score kind",
                got: s.to_string(),
            }),
        }
    }
}

text_enum_sql!(ScoreKind);

/// One stored score row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreInstance {
    pub id: i64,
    pub category_id: CategoryId,
    pub subject: Subject,
    pub kind: ScoreKind,
    pub value: Decimal,
}

/// Every score a subject holds on one category, one slot per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub placeholder: Option<Decimal>,
    pub automatic: Option<Decimal>,
    pub manual: Option<Decimal>,
}

impl ScoreCard {
    pub fn from_instances<'a>(instances: impl IntoIterator<Item = &'a ScoreInstance>) -> Self {
        let mut card = Self::default();
        for instance in instances {
            card.set(instance.kind, instance.value);
        }
        card
    }

    pub const fn set(&mut self, kind: ScoreKind, value: Decimal) {
        match kind {
            ScoreKind::Placeholder => self.placeholder = Some(value),
            ScoreKind::Automatic => self.automatic = Some(value),
            ScoreKind::Manual => self.manual = Some(value),
        }
    }

    /// Value that counts for aggregation: manual, then automatic, then
    /// placeholder, then zero.
    #[must_use]
    pub fn chosen(&self) -> Decimal {
        self.manual
            .or(self.automatic)
            .or(self.placeholder)
            .unwrap_or(Decimal::ZERO)
    }

    /// Kind of the value returned by [`Self::chosen`], if any exists.
    #[must_use]
    pub const fn chosen_kind(&self) -> Option<ScoreKind> {
        if self.manual.is_some() {
            Some(ScoreKind::Manual)
        } else if self.automatic.is_some() {
            Some(ScoreKind::Automatic)
        } else if self.placeholder.is_some() {
            Some(ScoreKind::Placeholder)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.chosen_kind().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_beats_automatic_beats_placeholder() {
        let mut card = ScoreCard::default();
        assert_eq!(card.chosen(), Decimal::ZERO);
        assert!(card.is_empty());

        card.set(ScoreKind::Placeholder, Decimal::ZERO);
        card.set(ScoreKind::Automatic, Decimal::from(4));
        assert_eq!(card.chosen(), Decimal::from(4));

        card.set(ScoreKind::Manual, Decimal::from(7));
        assert_eq!(card.chosen(), Decimal::from(7));
        assert_eq!(card.chosen_kind(), Some(ScoreKind::Manual));
    }

    #[test]
    fn manual_zero_still_overrides() {
        let card = ScoreCard {
            placeholder: None,
            automatic: Some(Decimal::from(3)),
            manual: Some(Decimal::ZERO),
        };
        assert_eq!(card.chosen(), Decimal::ZERO);
    }

    #[test]
    fn kinds_sort_by_precedence() {
        assert!(ScoreKind::Manual > ScoreKind::Automatic);
        assert!(ScoreKind::Automatic > ScoreKind::Placeholder);
    }
}
