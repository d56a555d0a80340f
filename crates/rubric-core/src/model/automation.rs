use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{ParseEnumError, normalize};

/// Source of external signal an automatic category is scored from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationKind {
    /// Uniform roll in `[0, 1)` scaled to the category total.
    Random,
    /// Hours logged against issues of the governing milestone.
    TimeSpent,
    /// Net lines committed inside the governing milestone window.
    LinesChanged,
}

impl AutomationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::TimeSpent => "time_spent",
            Self::LinesChanged => "lines_changed",
        }
    }

    /// Whether the kind reads signal from a milestone window.
    #[must_use]
    pub const fn needs_window(self) -> bool {
        !matches!(self, Self::Random)
    }
}

impl fmt::Display for AutomationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutomationKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).replace('-', "_").as_str() {
            "random" | "r" => Ok(Self::Random),
            "time_spent" | "time" | "t" => Ok(Self::TimeSpent),
            "lines_changed" | "lines" | "l" => Ok(Self::LinesChanged),
            _ => Err(ParseEnumError {
                expected: "automation kind",
                got: s.to_string(),
            }),
        }
    }
}

text_enum_sql!(AutomationKind);

/// Automation attached 1:1 to an automatic category.
///
/// `amount_needed` is the denominator of the signal ratio: hours for
/// [`AutomationKind::TimeSpent`], lines for [`AutomationKind::LinesChanged`].
/// Random rules keep it only for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub kind: AutomationKind,
    pub amount_needed: i64,
}

impl AutomationRule {
    #[must_use]
    pub const fn new(kind: AutomationKind, amount_needed: i64) -> Self {
        Self {
            kind,
            amount_needed,
        }
    }

    #[must_use]
    pub const fn random() -> Self {
        Self::new(AutomationKind::Random, 0)
    }

    /// Ratio kinds divide by `amount_needed`, so it must be positive.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        !self.kind.needs_window() || self.amount_needed > 0
    }
}
