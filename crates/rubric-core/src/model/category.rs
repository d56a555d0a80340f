use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{
    AutomationRule, CategoryId, GroupId, ParseEnumError, Window, normalize,
};

/// How a category obtains its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentType {
    /// Entered by hand only.
    Custom,
    /// Sum of children, scaled to `total`.
    Sum,
    /// Max of children, scaled to `total`.
    Max,
    /// Min of children, scaled to `total`.
    Min,
    /// Derived from external signal through an automation rule.
    Automatic,
}

impl AssessmentType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
            Self::Automatic => "automatic",
        }
    }
}

/// Whether a category is scored once per project or once per enrolled user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectScope {
    User,
    Project,
}

impl SubjectScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project => "project",
        }
    }

    /// A child may sit under this scope unless it would be a user-scoped
    /// child of a project-scoped parent.
    #[must_use]
    pub const fn admits_child(self, child: Self) -> bool {
        !matches!((self, child), (Self::Project, Self::User))
    }
}

impl fmt::Display for AssessmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SubjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "custom" | "c" => Ok(Self::Custom),
            "sum" | "s" => Ok(Self::Sum),
            "max" | "m" => Ok(Self::Max),
            "min" | "i" => Ok(Self::Min),
            "automatic" | "auto" | "a" => Ok(Self::Automatic),
            _ => Err(ParseEnumError {
                expected: "assessment type",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for SubjectScope {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "user" => Ok(Self::User),
            "project" => Ok(Self::Project),
            _ => Err(ParseEnumError {
                expected: "subject scope",
                got: s.to_string(),
            }),
        }
    }
}

text_enum_sql!(AssessmentType);
text_enum_sql!(SubjectScope);

/// A persisted node of an assessment tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub group_id: GroupId,
    pub parent_id: Option<CategoryId>,
    pub name: String,
    pub description: Option<String>,
    pub total: Decimal,
    pub assessment_type: AssessmentType,
    pub scope: SubjectScope,
}

/// Everything needed to create (or copy) a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub description: Option<String>,
    pub total: Decimal,
    pub assessment_type: AssessmentType,
    pub scope: SubjectScope,
    pub automation: Option<AutomationRule>,
    pub window: Option<Window>,
}

impl CategoryDraft {
    /// Draft with the default budget of one point, scored per user.
    pub fn new(name: impl Into<String>, assessment_type: AssessmentType) -> Self {
        Self {
            name: name.into(),
            description: None,
            total: Decimal::ONE,
            assessment_type,
            scope: SubjectScope::User,
            automation: None,
            window: None,
        }
    }

    #[must_use]
    pub const fn total(mut self, total: Decimal) -> Self {
        self.total = total;
        self
    }

    #[must_use]
    pub const fn scope(mut self, scope: SubjectScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn automation(mut self, rule: AutomationRule) -> Self {
        self.automation = Some(rule);
        self
    }

    #[must_use]
    pub const fn window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }
}
