//! Domain types for assessment trees and the scores attached to them.
//!
//! Identifiers are plain `SQLite` row ids wrapped in newtypes so the arena
//! tree and the store never hand out live references to each other.

/// Store a text enum as its canonical lowercase name.
macro_rules! text_enum_sql {
    ($name:ty) => {
        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|err| rusqlite::types::FromSqlError::Other(Box::new(err)))
            }
        }
    };
}

pub mod automation;
pub mod category;
pub mod milestone;
pub mod score;
pub mod subject;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use automation::{AutomationKind, AutomationRule};
pub use category::{AssessmentType, Category, CategoryDraft, SubjectScope};
pub use milestone::{Milestone, Window};
pub use score::{ScoreCard, ScoreInstance, ScoreKind};
pub use subject::{Enrollment, Role, Subject};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

row_id!(
    /// Row id of an assessment category.
    CategoryId
);
row_id!(
    /// Row id of a group (the owner of one calculation tree).
    GroupId
);
row_id!(
    /// Row id of a project inside a group.
    ProjectId
);
row_id!(UserId);
row_id!(
    /// Row id of a user's membership of a project.
    EnrollmentId
);
row_id!(IssueId);

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

pub(crate) fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}


/// Decode a decimal stored as canonical text.
pub(crate) fn decimal_from_sql(value: ValueRef<'_>) -> FromSqlResult<rust_decimal::Decimal> {
    match value {
        ValueRef::Integer(raw) => Ok(rust_decimal::Decimal::from(raw)),
        ValueRef::Text(_) => value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err))),
        _ => Err(FromSqlError::InvalidType),
    }
}
