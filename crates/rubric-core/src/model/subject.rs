use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{EnrollmentId, ParseEnumError, ProjectId, SubjectScope, UserId, normalize};

/// Entity a score belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    /// A user's membership of a project; scored on user-scoped categories.
    #[serde(rename = "user")]
    Enrollment(EnrollmentId),
    /// The project itself; scored on project-scoped categories.
    Project(ProjectId),
}

impl Subject {
    #[must_use]
    pub const fn scope(self) -> SubjectScope {
        match self {
            Self::Enrollment(_) => SubjectScope::User,
            Self::Project(_) => SubjectScope::Project,
        }
    }

    /// Raw row id stored alongside [`Self::scope`].
    #[must_use]
    pub const fn raw_id(self) -> i64 {
        match self {
            Self::Enrollment(id) => id.0,
            Self::Project(id) => id.0,
        }
    }

    #[must_use]
    pub const fn from_parts(scope: SubjectScope, id: i64) -> Self {
        match scope {
            SubjectScope::User => Self::Enrollment(EnrollmentId(id)),
            SubjectScope::Project => Self::Project(ProjectId(id)),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enrollment(id) => write!(f, "enrollment:{id}"),
            Self::Project(id) => write!(f, "project:{id}"),
        }
    }
}

/// Project role, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Member,
    Mentor,
    Teacher,
    Admin,
    Owner,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Member => "member",
            Self::Mentor => "mentor",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// True when this role carries at least the rights of `required`.
    #[must_use]
    pub fn has_rights(self, required: Self) -> bool {
        self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "viewer" | "v" => Ok(Self::Viewer),
            "member" | "m" => Ok(Self::Member),
            "mentor" | "e" => Ok(Self::Mentor),
            "teacher" | "t" => Ok(Self::Teacher),
            "admin" | "a" => Ok(Self::Admin),
            "owner" | "o" => Ok(Self::Owner),
            _ => Err(ParseEnumError {
                expected: "role",
                got: s.to_string(),
            }),
        }
    }
}

text_enum_sql!(Role);

/// A user's membership of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub role: Role,
    pub disabled: bool,
}

impl Enrollment {
    #[must_use]
    pub const fn subject(&self) -> Subject {
        Subject::Enrollment(self.id)
    }
}
