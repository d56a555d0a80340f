use std::fmt;

use crate::model::{CategoryId, EnrollmentId, GroupId, IssueId, ProjectId, SubjectScope};

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    CategoryNotFound,
    GroupNotFound,
    SubjectNotFound,
    ScopeMismatch,
    AutomationRuleMismatch,
    InvalidAmount,
    InvalidWindow,
    RootAlreadyExists,
    CycleDetected,
    PermissionDenied,
    CorruptStore,
    LockContention,
    StorageFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::CategoryNotFound => "E2001",
            Self::GroupNotFound => "E2002",
            Self::SubjectNotFound => "E2003",
            Self::ScopeMismatch => "E3001",
            Self::AutomationRuleMismatch => "E3002",
            Self::InvalidAmount => "E3003",
            Self::InvalidWindow => "E3004",
            Self::RootAlreadyExists => "E3005",
            Self::CycleDetected => "E3006",
            Self::PermissionDenied => "E4001",
            Self::CorruptStore => "E5001",
            Self::LockContention => "E5002",
            Self::StorageFailure => "E5003",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::CategoryNotFound => "Category not found",
            Self::GroupNotFound => "Group not found",
            Self::SubjectNotFound => "Subject not found",
            Self::ScopeMismatch => "Subject scope mismatch",
            Self::AutomationRuleMismatch => "Automation rule does not match category type",
            Self::InvalidAmount => "Invalid amount",
            Self::InvalidWindow => "Invalid milestone window",
            Self::RootAlreadyExists => "Group already has a root category",
            Self::CycleDetected => "Tree would contain a cycle",
            Self::PermissionDenied => "Permission denied",
            Self::CorruptStore => "Corrupt score store",
            Self::LockContention => "Lock contention",
            Self::StorageFailure => "Storage failure",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `rb init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .rubric/config.toml and retry."),
            Self::CategoryNotFound | Self::GroupNotFound | Self::SubjectNotFound => None,
            Self::ScopeMismatch => {
                Some("Project-scoped categories may only contain project-scoped children.")
            }
            Self::AutomationRuleMismatch => {
                Some("Automatic categories need --automation; other types must not set it.")
            }
            Self::InvalidAmount => Some("Use a non-negative decimal such as 2.5."),
            Self::InvalidWindow => Some("The window end must not be before its start."),
            Self::RootAlreadyExists => Some("Add the category under the existing root instead."),
            Self::CycleDetected => Some("Choose a target parent outside the copied subtree."),
            Self::PermissionDenied => Some("Only group owners may delete categories."),
            Self::CorruptStore => Some("Inspect .rubric/rubric.db; a row holds an unknown value."),
            Self::LockContention => Some("Retry after the other `rb` process releases its lock."),
            Self::StorageFailure => Some("Check disk space and write permissions."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Structured failures surfaced by the scoring engine and tree mutations.
///
/// Validation variants are produced before any write happens. Storage
/// failures abort the surrounding transaction, so callers never observe a
/// partially applied mutation.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("category {0} not found")]
    CategoryNotFound(CategoryId),

    #[error("group {0} not found")]
    GroupNotFound(GroupId),

    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),

    #[error("user '{0}' not found")]
    UserNotFound(String),

    #[error("enrollment {0} not found")]
    EnrollmentNotFound(EnrollmentId),

    #[error("issue {0} not found")]
    IssueNotFound(IssueId),

    #[error("{child} category cannot be placed under {parent} category {parent_id}")]
    ScopeMismatch {
        parent_id: CategoryId,
        parent: SubjectScope,
        child: SubjectScope,
    },

    #[error("automatic category '{0}' requires an automation rule")]
    MissingAutomationRule(String),

    #[error("category '{0}' is not automatic and cannot carry an automation rule")]
    UnexpectedAutomationRule(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid milestone window: end {end} is before start {start}")]
    InvalidWindow { start: String, end: String },

    #[error("group {group} already has root category {root}")]
    RootAlreadyExists { group: GroupId, root: CategoryId },

    #[error("cannot copy category {source_id} under its own descendant {target}")]
    CopyIntoSelf {
        source_id: CategoryId,
        target: CategoryId,
    },

    #[error("enrollment {enrollment} does not belong to group {group}")]
    SubjectOutsideGroup {
        enrollment: EnrollmentId,
        group: GroupId,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("corrupt row in {table}: {detail}")]
    CorruptRow { table: &'static str, detail: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl TreeError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::CategoryNotFound(_) => ErrorCode::CategoryNotFound,
            Self::GroupNotFound(_) => ErrorCode::GroupNotFound,
            Self::ProjectNotFound(_)
            | Self::UserNotFound(_)
            | Self::EnrollmentNotFound(_)
            | Self::IssueNotFound(_) => ErrorCode::SubjectNotFound,
            Self::ScopeMismatch { .. } | Self::SubjectOutsideGroup { .. } => {
                ErrorCode::ScopeMismatch
            }
            Self::MissingAutomationRule(_) | Self::UnexpectedAutomationRule(_) => {
                ErrorCode::AutomationRuleMismatch
            }
            Self::InvalidAmount(_) => ErrorCode::InvalidAmount,
            Self::InvalidWindow { .. } => ErrorCode::InvalidWindow,
            Self::RootAlreadyExists { .. } => ErrorCode::RootAlreadyExists,
            Self::CopyIntoSelf { .. } => ErrorCode::CycleDetected,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::CorruptRow { .. } => ErrorCode::CorruptStore,
            Self::Storage(_) => ErrorCode::StorageFailure,
        }
    }

    /// True for the caller-visible not-found family.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CategoryNotFound(_)
                | Self::GroupNotFound(_)
                | Self::ProjectNotFound(_)
                | Self::UserNotFound(_)
                | Self::EnrollmentNotFound(_)
                | Self::IssueNotFound(_)
        )
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Result alias used across the engine.
pub type TreeResult<T> = std::result::Result<T, TreeError>;
