//! Recording repository activity fetched from the source-control host.
//!
//! Fetching is someone else's job; this module parses what comes back and
//! stores it idempotently so repeated syncs do not double count.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::db::query;
use crate::error::{TreeError, TreeResult};
use crate::model::{IssueId, ProjectId, UserId};

/// Minutes per duration unit: minute, hour, 8h day, 5-day week.
const UNIT_MINUTES: [(&str, i64); 4] = [("m", 1), ("h", 60), ("d", 480), ("w", 2400)];

/// Parse one `<digits><unit>` token such as `2h` into minutes.
#[must_use]
pub fn minute_amount(token: &str) -> Option<i64> {
    let split = token.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = token.split_at(split);
    if digits.is_empty() {
        return None;
    }
    let multiplier = UNIT_MINUTES
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, minutes)| *minutes)?;
    digits.parse::<i64>().ok()?.checked_mul(multiplier)
}

/// Parse a host note like `added 1h 30m of time spent` into minutes.
///
/// Every token between `added ` and ` of time spent` must parse.
#[must_use]
pub fn parse_time_spent_note(note: &str) -> Option<i64> {
    let (_, rest) = note.split_once("added ")?;
    let (durations, _) = rest.split_once(" of time spent")?;
    durations
        .split(' ')
        .map(minute_amount)
        .try_fold(0_i64, |acc, minutes| acc.checked_add(minutes?))
}

/// One issue as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRecord {
    pub project: ProjectId,
    pub external_id: i64,
    pub title: String,
    /// `order_index` of the milestone the issue belongs to.
    pub milestone_order: Option<u32>,
    /// Username of whoever opened the issue.
    pub author: Option<String>,
    /// Username of whoever closed it, if closed.
    pub closed_by: Option<String>,
}

impl IssueRecord {
    pub fn new(project: ProjectId, external_id: i64, title: impl Into<String>) -> Self {
        Self {
            project,
            external_id,
            title: title.into(),
            milestone_order: None,
            author: None,
            closed_by: None,
        }
    }

    #[must_use]
    pub const fn milestone(mut self, order: u32) -> Self {
        self.milestone_order = Some(order);
        self
    }

    #[must_use]
    pub fn author(mut self, username: impl Into<String>) -> Self {
        self.author = Some(username.into());
        self
    }

    #[must_use]
    pub fn closed_by(mut self, username: impl Into<String>) -> Self {
        self.closed_by = Some(username.into());
        self
    }
}

fn known_user(conn: &Connection, username: Option<&str>) -> TreeResult<Option<UserId>> {
    let Some(username) = username else {
        return Ok(None);
    };
    query::find_user_by_username(conn, username)?
        .map(|user| Some(user.id))
        .ok_or_else(|| TreeError::UserNotFound(username.to_string()))
}

/// Store an issue, mapping it to the milestone at `milestone_order` in the
/// project's group. Re-recording an external id updates title, mapping,
/// author and closer.
///
/// # Errors
///
/// Returns [`TreeError::ProjectNotFound`] for an unknown project and
/// [`TreeError::UserNotFound`] for an unknown author or closer.
pub fn record_issue(conn: &Connection, issue: &IssueRecord) -> TreeResult<IssueId> {
    let project = issue.project;
    let project_row =
        query::get_project(conn, project)?.ok_or(TreeError::ProjectNotFound(project))?;
    let author = known_user(conn, issue.author.as_deref())?;
    let closed_by = known_user(conn, issue.closed_by.as_deref())?;

    let milestone_category = match issue.milestone_order {
        Some(order) => {
            let found = query::milestone_by_order(conn, project_row.group_id, order)?;
            if found.is_none() {
                warn!(%project, order, "issue references an unknown milestone; left unmapped");
            }
            found.map(|milestone| milestone.category_id)
        }
        None => None,
    };

    conn.execute(
        "INSERT INTO issues (
             project_id, external_id, title, milestone_category_id,
             author_user_id, closed_by_user_id
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(project_id, external_id) DO UPDATE SET
             title = excluded.title,
             milestone_category_id = excluded.milestone_category_id,
             author_user_id = excluded.author_user_id,
             closed_by_user_id = excluded.closed_by_user_id",
        params![
            project,
            issue.external_id,
            issue.title,
            milestone_category,
            author,
            closed_by
        ],
    )?;
    let id = conn.query_row(
        "SELECT issue_id FROM issues WHERE project_id = ?1 AND external_id = ?2",
        params![project, issue.external_id],
        |row| row.get(0),
    )?;
    Ok(IssueId(id))
}

/// Store a time entry. Returns `false` when `external_id` was already
/// recorded.
///
/// # Errors
///
/// Returns [`TreeError::InvalidAmount`] for non-positive minutes,
/// [`TreeError::IssueNotFound`] and [`TreeError::UserNotFound`] for unknown
/// references.
pub fn record_time_entry(
    conn: &Connection,
    issue: IssueId,
    username: &str,
    minutes: i64,
    logged_at: DateTime<Utc>,
    external_id: &str,
) -> TreeResult<bool> {
    if minutes <= 0 {
        return Err(TreeError::InvalidAmount(format!(
            "time entry of {minutes} minutes"
        )));
    }
    let known: Option<i64> = conn
        .query_row(
            "SELECT issue_id FROM issues WHERE issue_id = ?1",
            params![issue],
            |row| row.get(0),
        )
        .optional()?;
    if known.is_none() {
        return Err(TreeError::IssueNotFound(issue));
    }
    let user = query::find_user_by_username(conn, username)?
        .ok_or_else(|| TreeError::UserNotFound(username.to_string()))?;

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO time_entries (issue_id, user_id, minutes, logged_at_us, external_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            issue,
            user.id,
            minutes,
            logged_at.timestamp_micros(),
            external_id
        ],
    )?;
    if inserted == 0 {
        debug!(external_id, "time entry already recorded");
    }
    Ok(inserted > 0)
}

/// One commit as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub project: ProjectId,
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub lines_added: i64,
    pub lines_removed: i64,
    pub committed_at: DateTime<Utc>,
}

/// Match a commit author to a user: username equal to the author name,
/// else equal to the local part of the email.
///
/// # Errors
///
/// Returns an error if the lookup fails.
pub fn resolve_committer(conn: &Connection, name: &str, email: &str) -> TreeResult<Option<UserId>> {
    if let Some(user) = query::find_user_by_username(conn, name)? {
        return Ok(Some(user.id));
    }
    let Some((local, _)) = email.split_once('@') else {
        return Ok(None);
    };
    Ok(query::find_user_by_username(conn, local)?.map(|user| user.id))
}

/// Store a commit. Returns `false` when the hash was already recorded for
/// the project. Unresolved authors are kept with no user.
///
/// # Errors
///
/// Returns [`TreeError::InvalidAmount`] for negative line counts and
/// [`TreeError::ProjectNotFound`] for an unknown project.
pub fn record_commit(conn: &Connection, commit: &CommitRecord) -> TreeResult<bool> {
    if commit.lines_added < 0 || commit.lines_removed < 0 {
        return Err(TreeError::InvalidAmount(format!(
            "commit {} has negative line counts",
            commit.hash
        )));
    }
    query::get_project(conn, commit.project)?
        .ok_or(TreeError::ProjectNotFound(commit.project))?;

    let user = resolve_committer(conn, &commit.author_name, &commit.author_email)?;
    if user.is_none() {
        debug!(author = %commit.author_name, hash = %commit.hash, "commit author not matched");
    }

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO commits (
             project_id, hash, user_id, author_name, author_email,
             lines_added, lines_removed, committed_at_us
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            commit.project,
            commit.hash,
            user,
            commit.author_name,
            commit.author_email,
            commit.lines_added,
            commit.lines_removed,
            commit.committed_at.timestamp_micros(),
        ],
    )?;
    Ok(inserted > 0)
}
