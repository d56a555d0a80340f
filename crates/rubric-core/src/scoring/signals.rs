//! External signal consumed by time and lines automation.

use rusqlite::{Connection, params};
use rust_decimal::Decimal;

use crate::db::query;
use crate::error::{TreeError, TreeResult};
use crate::model::{Enrollment, Milestone, Subject};

/// Supplier of raw activity figures for a subject inside a milestone.
///
/// The milestone carries both the window and the category it is bound to,
/// so implementations can match issues mapped to that milestone.
pub trait SignalSource {
    /// Total minutes logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject cannot be resolved or the backing
    /// store fails.
    fn minutes_logged(&self, subject: Subject, milestone: &Milestone) -> TreeResult<Decimal>;

    /// Lines added minus lines removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject cannot be resolved or the backing
    /// store fails.
    fn net_lines(&self, subject: Subject, milestone: &Milestone) -> TreeResult<i64>;
}

/// Reads the `issues`, `time_entries` and `commits` tables.
///
/// A project subject is the sum over its enabled enrollments.
#[derive(Debug, Clone, Copy)]
pub struct SqliteSignals<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSignals<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn members(&self, subject: Subject) -> TreeResult<Vec<Enrollment>> {
        match subject {
            Subject::Enrollment(id) => query::get_enrollment(self.conn, id)?
                .map(|enrollment| vec![enrollment])
                .ok_or(TreeError::EnrollmentNotFound(id)),
            Subject::Project(id) => query::project_enrollments(self.conn, id, false),
        }
    }

    fn member_minutes(&self, member: &Enrollment, milestone: &Milestone) -> TreeResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(t.minutes), 0)
             FROM time_entries t
             JOIN issues i ON i.issue_id = t.issue_id
             WHERE t.user_id = ?1
               AND i.project_id = ?2
               AND i.milestone_category_id = ?3
               AND t.logged_at_us BETWEEN ?4 AND ?5",
            params![
                member.user_id,
                member.project_id,
                milestone.category_id,
                milestone.window.start_us(),
                milestone.window.end_us(),
            ],
            |row| row.get(0),
        )?)
    }

    fn member_lines(&self, member: &Enrollment, milestone: &Milestone) -> TreeResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(lines_added - lines_removed), 0)
             FROM commits
             WHERE project_id = ?1
               AND user_id = ?2
               AND committed_at_us BETWEEN ?3 AND ?4",
            params![
                member.project_id,
                member.user_id,
                milestone.window.start_us(),
                milestone.window.end_us(),
            ],
            |row| row.get(0),
        )?)
    }
}

impl SignalSource for SqliteSignals<'_> {
    fn minutes_logged(&self, subject: Subject, milestone: &Milestone) -> TreeResult<Decimal> {
        let mut minutes = 0_i64;
        for member in self.members(subject)? {
            minutes = minutes.saturating_add(self.member_minutes(&member, milestone)?);
        }
        Ok(Decimal::from(minutes))
    }

    fn net_lines(&self, subject: Subject, milestone: &Milestone) -> TreeResult<i64> {
        let mut lines = 0_i64;
        for member in self.members(subject)? {
            lines = lines.saturating_add(self.member_lines(&member, milestone)?);
        }
        Ok(lines)
    }
}

/// The same figures for every subject and milestone.
///
/// For callers whose collector already reduced the signal to one number,
/// and for grading a tree before any activity is recorded. The default
/// reports no time and no lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedSignals {
    pub minutes: Decimal,
    pub lines: i64,
}

impl SignalSource for FixedSignals {
    fn minutes_logged(&self, _subject: Subject, _milestone: &Milestone) -> TreeResult<Decimal> {
        Ok(self.minutes)
    }

    fn net_lines(&self, _subject: Subject, _milestone: &Milestone) -> TreeResult<i64> {
        Ok(self.lines)
    }
}
