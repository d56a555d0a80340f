//! Scoring engine: aggregation, automation, propagation and tree mutations.
//!
//! [`Grader`] is the single entry point for writes. Every public method
//! runs inside one `SQLite` transaction on the borrowed connection, so a
//! failed validation or storage error leaves the store untouched.

pub mod aggregate;
pub mod automation;
mod mutate;
mod propagate;
pub mod signals;

pub use aggregate::{Aggregator, ChildScore, aggregate};
pub use automation::{Signal, automatic_value, clamped_ratio};
pub use signals::{FixedSignals, SignalSource, SqliteSignals};

use rand::{SeedableRng, rngs::StdRng};
use rusqlite::Connection;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::info;

use crate::config::ProjectConfig;
use crate::db::query;
use crate::error::{TreeError, TreeResult};
use crate::model::{CategoryId, EnrollmentId, ScoreKind, Subject, SubjectScope};
use crate::tree::CategoryTree;

/// Scoring engine bound to one store connection and one signal source.
pub struct Grader<'a> {
    conn: &'a Connection,
    signals: &'a dyn SignalSource,
    reroll_random: bool,
    decimals: u32,
    rng: StdRng,
}

impl<'a> Grader<'a> {
    pub fn new(conn: &'a Connection, signals: &'a dyn SignalSource) -> Self {
        let defaults = ProjectConfig::default();
        Self {
            conn,
            signals,
            reroll_random: defaults.automation.reroll_random,
            decimals: defaults.scoring.decimals,
            rng: StdRng::from_entropy(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: &ProjectConfig) -> Self {
        self.reroll_random = config.automation.reroll_random;
        self.decimals = config.scoring.decimals;
        self
    }

    /// Replace the random source, e.g. with a seeded one.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Record a manual score and propagate it upward.
    ///
    /// `enrollment` names the user; for a project-scoped category the
    /// enrollment's project is scored instead. Returns the subject written.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidAmount`] for a negative amount, a
    /// not-found error for an unknown category or enrollment, and
    /// [`TreeError::SubjectOutsideGroup`] when the enrollment belongs to a
    /// different group than the category.
    pub fn assess(
        &mut self,
        enrollment: EnrollmentId,
        category: CategoryId,
        amount: Decimal,
    ) -> TreeResult<Subject> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(TreeError::InvalidAmount(format!(
                "manual score {amount} is negative"
            )));
        }

        let tx = self.conn.unchecked_transaction()?;
        let category = query::require_category(self.conn, category)?;
        let member = query::get_enrollment(self.conn, enrollment)?
            .ok_or(TreeError::EnrollmentNotFound(enrollment))?;
        let project = query::get_project(self.conn, member.project_id)?
            .ok_or(TreeError::ProjectNotFound(member.project_id))?;
        if project.group_id != category.group_id {
            return Err(TreeError::SubjectOutsideGroup {
                enrollment,
                group: category.group_id,
            });
        }

        let subject = match category.scope {
            SubjectScope::User => member.subject(),
            SubjectScope::Project => Subject::Project(project.id),
        };
        let stored = self.write_score(category.id, subject, ScoreKind::Manual, amount)?;

        let tree = CategoryTree::load(self.conn, category.group_id)?;
        self.propagate_from(&tree, category.id, subject)?;
        tx.commit()?;

        info!(category = %category.id, %subject, value = %stored, "recorded manual score");
        Ok(subject)
    }

    /// Overwrite the `kind` row and drop stale placeholders.
    fn write_score(
        &self,
        category: CategoryId,
        subject: Subject,
        kind: ScoreKind,
        value: Decimal,
    ) -> TreeResult<Decimal> {
        let value =
            value.round_dp_with_strategy(self.decimals, RoundingStrategy::MidpointAwayFromZero);
        query::upsert_score(self.conn, category, subject, kind, value)?;
        query::delete_placeholders(self.conn, category, subject)?;
        Ok(value)
    }

    /// Subject to use for a category of scope `to`, starting from `subject`.
    ///
    /// A user enrollment crosses into its project. Nothing maps a project
    /// down to a single user, so that direction yields `None`.
    fn cross_scope(&self, subject: Subject, to: SubjectScope) -> TreeResult<Option<Subject>> {
        match (subject, to) {
            (subject, to) if subject.scope() == to => Ok(Some(subject)),
            (Subject::Enrollment(id), SubjectScope::Project) => {
                let member = query::get_enrollment(self.conn, id)?
                    .ok_or(TreeError::EnrollmentNotFound(id))?;
                Ok(Some(Subject::Project(member.project_id)))
            }
            _ => Ok(None),
        }
    }
}
