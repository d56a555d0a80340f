use tracing::{debug, warn};

use super::aggregate::{Aggregator, ChildScore, aggregate};
use super::automation::{self, Signal, automatic_value};
use super::Grader;
use crate::db::query;
use crate::error::{TreeError, TreeResult};
use crate::model::{
    AssessmentType, AutomationKind, CategoryId, ScoreKind, Subject, SubjectScope,
};
use crate::tree::{CategoryNode, CategoryTree};

impl Grader<'_> {
    /// Recompute the subtree under `category` for every subject that holds
    /// a score on it, then carry the result up to the root.
    ///
    /// Returns the number of subjects recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::CategoryNotFound`] for an unknown category and
    /// propagates storage or signal failures.
    pub fn recalculate(&mut self, category: CategoryId) -> TreeResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let target = query::require_category(self.conn, category)?;
        let tree = CategoryTree::load(self.conn, target.group_id)?;
        let subjects = query::scored_subjects(self.conn, category)?;
        for &subject in &subjects {
            self.recalculate_subtree(&tree, category, subject)?;
            self.propagate_from(&tree, category, subject)?;
        }
        tx.commit()?;
        debug!(%category, subjects = subjects.len(), "recalculated subtree");
        Ok(subjects.len())
    }

    /// Recompute the subtree under `category` for one subject.
    ///
    /// An enrollment given for a project-scoped category is crossed into
    /// its project.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::ScopeMismatch`] when a project subject is given
    /// for a user-scoped category.
    pub fn recalculate_for(&mut self, category: CategoryId, subject: Subject) -> TreeResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let target = query::require_category(self.conn, category)?;
        let subject =
            self.cross_scope(subject, target.scope)?
                .ok_or(TreeError::ScopeMismatch {
                    parent_id: category,
                    parent: target.scope,
                    child: subject.scope(),
                })?;
        let tree = CategoryTree::load(self.conn, target.group_id)?;
        self.recalculate_subtree(&tree, category, subject)?;
        self.propagate_from(&tree, category, subject)?;
        tx.commit()?;
        Ok(())
    }

    /// Carry a changed score on `category` up through its ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::CategoryNotFound`] for an unknown category.
    pub fn propagate_up(&mut self, subject: Subject, category: CategoryId) -> TreeResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let target = query::require_category(self.conn, category)?;
        let tree = CategoryTree::load(self.conn, target.group_id)?;
        self.propagate_from(&tree, category, subject)?;
        tx.commit()?;
        Ok(())
    }

    /// Post-order recompute: children first, then `category` itself.
    pub(super) fn recalculate_subtree(
        &mut self,
        tree: &CategoryTree,
        category: CategoryId,
        subject: Subject,
    ) -> TreeResult<()> {
        for child in tree.children(category) {
            match self.cross_scope(subject, child.category.scope)? {
                Some(child_subject) => {
                    self.recalculate_subtree(tree, child.id(), child_subject)?;
                }
                None => warn!(
                    child = %child.id(),
                    %subject,
                    "user-scoped category under a project subject; skipping"
                ),
            }
        }
        self.refresh(tree, category, subject)
    }

    /// Walk up from `category`, refreshing each aggregating parent until a
    /// manual override, a non-aggregating parent, or the root.
    pub(super) fn propagate_from(
        &mut self,
        tree: &CategoryTree,
        category: CategoryId,
        subject: Subject,
    ) -> TreeResult<()> {
        if !tree.contains(category) {
            return Err(TreeError::CategoryNotFound(category));
        }
        let Some(parent) = tree.parent(category) else {
            return Ok(());
        };
        if Aggregator::for_type(parent.category.assessment_type).is_none() {
            debug!(parent = %parent.id(), "parent does not aggregate; stopping");
            return Ok(());
        }

        let parent_subjects = match (parent.category.scope, subject) {
            (scope, subject) if scope == subject.scope() => vec![subject],
            (SubjectScope::User, Subject::Project(project)) => {
                query::project_enrollments(self.conn, project, false)?
                    .iter()
                    .map(|member| member.subject())
                    .collect()
            }
            _ => {
                warn!(
                    parent = %parent.id(),
                    %subject,
                    "cannot carry a user score into a project-scoped parent"
                );
                return Ok(());
            }
        };

        for parent_subject in parent_subjects {
            self.refresh(tree, parent.id(), parent_subject)?;
            if query::score_card(self.conn, parent.id(), parent_subject)?
                .manual
                .is_some()
            {
                debug!(parent = %parent.id(), subject = %parent_subject, "manual override; stopping");
                continue;
            }
            self.propagate_from(tree, parent.id(), parent_subject)?;
        }
        Ok(())
    }

    /// Recompute one category's automatic value for one subject.
    pub(super) fn refresh(
        &mut self,
        tree: &CategoryTree,
        category: CategoryId,
        subject: Subject,
    ) -> TreeResult<()> {
        let node = tree
            .get(category)
            .ok_or(TreeError::CategoryNotFound(category))?;

        if node.category.assessment_type == AssessmentType::Automatic {
            return self.refresh_automatic(tree, node, subject);
        }
        let Some(aggregator) = Aggregator::for_type(node.category.assessment_type) else {
            return Ok(());
        };

        let mut children = Vec::new();
        for child in tree.children(category) {
            let Some(child_subject) = self.cross_scope(subject, child.category.scope)? else {
                continue;
            };
            let card = query::score_card(self.conn, child.id(), child_subject)?;
            children.push(ChildScore {
                total: child.category.total,
                chosen: card.chosen(),
            });
        }

        let value = aggregate(aggregator, node.category.total, &children);
        let stored = self.write_score(category, subject, ScoreKind::Automatic, value)?;
        debug!(%category, %subject, value = %stored, "aggregated category");
        Ok(())
    }

    fn refresh_automatic(
        &mut self,
        tree: &CategoryTree,
        node: &CategoryNode,
        subject: Subject,
    ) -> TreeResult<()> {
        let Some(rule) = node.rule else {
            debug!(category = %node.id(), "automatic category has no rule; skipping");
            return Ok(());
        };

        let signal = match rule.kind {
            AutomationKind::Random => {
                if !self.reroll_random
                    && query::score_card(self.conn, node.id(), subject)?
                        .automatic
                        .is_some()
                {
                    debug!(category = %node.id(), %subject, "keeping earlier random roll");
                    return Ok(());
                }
                Signal::Roll(automation::roll(&mut self.rng))
            }
            AutomationKind::TimeSpent | AutomationKind::LinesChanged => {
                let Some(milestone) = tree.governing_milestone(node.id()) else {
                    warn!(
                        category = %node.id(),
                        kind = %rule.kind,
                        "no milestone governs this category; automation skipped"
                    );
                    return Ok(());
                };
                if rule.kind == AutomationKind::TimeSpent {
                    Signal::Minutes(self.signals.minutes_logged(subject, milestone)?)
                } else {
                    Signal::NetLines(self.signals.net_lines(subject, milestone)?)
                }
            }
        };

        let value = automatic_value(&rule, node.category.total, signal);
        let stored = self.write_score(node.id(), subject, ScoreKind::Automatic, value)?;
        debug!(category = %node.id(), %subject, kind = %rule.kind, value = %stored, "automated category");
        Ok(())
    }
}
