use tracing::{debug, info};

use super::Grader;
use crate::db::query;
use crate::error::{TreeError, TreeResult};
use crate::model::{
    AssessmentType, Category, CategoryDraft, CategoryId, EnrollmentId, GroupId, Milestone,
    ProjectId, Role, Subject, SubjectScope, UserId, Window,
};
use crate::tree::CategoryTree;

/// Reject drafts that could never be scored.
fn validate_draft(draft: &CategoryDraft) -> TreeResult<()> {
    if draft.total.is_sign_negative() && !draft.total.is_zero() {
        return Err(TreeError::InvalidAmount(format!(
            "category total {} is negative",
            draft.total
        )));
    }
    match (draft.assessment_type, draft.automation) {
        (AssessmentType::Automatic, None) => {
            Err(TreeError::MissingAutomationRule(draft.name.clone()))
        }
        (AssessmentType::Automatic, Some(rule)) if !rule.is_valid() => {
            Err(TreeError::InvalidAmount(format!(
                "{} automation needs a positive amount, got {}",
                rule.kind, rule.amount_needed
            )))
        }
        (AssessmentType::Automatic, Some(_)) | (_, None) => Ok(()),
        (_, Some(_)) => Err(TreeError::UnexpectedAutomationRule(draft.name.clone())),
    }
}

impl Grader<'_> {
    /// Add a category under `parent`, or as the group's root when `parent`
    /// is `None`.
    ///
    /// Every subject already in the group gets a zero placeholder. A window
    /// becomes a milestone only when no ancestor carries one.
    ///
    /// # Errors
    ///
    /// Validation errors ([`TreeError::ScopeMismatch`],
    /// [`TreeError::MissingAutomationRule`],
    /// [`TreeError::UnexpectedAutomationRule`],
    /// [`TreeError::InvalidAmount`], [`TreeError::RootAlreadyExists`]) are
    /// returned before anything is written.
    pub fn create_category(
        &mut self,
        group: GroupId,
        parent: Option<CategoryId>,
        draft: &CategoryDraft,
    ) -> TreeResult<Category> {
        validate_draft(draft)?;

        let tx = self.conn.unchecked_transaction()?;
        let calculation =
            query::get_group(self.conn, group)?.ok_or(TreeError::GroupNotFound(group))?;
        let tree = CategoryTree::load(self.conn, group)?;

        match parent {
            Some(parent_id) => {
                let parent_node = tree
                    .get(parent_id)
                    .ok_or(TreeError::CategoryNotFound(parent_id))?;
                if !parent_node.category.scope.admits_child(draft.scope) {
                    return Err(TreeError::ScopeMismatch {
                        parent_id,
                        parent: parent_node.category.scope,
                        child: draft.scope,
                    });
                }
            }
            None => {
                if let Some(root) = calculation.root {
                    return Err(TreeError::RootAlreadyExists { group, root });
                }
            }
        }

        let id = query::insert_category(self.conn, group, parent, draft)?;
        if parent.is_none() {
            query::set_root(self.conn, group, Some(id))?;
        }
        if let Some(rule) = draft.automation {
            query::upsert_rule(self.conn, id, rule)?;
        }
        if let Some(window) = draft.window {
            match parent.and_then(|parent_id| tree.governing_milestone(parent_id)) {
                Some(inherited) => debug!(
                    category = %id,
                    governed_by = %inherited.category_id,
                    "ancestor already carries a milestone; window ignored"
                ),
                None => {
                    self.append_milestone(group, id, window)?;
                }
            }
        }

        let tree = CategoryTree::load(self.conn, group)?;
        let seeded = self.seed_for_group(&tree, id)?;
        if let Some(parent_id) = parent {
            self.refresh_scored(&tree, parent_id, false)?;
        }
        let category = query::require_category(self.conn, id)?;
        tx.commit()?;

        info!(category = %id, %group, seeded, "created category");
        Ok(category)
    }

    /// Delete a category and its whole subtree.
    ///
    /// Milestones inside the subtree are removed and the group sequence is
    /// compacted; the former parent is then recalculated top-down. Returns
    /// the removed ids, parents before children.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PermissionDenied`] unless `role` is
    /// [`Role::Owner`], and [`TreeError::CategoryNotFound`] for an unknown
    /// category.
    pub fn delete_category(
        &mut self,
        category: CategoryId,
        role: Role,
    ) -> TreeResult<Vec<CategoryId>> {
        if !role.has_rights(Role::Owner) {
            return Err(TreeError::PermissionDenied(format!(
                "deleting category {category} requires owner, caller is {role}"
            )));
        }

        let tx = self.conn.unchecked_transaction()?;
        let target = query::require_category(self.conn, category)?;
        let group = target.group_id;
        let calculation =
            query::get_group(self.conn, group)?.ok_or(TreeError::GroupNotFound(group))?;
        let tree = CategoryTree::load(self.conn, group)?;

        let doomed = tree.subtree(category);
        let mut removed_orders: Vec<u32> = doomed
            .iter()
            .filter_map(|id| tree.get(*id).and_then(|node| node.milestone))
            .map(|milestone| milestone.order_index)
            .collect();
        removed_orders.sort_unstable_by(|a, b| b.cmp(a));

        for id in doomed.iter().rev() {
            query::delete_category_row(self.conn, *id)?;
        }
        for order in &removed_orders {
            query::close_milestone_gap(self.conn, group, *order)?;
        }
        if !removed_orders.is_empty() {
            let removed = u32::try_from(removed_orders.len()).unwrap_or(u32::MAX);
            query::set_milestone_seq(
                self.conn,
                group,
                calculation.milestone_seq.saturating_sub(removed),
            )?;
        }

        if let Some(parent_id) = target.parent_id.filter(|id| tree.contains(*id)) {
            let tree = CategoryTree::load(self.conn, group)?;
            self.refresh_scored(&tree, parent_id, true)?;
        }
        tx.commit()?;

        info!(
            %category,
            %group,
            removed = doomed.len(),
            milestones = removed_orders.len(),
            "deleted category subtree"
        );
        Ok(doomed)
    }

    /// Deep-copy `source` and its descendants under `target_parent`.
    ///
    /// Totals, types, scopes, names, descriptions, automation rules and
    /// milestones are carried; copied milestones are appended to the target
    /// group's sequence in pre-order.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::CopyIntoSelf`] when `target_parent` lies inside
    /// the copied subtree and [`TreeError::ScopeMismatch`] when the copy
    /// would put a user-scoped category under a project-scoped parent.
    pub fn copy_subtree(
        &mut self,
        source: CategoryId,
        target_parent: CategoryId,
    ) -> TreeResult<Category> {
        let tx = self.conn.unchecked_transaction()?;
        let origin = query::require_category(self.conn, source)?;
        let target = query::require_category(self.conn, target_parent)?;
        let source_tree = CategoryTree::load(self.conn, origin.group_id)?;

        if origin.group_id == target.group_id && source_tree.is_within(target_parent, source) {
            return Err(TreeError::CopyIntoSelf {
                source_id: source,
                target: target_parent,
            });
        }
        if !target.scope.admits_child(origin.scope) {
            return Err(TreeError::ScopeMismatch {
                parent_id: target.id,
                parent: target.scope,
                child: origin.scope,
            });
        }

        let copy = self.copy_node(&source_tree, source, target.group_id, target.id)?;

        let target_tree = CategoryTree::load(self.conn, target.group_id)?;
        let seeded = self.seed_for_group(&target_tree, copy)?;
        self.refresh_scored(&target_tree, target.id, false)?;
        let category = query::require_category(self.conn, copy)?;
        tx.commit()?;

        info!(%source, %copy, parent = %target.id, seeded, "copied category subtree");
        Ok(category)
    }

    /// Add a project to a group and seed its project-scoped categories.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::GroupNotFound`] for an unknown group.
    pub fn add_project(&mut self, group: GroupId, name: &str) -> TreeResult<ProjectId> {
        let tx = self.conn.unchecked_transaction()?;
        query::get_group(self.conn, group)?.ok_or(TreeError::GroupNotFound(group))?;
        let project = query::insert_project(self.conn, group, name)?;

        let tree = CategoryTree::load(self.conn, group)?;
        let mut seeded = 0;
        for (_, node) in tree.depth_first() {
            if node.category.scope == SubjectScope::Project
                && query::seed_placeholder(self.conn, node.id(), Subject::Project(project))?
            {
                seeded += 1;
            }
        }
        tx.commit()?;

        info!(%project, %group, seeded, "added project");
        Ok(project)
    }

    /// Enroll a user in a project and seed the whole group tree for them.
    ///
    /// Enrolling twice returns the existing enrollment.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::UserNotFound`] or [`TreeError::ProjectNotFound`]
    /// for unknown ids.
    pub fn enroll(
        &mut self,
        user: UserId,
        project: ProjectId,
        role: Role,
    ) -> TreeResult<EnrollmentId> {
        let tx = self.conn.unchecked_transaction()?;
        query::get_user(self.conn, user)?.ok_or_else(|| TreeError::UserNotFound(user.to_string()))?;
        let project_row =
            query::get_project(self.conn, project)?.ok_or(TreeError::ProjectNotFound(project))?;

        let enrollment = match query::find_enrollment(self.conn, user, project)? {
            Some(existing) => {
                debug!(enrollment = %existing.id, "user already enrolled");
                existing.id
            }
            None => query::insert_enrollment(self.conn, user, project, role)?,
        };

        let tree = CategoryTree::load(self.conn, project_row.group_id)?;
        let mut seeded = 0;
        for root in tree.roots() {
            let subject = match root.category.scope {
                SubjectScope::User => Subject::Enrollment(enrollment),
                SubjectScope::Project => Subject::Project(project),
            };
            seeded += self.seed_subtree(&tree, root.id(), subject)?;
        }
        tx.commit()?;

        info!(%enrollment, %user, %project, %role, seeded, "enrolled user");
        Ok(enrollment)
    }

    fn append_milestone(
        &self,
        group: GroupId,
        category: CategoryId,
        window: Window,
    ) -> TreeResult<u32> {
        let calculation =
            query::get_group(self.conn, group)?.ok_or(TreeError::GroupNotFound(group))?;
        let order_index = calculation.milestone_seq + 1;
        query::insert_milestone(
            self.conn,
            &Milestone {
                category_id: category,
                group_id: group,
                window,
                order_index,
            },
        )?;
        query::set_milestone_seq(self.conn, group, order_index)?;
        debug!(%category, %group, order_index, "attached milestone");
        Ok(order_index)
    }

    fn copy_node(
        &self,
        tree: &CategoryTree,
        source: CategoryId,
        group: GroupId,
        parent: CategoryId,
    ) -> TreeResult<CategoryId> {
        let node = tree.get(source).ok_or(TreeError::CategoryNotFound(source))?;
        let category = &node.category;
        let draft = CategoryDraft {
            name: category.name.clone(),
            description: category.description.clone(),
            total: category.total,
            assessment_type: category.assessment_type,
            scope: category.scope,
            automation: node
                .rule
                .filter(|_| category.assessment_type == AssessmentType::Automatic),
            window: None,
        };

        let copy = query::insert_category(self.conn, group, Some(parent), &draft)?;
        if let Some(rule) = draft.automation {
            query::upsert_rule(self.conn, copy, rule)?;
        }
        if let Some(milestone) = node.milestone {
            self.append_milestone(group, copy, milestone.window)?;
        }
        for child in tree.children(source) {
            self.copy_node(tree, child.id(), group, copy)?;
        }
        Ok(copy)
    }

    /// Seed the subtree at `category` for every subject of its scope in the
    /// tree's group.
    fn seed_for_group(&self, tree: &CategoryTree, category: CategoryId) -> TreeResult<usize> {
        let node = tree
            .get(category)
            .ok_or(TreeError::CategoryNotFound(category))?;
        let subjects: Vec<Subject> = match node.category.scope {
            SubjectScope::User => query::group_enrollments(self.conn, tree.group())?
                .iter()
                .map(|member| member.subject())
                .collect(),
            SubjectScope::Project => query::list_projects(self.conn, tree.group())?
                .iter()
                .map(|project| Subject::Project(project.id))
                .collect(),
        };

        let mut seeded = 0;
        for subject in subjects {
            seeded += self.seed_subtree(tree, category, subject)?;
        }
        Ok(seeded)
    }

    /// Zero placeholders for `subject` on `category` and everything below,
    /// crossing into the project for project-scoped descendants.
    fn seed_subtree(
        &self,
        tree: &CategoryTree,
        category: CategoryId,
        subject: Subject,
    ) -> TreeResult<usize> {
        let mut seeded = usize::from(query::seed_placeholder(self.conn, category, subject)?);
        for child in tree.children(category) {
            if let Some(child_subject) = self.cross_scope(subject, child.category.scope)? {
                seeded += self.seed_subtree(tree, child.id(), child_subject)?;
            }
        }
        Ok(seeded)
    }

    /// Recompute `category` for every subject scored on it and propagate.
    /// `deep` recomputes its whole subtree first.
    fn refresh_scored(
        &mut self,
        tree: &CategoryTree,
        category: CategoryId,
        deep: bool,
    ) -> TreeResult<()> {
        for subject in query::scored_subjects(self.conn, category)? {
            if deep {
                self.recalculate_subtree(tree, category, subject)?;
            } else {
                self.refresh(tree, category, subject)?;
            }
            self.propagate_from(tree, category, subject)?;
        }
        Ok(())
    }
}
