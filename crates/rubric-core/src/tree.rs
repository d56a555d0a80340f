//! Arena snapshot of one group's assessment tree.
//!
//! Categories are addressed by [`CategoryId`] and stored in a flat vector;
//! parent and child links are vector indexes. The snapshot is read once per
//! operation and never borrowed across writes, so a mutation reloads it.
//!
//! Parent pointers that leave the group, dangle, or would close a cycle are
//! treated as roots.

use rusqlite::Connection;
use std::collections::{HashMap, HashSet};

use crate::db::query;
use crate::error::TreeResult;
use crate::model::{AutomationRule, Category, CategoryId, GroupId, Milestone};

/// One category with its attachments and arena links.
#[derive(Debug, Clone)]
pub struct CategoryNode {
    pub category: Category,
    pub rule: Option<AutomationRule>,
    pub milestone: Option<Milestone>,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl CategoryNode {
    #[must_use]
    pub const fn id(&self) -> CategoryId {
        self.category.id
    }
}

#[derive(Debug, Clone)]
pub struct CategoryTree {
    group: GroupId,
    nodes: Vec<CategoryNode>,
    index: HashMap<CategoryId, usize>,
}

impl CategoryTree {
    /// Read every category of `group` with its rule and milestone.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the underlying queries fail.
    pub fn load(conn: &Connection, group: GroupId) -> TreeResult<Self> {
        let categories = query::list_categories(conn, group)?;
        let rules = query::group_rules(conn, group)?;
        let milestones = query::group_milestones(conn, group)?;
        Ok(Self::from_parts(group, categories, &rules, milestones))
    }

    /// Build a snapshot from rows already in memory.
    #[must_use]
    pub fn from_parts(
        group: GroupId,
        categories: Vec<Category>,
        rules: &HashMap<CategoryId, AutomationRule>,
        milestones: Vec<Milestone>,
    ) -> Self {
        let mut by_category: HashMap<CategoryId, Milestone> = milestones
            .into_iter()
            .map(|milestone| (milestone.category_id, milestone))
            .collect();

        let index: HashMap<CategoryId, usize> = categories
            .iter()
            .enumerate()
            .map(|(idx, category)| (category.id, idx))
            .collect();

        let mut nodes: Vec<CategoryNode> = categories
            .into_iter()
            .map(|category| CategoryNode {
                rule: rules.get(&category.id).copied(),
                milestone: by_category.remove(&category.id),
                category,
                parent: None,
                children: Vec::new(),
            })
            .collect();

        for idx in 0..nodes.len() {
            let parent = nodes[idx]
                .category
                .parent_id
                .and_then(|parent_id| index.get(&parent_id).copied());
            nodes[idx].parent = parent;
        }

        // Break cycles left by hand-edited data: the lowest-index node on a
        // loop is detached and becomes a root.
        for start in 0..nodes.len() {
            let mut seen = HashSet::from([start]);
            let mut cursor = nodes[start].parent;
            while let Some(current) = cursor {
                if !seen.insert(current) {
                    if current == start {
                        tracing::warn!(
                            category = %nodes[start].category.id,
                            "category parent chain loops; treating it as a root"
                        );
                        nodes[start].parent = None;
                    }
                    break;
                }
                cursor = nodes[current].parent;
            }
        }

        for idx in 0..nodes.len() {
            if let Some(parent) = nodes[idx].parent {
                nodes[parent].children.push(idx);
            }
        }

        Self {
            group,
            nodes,
            index,
        }
    }

    #[must_use]
    pub const fn group(&self) -> GroupId {
        self.group
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: CategoryId) -> Option<&CategoryNode> {
        self.index.get(&id).map(|&idx| &self.nodes[idx])
    }

    #[must_use]
    pub fn contains(&self, id: CategoryId) -> bool {
        self.index.contains_key(&id)
    }

    #[must_use]
    pub fn parent(&self, id: CategoryId) -> Option<&CategoryNode> {
        let idx = *self.index.get(&id)?;
        self.nodes[idx].parent.map(|parent| &self.nodes[parent])
    }

    /// Direct children in id order.
    pub fn children(&self, id: CategoryId) -> impl Iterator<Item = &CategoryNode> + '_ {
        let children: &[usize] = self
            .index
            .get(&id)
            .map(|&idx| self.nodes[idx].children.as_slice())
            .unwrap_or_default();
        children.iter().map(|&child| &self.nodes[child])
    }

    pub fn roots(&self) -> impl Iterator<Item = &CategoryNode> + '_ {
        self.nodes.iter().filter(|node| node.parent.is_none())
    }

    /// Ancestors of `id`, nearest first, not including `id` itself.
    #[must_use]
    pub fn ancestors(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut out = Vec::new();
        let mut cursor = self.index.get(&id).and_then(|&idx| self.nodes[idx].parent);
        while let Some(idx) = cursor {
            out.push(self.nodes[idx].id());
            cursor = self.nodes[idx].parent;
        }
        out
    }

    /// `id` and all of its descendants in pre-order.
    #[must_use]
    pub fn subtree(&self, id: CategoryId) -> Vec<CategoryId> {
        let Some(&start) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            out.push(self.nodes[idx].id());
            stack.extend(self.nodes[idx].children.iter().rev());
        }
        out
    }

    /// True when `id` lies inside the subtree rooted at `root`.
    #[must_use]
    pub fn is_within(&self, id: CategoryId, root: CategoryId) -> bool {
        id == root || self.ancestors(id).contains(&root)
    }

    /// Milestone on `id` or, failing that, on its nearest ancestor.
    #[must_use]
    pub fn governing_milestone(&self, id: CategoryId) -> Option<&Milestone> {
        let mut cursor = self.index.get(&id).copied();
        while let Some(idx) = cursor {
            if let Some(milestone) = &self.nodes[idx].milestone {
                return Some(milestone);
            }
            cursor = self.nodes[idx].parent;
        }
        None
    }

    /// Every node paired with its depth, roots first, depth-first.
    #[must_use]
    pub fn depth_first(&self) -> Vec<(usize, &CategoryNode)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(idx, _)| (0, idx))
            .rev()
            .collect();
        while let Some((depth, idx)) = stack.pop() {
            out.push((depth, &self.nodes[idx]));
            stack.extend(
                self.nodes[idx]
                    .children
                    .iter()
                    .rev()
                    .map(|&child| (depth + 1, child)),
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssessmentType, AutomationKind, SubjectScope, Window};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn category(id: i64, parent: Option<i64>) -> Category {
        Category {
            id: CategoryId(id),
            group_id: GroupId(1),
            parent_id: parent.map(CategoryId),
            name: format!("c{id}"),
            description: None,
            total: Decimal::ONE,
            assessment_type: AssessmentType::Sum,
            scope: SubjectScope::User,
        }
    }

    fn milestone(category: i64, order_index: u32) -> Milestone {
        let start = Utc
            .with_ymd_and_hms(2024, 2, 1, 0, 0, 0)
            .single()
            .expect("start");
        let end = Utc
            .with_ymd_and_hms(2024, 2, 14, 0, 0, 0)
            .single()
            .expect("end");
        Milestone {
            category_id: CategoryId(category),
            group_id: GroupId(1),
            window: Window::new(start, end).expect("window"),
            order_index,
        }
    }

    //      1
    //    /   \
    //   2     3 (milestone)
    //  / \     \
    // 4   5     6 (rule)
    fn sample() -> CategoryTree {
        let categories = vec![
            category(1, None),
            category(2, Some(1)),
            category(3, Some(1)),
            category(4, Some(2)),
            category(5, Some(2)),
            category(6, Some(3)),
        ];
        let rules = HashMap::from([(
            CategoryId(6),
            AutomationRule::new(AutomationKind::TimeSpent, 4),
        )]);
        CategoryTree::from_parts(GroupId(1), categories, &rules, vec![milestone(3, 1)])
    }

    #[test]
    fn links_children_and_ancestors() {
        let tree = sample();
        assert_eq!(tree.len(), 6);
        let children: Vec<_> = tree.children(CategoryId(2)).map(CategoryNode::id).collect();
        assert_eq!(children, vec![CategoryId(4), CategoryId(5)]);
        assert_eq!(tree.ancestors(CategoryId(5)), vec![CategoryId(2), CategoryId(1)]);
        assert_eq!(tree.parent(CategoryId(1)).map(CategoryNode::id), None);
        assert!(tree.get(CategoryId(6)).and_then(|node| node.rule).is_some());
    }

    #[test]
    fn subtree_is_pre_order() {
        let tree = sample();
        assert_eq!(
            tree.subtree(CategoryId(1)),
            [1, 2, 4, 5, 3, 6].map(CategoryId).to_vec()
        );
        assert!(tree.is_within(CategoryId(6), CategoryId(3)));
        assert!(!tree.is_within(CategoryId(6), CategoryId(2)));
        assert!(tree.subtree(CategoryId(99)).is_empty());
    }

    #[test]
    fn governing_milestone_walks_up() {
        let tree = sample();
        assert_eq!(
            tree.governing_milestone(CategoryId(6)).map(|m| m.category_id),
            Some(CategoryId(3))
        );
        assert!(tree.governing_milestone(CategoryId(4)).is_none());
    }

    #[test]
    fn depth_first_reports_depths() {
        let tree = sample();
        let layout: Vec<(usize, i64)> = tree
            .depth_first()
            .into_iter()
            .map(|(depth, node)| (depth, node.id().0))
            .collect();
        assert_eq!(layout, vec![(0, 1), (1, 2), (2, 4), (2, 5), (1, 3), (2, 6)]);
    }

    #[test]
    fn parent_cycle_is_broken_into_a_root() {
        let categories = vec![category(1, Some(2)), category(2, Some(1))];
        let tree = CategoryTree::from_parts(GroupId(1), categories, &HashMap::new(), Vec::new());
        assert_eq!(tree.roots().count(), 1);
        assert_eq!(tree.depth_first().len(), 2);
    }

    #[test]
    fn node_hanging_off_a_cycle_keeps_its_parent() {
        let categories = vec![category(3, Some(1)), category(1, Some(2)), category(2, Some(1))];
        let tree = CategoryTree::from_parts(GroupId(1), categories, &HashMap::new(), Vec::new());
        assert_eq!(tree.parent(CategoryId(3)).map(CategoryNode::id), Some(CategoryId(1)));
        assert_eq!(tree.roots().count(), 1);
    }

    #[test]
    fn dangling_parent_becomes_root() {
        let categories = vec![category(7, Some(42))];
        let tree = CategoryTree::from_parts(GroupId(1), categories, &HashMap::new(), Vec::new());
        assert_eq!(tree.roots().count(), 1);
        assert!(tree.ancestors(CategoryId(7)).is_empty());
    }
}
