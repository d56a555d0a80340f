//! `rb tree`: show a group's category tree, optionally with one subject's scores.

use clap::Args;
use rubric_core::CategoryTree;
use rubric_core::TreeError;
use rubric_core::db::query;
use rubric_core::model::{
    AssessmentType, CategoryId, ScoreKind, Subject, SubjectScope,
};
use rubric_core::tree::CategoryNode;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use super::{Workspace, parse_subject, resolve_group, tree_failure};
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Group name or id.
    pub group: String,

    /// Show the chosen score of `enrollment:<id>` or `project:<id>` per node.
    #[arg(long)]
    pub subject: Option<String>,
}

#[derive(Debug, Serialize)]
struct TreeRow {
    depth: usize,
    id: CategoryId,
    name: String,
    assessment_type: AssessmentType,
    total: Decimal,
    scope: SubjectScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    automation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    milestone: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_kind: Option<ScoreKind>,
}

/// Subjects a node is scored for, by scope.
#[derive(Debug, Clone, Copy)]
struct SubjectView {
    user: Option<Subject>,
    project: Subject,
}

impl SubjectView {
    const fn for_scope(self, scope: SubjectScope) -> Option<Subject> {
        match scope {
            SubjectScope::User => self.user,
            SubjectScope::Project => Some(self.project),
        }
    }
}

fn subject_view(workspace: &Workspace, subject: Subject) -> Result<SubjectView, TreeError> {
    match subject {
        Subject::Enrollment(id) => {
            let member = query::get_enrollment(&workspace.conn, id)?
                .ok_or(TreeError::EnrollmentNotFound(id))?;
            Ok(SubjectView {
                user: Some(subject),
                project: Subject::Project(member.project_id),
            })
        }
        Subject::Project(id) => {
            query::get_project(&workspace.conn, id)?.ok_or(TreeError::ProjectNotFound(id))?;
            Ok(SubjectView {
                user: None,
                project: subject,
            })
        }
    }
}

fn build_rows(
    workspace: &Workspace,
    tree: &CategoryTree,
    view: Option<SubjectView>,
) -> Result<Vec<TreeRow>, TreeError> {
    tree.depth_first()
        .into_iter()
        .map(|(depth, node)| {
            let card = match view.and_then(|view| view.for_scope(node.category.scope)) {
                Some(subject) => Some(query::score_card(&workspace.conn, node.id(), subject)?),
                None => None,
            };
            Ok(row_for(depth, node, card))
        })
        .collect()
}

fn row_for(
    depth: usize,
    node: &CategoryNode,
    card: Option<rubric_core::model::ScoreCard>,
) -> TreeRow {
    TreeRow {
        depth,
        id: node.id(),
        name: node.category.name.clone(),
        assessment_type: node.category.assessment_type,
        total: node.category.total,
        scope: node.category.scope,
        automation: node
            .rule
            .map(|rule| format!("{}/{}", rule.kind, rule.amount_needed)),
        milestone: node.milestone.map(|milestone| milestone.order_index),
        score: card.map(|card| card.chosen()),
        score_kind: card.and_then(|card| card.chosen_kind()),
    }
}

fn write_text(rows: &[TreeRow], w: &mut dyn Write) -> std::io::Result<()> {
    for row in rows {
        write!(
            w,
            "{}{}\t{}\t{}\t{}\t{}",
            "  ".repeat(row.depth),
            row.id,
            row.name,
            row.assessment_type,
            row.total,
            row.scope
        )?;
        if let Some(score) = row.score {
            write!(w, "\t{score}")?;
        }
        writeln!(w)?;
    }
    Ok(())
}

fn write_pretty(rows: &[TreeRow], w: &mut dyn Write) -> std::io::Result<()> {
    if rows.is_empty() {
        return writeln!(w, "Empty tree. Add a root with `rb category add <group> <name>`.");
    }
    pretty_section(w, "Assessment tree")?;
    for row in rows {
        let indent = "  ".repeat(row.depth);
        let mut tags = vec![row.assessment_type.to_string(), row.scope.to_string()];
        if let Some(rule) = &row.automation {
            tags.push(rule.clone());
        }
        if let Some(order) = row.milestone {
            tags.push(format!("milestone #{order}"));
        }
        let score = row.score.map_or_else(String::new, |score| {
            let kind = row.score_kind.map_or("", ScoreKind::as_str);
            format!("  {score}/{} {kind}", row.total)
        });
        writeln!(
            w,
            "{indent}[{}] {} ({} pts; {}){score}",
            row.id,
            row.name,
            row.total,
            tags.join(", ")
        )?;
    }
    Ok(())
}

pub fn run_tree(args: &TreeArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let workspace = Workspace::open(project_root, output)?;
    let group = resolve_group(&workspace.conn, &args.group, output)?;
    let _lock = workspace.read_lock(group.id, output)?;

    let view = match &args.subject {
        Some(raw) => Some(
            subject_view(&workspace, parse_subject(raw)?).map_err(|err| tree_failure(output, err))?,
        ),
        None => None,
    };
    let tree = CategoryTree::load(&workspace.conn, group.id).map_err(|err| tree_failure(output, err))?;
    let rows = build_rows(&workspace, &tree, view).map_err(|err| tree_failure(output, err))?;

    render_mode(
        output,
        &rows,
        |rows, w| write_text(rows, w),
        |rows, w| write_pretty(rows, w),
    )
}
