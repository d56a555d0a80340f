//! `rb category`: add, remove and copy categories of a group's tree.
//!
//! Every subcommand holds the owning group's tree lock for its whole run.

use clap::{Args, Subcommand};
use rubric_core::Grader;
use rubric_core::db::query;
use rubric_core::model::{
    AssessmentType, AutomationKind, AutomationRule, Category, CategoryDraft, CategoryId, Role,
    SubjectScope, Window,
};
use rubric_core::scoring::SqliteSignals;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;

use super::{Workspace, parse_instant, resolve_group, tree_failure};
use crate::output::{OutputMode, pretty_kv, render_mode};

// ---------------------------------------------------------------------------
// Clap types
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct CategoryArgs {
    #[command(subcommand)]
    pub command: CategoryCommand,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    #[command(
        about = "Add a category to a group's tree",
        after_help = "EXAMPLES:\n    # Root of the tree\n    rb category add 2024-fall \"Final grade\" --type sum --total 10\n\n    # Milestone scored from logged time\n    rb category add 2024-fall \"Sprint 1\" --parent 1 --type automatic \\\n        --automation time_spent --needed 20 --start 2024-09-01 --end 2024-09-14"
    )]
    Add(CategoryAddArgs),

    #[command(
        about = "Delete a category and its subtree",
        after_help = "EXAMPLES:\n    rb category rm 4 --role owner"
    )]
    Rm(CategoryRmArgs),

    #[command(
        about = "Copy a subtree under another category",
        after_help = "EXAMPLES:\n    rb category copy 3 --to 12"
    )]
    Copy(CategoryCopyArgs),
}

/// Arguments for `rb category add`.
#[derive(Args, Debug)]
pub struct CategoryAddArgs {
    /// Group name or id.
    pub group: String,

    /// Category name.
    pub name: String,

    /// Parent category id. Omit to create the group's root.
    #[arg(long)]
    pub parent: Option<i64>,

    /// Assessment type: custom, sum, max, min or automatic.
    #[arg(short = 't', long = "type", default_value = "sum")]
    pub assessment_type: AssessmentType,

    /// Points this category is worth.
    #[arg(long, default_value = "1")]
    pub total: Decimal,

    /// Scored per `user` enrollment or once per `project`.
    #[arg(long, default_value = "user")]
    pub scope: SubjectScope,

    /// Automation rule for automatic categories: random, time_spent or lines_changed.
    #[arg(long)]
    pub automation: Option<AutomationKind>,

    /// Hours (time_spent) or net lines (lines_changed) for full marks.
    #[arg(long, default_value_t = 0)]
    pub needed: i64,

    /// Milestone window start (RFC 3339 or YYYY-MM-DD).
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// Milestone window end, inclusive (RFC 3339 or YYYY-MM-DD).
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Description text.
    #[arg(short, long)]
    pub description: Option<String>,
}

/// Arguments for `rb category rm`.
#[derive(Args, Debug)]
pub struct CategoryRmArgs {
    /// Category id.
    pub id: i64,

    /// Caller's role in the group; only owners may delete.
    #[arg(long)]
    pub role: Role,
}

/// Arguments for `rb category copy`.
#[derive(Args, Debug)]
pub struct CategoryCopyArgs {
    /// Root of the subtree to copy.
    pub source: i64,

    /// Category that receives the copy.
    #[arg(long = "to", value_name = "PARENT")]
    pub target: i64,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CategoryOutput {
    ok: bool,
    category: Category,
    automation: Option<AutomationRule>,
    milestone: Option<u32>,
}

#[derive(Debug, Serialize)]
struct RemovedOutput {
    ok: bool,
    removed: Vec<CategoryId>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_draft(args: &CategoryAddArgs, output: OutputMode) -> anyhow::Result<CategoryDraft> {
    let mut draft = CategoryDraft::new(&args.name, args.assessment_type)
        .total(args.total)
        .scope(args.scope);
    if let Some(description) = &args.description {
        draft = draft.description(description);
    }
    if let Some(kind) = args.automation {
        draft = draft.automation(AutomationRule::new(kind, args.needed));
    }
    if let (Some(start), Some(end)) = (&args.start, &args.end) {
        let window = Window::new(parse_instant(start, false)?, parse_instant(end, true)?)
            .map_err(|err| tree_failure(output, err))?;
        draft = draft.window(window);
    }
    Ok(draft)
}

fn render_category(
    workspace: &Workspace,
    category: Category,
    output: OutputMode,
) -> anyhow::Result<()> {
    let automation = query::group_rules(&workspace.conn, category.group_id)
        .map_err(|err| tree_failure(output, err))?
        .remove(&category.id);
    let milestone = query::group_milestones(&workspace.conn, category.group_id)
        .map_err(|err| tree_failure(output, err))?
        .into_iter()
        .find(|milestone| milestone.category_id == category.id)
        .map(|milestone| milestone.order_index);

    let result = CategoryOutput {
        ok: true,
        category,
        automation,
        milestone,
    };
    render_mode(
        output,
        &result,
        |r, w| {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}",
                r.category.id,
                r.category.name,
                r.category.assessment_type,
                r.category.total,
                r.category.scope
            )
        },
        |r, w| {
            writeln!(w, "✓ Category {} ({})", r.category.name, r.category.id)?;
            pretty_kv(w, "type", r.category.assessment_type.as_str())?;
            pretty_kv(w, "total", r.category.total.to_string())?;
            pretty_kv(w, "scope", r.category.scope.as_str())?;
            if let Some(parent) = r.category.parent_id {
                pretty_kv(w, "parent", parent.to_string())?;
            }
            if let Some(rule) = r.automation {
                pretty_kv(w, "automation", format!("{} / {}", rule.kind, rule.amount_needed))?;
            }
            if let Some(order) = r.milestone {
                pretty_kv(w, "milestone", format!("#{order}"))?;
            }
            Ok(())
        },
    )
}

fn category_group(
    workspace: &Workspace,
    id: CategoryId,
    output: OutputMode,
) -> anyhow::Result<rubric_core::model::GroupId> {
    query::require_category(&workspace.conn, id)
        .map(|category| category.group_id)
        .map_err(|err| tree_failure(output, err))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub fn run_category(
    args: &CategoryArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let workspace = Workspace::open(project_root, output)?;
    match &args.command {
        CategoryCommand::Add(add) => run_add(&workspace, add, output),
        CategoryCommand::Rm(rm) => run_rm(&workspace, rm, output),
        CategoryCommand::Copy(copy) => run_copy(&workspace, copy, output),
    }
}

fn run_add(workspace: &Workspace, args: &CategoryAddArgs, output: OutputMode) -> anyhow::Result<()> {
    let draft = build_draft(args, output)?;
    let group = resolve_group(&workspace.conn, &args.group, output)?;
    let _lock = workspace.lock(group.id, output)?;

    let signals = SqliteSignals::new(&workspace.conn);
    let mut grader = Grader::new(&workspace.conn, &signals).with_config(&workspace.config);
    let category = grader
        .create_category(group.id, args.parent.map(CategoryId), &draft)
        .map_err(|err| tree_failure(output, err))?;
    render_category(workspace, category, output)
}

fn run_rm(workspace: &Workspace, args: &CategoryRmArgs, output: OutputMode) -> anyhow::Result<()> {
    let id = CategoryId(args.id);
    let group = category_group(workspace, id, output)?;
    let _lock = workspace.lock(group, output)?;

    let signals = SqliteSignals::new(&workspace.conn);
    let mut grader = Grader::new(&workspace.conn, &signals).with_config(&workspace.config);
    let removed = grader
        .delete_category(id, args.role)
        .map_err(|err| tree_failure(output, err))?;

    let result = RemovedOutput { ok: true, removed };
    render_mode(
        output,
        &result,
        |r, w| {
            for id in &r.removed {
                writeln!(w, "{id}")?;
            }
            Ok(())
        },
        |r, w| writeln!(w, "✓ Removed {} categor{}", r.removed.len(), plural(r.removed.len())),
    )
}

fn run_copy(workspace: &Workspace, args: &CategoryCopyArgs, output: OutputMode) -> anyhow::Result<()> {
    let source = CategoryId(args.source);
    let target = CategoryId(args.target);
    let source_group = category_group(workspace, source, output)?;
    let target_group = category_group(workspace, target, output)?;

    let _lock = workspace.lock(target_group, output)?;
    let _source_lock = if source_group == target_group {
        None
    } else {
        Some(workspace.read_lock(source_group, output)?)
    };

    let signals = SqliteSignals::new(&workspace.conn);
    let mut grader = Grader::new(&workspace.conn, &signals).with_config(&workspace.config);
    let copy = grader
        .copy_subtree(source, target)
        .map_err(|err| tree_failure(output, err))?;
    render_category(workspace, copy, output)
}

const fn plural(count: usize) -> &'static str {
    if count == 1 { "y" } else { "ies" }
}
