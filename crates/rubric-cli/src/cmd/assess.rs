//! `rb assess` and `rb recalc`: write scores and re-derive aggregates.

use clap::Args;
use rubric_core::Grader;
use rubric_core::db::query;
use rubric_core::model::{CategoryId, EnrollmentId, ScoreCard, Subject};
use rubric_core::scoring::SqliteSignals;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;

use super::{Workspace, parse_subject, tree_failure};
use crate::output::{OutputMode, pretty_kv, render_mode};

/// Arguments for `rb assess`.
#[derive(Args, Debug)]
pub struct AssessArgs {
    /// Enrollment id of the assessed user. Project-scoped categories score
    /// the enrollment's project.
    pub enrollment: i64,

    /// Category id.
    pub category: i64,

    /// Manual score, e.g. 7.5.
    #[arg(allow_negative_numbers = true)]
    pub amount: Decimal,
}

/// Arguments for `rb recalc`.
#[derive(Args, Debug)]
pub struct RecalcArgs {
    /// Category id; its subtree is recalculated and the result propagated up.
    pub category: i64,

    /// Limit to one subject (`enrollment:<id>` or `project:<id>`).
    #[arg(long)]
    pub subject: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssessOutput {
    ok: bool,
    category: CategoryId,
    subject: Subject,
    card: ScoreCard,
    chosen: Decimal,
}

#[derive(Debug, Serialize)]
struct RecalcOutput {
    ok: bool,
    category: CategoryId,
    subjects: usize,
}

pub fn run_assess(args: &AssessArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let workspace = Workspace::open(project_root, output)?;
    let category = CategoryId(args.category);
    let group = query::require_category(&workspace.conn, category)
        .map(|row| row.group_id)
        .map_err(|err| tree_failure(output, err))?;
    let _lock = workspace.lock(group, output)?;

    let signals = SqliteSignals::new(&workspace.conn);
    let mut grader = Grader::new(&workspace.conn, &signals).with_config(&workspace.config);
    let subject = grader
        .assess(EnrollmentId(args.enrollment), category, args.amount)
        .map_err(|err| tree_failure(output, err))?;
    let card = query::score_card(&workspace.conn, category, subject)
        .map_err(|err| tree_failure(output, err))?;

    let result = AssessOutput {
        ok: true,
        category,
        subject,
        card,
        chosen: card.chosen(),
    };
    render_mode(
        output,
        &result,
        |r, w| writeln!(w, "{}\t{}\t{}", r.category, r.subject, r.chosen),
        |r, w| {
            writeln!(w, "✓ Assessed {} on category {}", r.subject, r.category)?;
            pretty_kv(w, "manual", optional(r.card.manual))?;
            pretty_kv(w, "automatic", optional(r.card.automatic))?;
            pretty_kv(w, "chosen", r.chosen.to_string())
        },
    )
}

pub fn run_recalc(args: &RecalcArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let subject = args.subject.as_deref().map(parse_subject).transpose()?;
    let workspace = Workspace::open(project_root, output)?;
    let category = CategoryId(args.category);
    let group = query::require_category(&workspace.conn, category)
        .map(|row| row.group_id)
        .map_err(|err| tree_failure(output, err))?;
    let _lock = workspace.lock(group, output)?;

    let signals = SqliteSignals::new(&workspace.conn);
    let mut grader = Grader::new(&workspace.conn, &signals).with_config(&workspace.config);
    let subjects = match subject {
        Some(subject) => grader.recalculate_for(category, subject).map(|()| 1),
        None => grader.recalculate(category),
    }
    .map_err(|err| tree_failure(output, err))?;

    let result = RecalcOutput {
        ok: true,
        category,
        subjects,
    };
    render_mode(
        output,
        &result,
        |r, w| writeln!(w, "{}\t{}", r.category, r.subjects),
        |r, w| {
            writeln!(
                w,
                "✓ Recalculated category {} for {} subject(s)",
                r.category, r.subjects
            )
        },
    )
}

fn optional(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}
