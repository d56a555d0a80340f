//! Activity commands feeding the automation signal tables.
//!
//! - `rb issue add <project> <external-id> <title> [--milestone N] [--author U] [--closed-by U]`
//! - `rb time log <issue> <username> (--minutes N | --note TEXT)`
//! - `rb commit add <project> <hash> --author-name .. --author-email ..`
//!
//! Recording activity does not rescore anything; run `rb recalc` afterwards.

use chrono::Utc;
use clap::{Args, Subcommand};
use rubric_core::TreeError;
use rubric_core::ingest::{self, CommitRecord, IssueRecord};
use rubric_core::model::{IssueId, ProjectId};
use serde::Serialize;
use std::path::Path;

use super::{Workspace, parse_instant, tree_failure};
use crate::output::{CliError, OutputMode, render_error, render_mode};

// ---------------------------------------------------------------------------
// Clap types
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct IssueArgs {
    #[command(subcommand)]
    pub command: IssueCommand,
}

#[derive(Subcommand, Debug)]
pub enum IssueCommand {
    #[command(
        about = "Record or update a tracker issue",
        after_help = "EXAMPLES:\n    rb issue add 1 42 \"Login form\" --milestone 2 --author ann --closed-by bob"
    )]
    Add(IssueAddArgs),
}

#[derive(Args, Debug)]
pub struct IssueAddArgs {
    /// Project id.
    pub project: i64,
    /// Issue number in the external tracker.
    pub external_id: i64,
    pub title: String,
    /// Milestone order index the issue belongs to.
    #[arg(long)]
    pub milestone: Option<u32>,
    /// Username of whoever opened the issue.
    #[arg(long)]
    pub author: Option<String>,
    /// Username of whoever closed the issue.
    #[arg(long)]
    pub closed_by: Option<String>,
}

impl IssueAddArgs {
    fn record(&self) -> IssueRecord {
        IssueRecord {
            project: ProjectId(self.project),
            external_id: self.external_id,
            title: self.title.clone(),
            milestone_order: self.milestone,
            author: self.author.clone(),
            closed_by: self.closed_by.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct TimeArgs {
    #[command(subcommand)]
    pub command: TimeCommand,
}

#[derive(Subcommand, Debug)]
pub enum TimeCommand {
    #[command(
        about = "Log time spent on an issue",
        after_help = "EXAMPLES:\n    rb time log 3 ann --minutes 90\n    rb time log 3 ann --note \"added 1h 30m of time spent\" --entry-id note-981"
    )]
    Log(TimeLogArgs),
}

#[derive(Args, Debug)]
pub struct TimeLogArgs {
    /// Issue id as returned by `rb issue add`.
    pub issue: i64,
    /// Username of whoever spent the time.
    pub username: String,
    /// Minutes spent.
    #[arg(long, group = "amount", required_unless_present = "note", allow_negative_numbers = true)]
    pub minutes: Option<i64>,
    /// Tracker note such as "added 1h 30m of time spent".
    #[arg(long, group = "amount")]
    pub note: Option<String>,
    /// When the time was logged (RFC 3339 or YYYY-MM-DD). Defaults to now.
    #[arg(long)]
    pub at: Option<String>,
    /// External id making the entry idempotent. Defaults to issue:user:timestamp.
    #[arg(long)]
    pub entry_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct CommitArgs {
    #[command(subcommand)]
    pub command: CommitCommand,
}

#[derive(Subcommand, Debug)]
pub enum CommitCommand {
    #[command(
        about = "Record a commit and its line counts",
        after_help = "EXAMPLES:\n    rb commit add 1 9fceb02 --author-name ann --author-email ann@example.org \\\n        --added 120 --removed 30 --at 2024-09-03"
    )]
    Add(CommitAddArgs),
}

#[derive(Args, Debug)]
pub struct CommitAddArgs {
    /// Project id.
    pub project: i64,
    pub hash: String,
    #[arg(long)]
    pub author_name: String,
    #[arg(long)]
    pub author_email: String,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub added: i64,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub removed: i64,
    /// Commit time (RFC 3339 or YYYY-MM-DD). Defaults to now.
    #[arg(long)]
    pub at: Option<String>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct IssueOutput {
    ok: bool,
    issue: IssueId,
    project: ProjectId,
    external_id: i64,
    milestone: Option<u32>,
}

#[derive(Debug, Serialize)]
struct RecordedOutput {
    ok: bool,
    kind: &'static str,
    key: String,
    recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    minutes: Option<i64>,
}

fn render_recorded(output: OutputMode, recorded: &RecordedOutput) -> anyhow::Result<()> {
    render_mode(
        output,
        recorded,
        |r, w| {
            let state = if r.recorded { "recorded" } else { "duplicate" };
            writeln!(w, "{}\t{}\t{state}", r.kind, r.key)
        },
        |r, w| {
            if r.recorded {
                writeln!(w, "✓ Recorded {} {}", r.kind, r.key)
            } else {
                writeln!(w, "= {} {} was already recorded", r.kind, r.key)
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub fn run_issue(args: &IssueArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let IssueCommand::Add(add) = &args.command;
    let workspace = Workspace::open(project_root, output)?;
    let project = ProjectId(add.project);
    let group = workspace.project_group(project, output)?;
    let _lock = workspace.lock(group, output)?;

    let issue =
        ingest::record_issue(&workspace.conn, &add.record()).map_err(|err| tree_failure(output, err))?;

    let result = IssueOutput {
        ok: true,
        issue,
        project,
        external_id: add.external_id,
        milestone: add.milestone,
    };
    render_mode(
        output,
        &result,
        |r, w| writeln!(w, "{}\t{}\t{}", r.issue, r.project, r.external_id),
        |r, w| {
            writeln!(
                w,
                "✓ Issue #{} recorded as {} in project {}",
                r.external_id, r.issue, r.project
            )
        },
    )
}

/// Minutes from `--minutes` or from a tracker note.
fn entry_minutes(args: &TimeLogArgs, output: OutputMode) -> anyhow::Result<i64> {
    if let Some(minutes) = args.minutes {
        return Ok(minutes);
    }
    let note = args.note.as_deref().unwrap_or_default();
    if let Some(minutes) = ingest::parse_time_spent_note(note) {
        return Ok(minutes);
    }
    let err = CliError::with_details(
        format!("could not read a time amount from note '{note}'"),
        "Use the tracker form \"added 1h 30m of time spent\" or pass --minutes.",
        rubric_core::ErrorCode::InvalidAmount.code(),
    );
    render_error(output, &err)?;
    anyhow::bail!("{}", err.message)
}

pub fn run_time(args: &TimeArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let TimeCommand::Log(log) = &args.command;
    let minutes = entry_minutes(log, output)?;
    let logged_at = log
        .at
        .as_deref()
        .map_or_else(|| Ok(Utc::now()), |raw| parse_instant(raw, false))?;
    let issue = IssueId(log.issue);
    let entry_id = log.entry_id.clone().unwrap_or_else(|| {
        format!("{issue}:{}:{}", log.username, logged_at.timestamp_micros())
    });

    let workspace = Workspace::open(project_root, output)?;
    let project = issue_project(&workspace, issue).map_err(|err| tree_failure(output, err))?;
    let group = workspace.project_group(project, output)?;
    let _lock = workspace.lock(group, output)?;

    let recorded = ingest::record_time_entry(
        &workspace.conn,
        issue,
        &log.username,
        minutes,
        logged_at,
        &entry_id,
    )
    .map_err(|err| tree_failure(output, err))?;

    render_recorded(
        output,
        &RecordedOutput {
            ok: true,
            kind: "time entry",
            key: entry_id,
            recorded,
            minutes: Some(minutes),
        },
    )
}

fn issue_project(workspace: &Workspace, issue: IssueId) -> Result<ProjectId, TreeError> {
    use rusqlite::OptionalExtension as _;
    workspace
        .conn
        .query_row(
            "SELECT project_id FROM issues WHERE issue_id = ?1",
            [issue.0],
            |row| row.get(0),
        )
        .optional()?
        .map(ProjectId)
        .ok_or(TreeError::IssueNotFound(issue))
}

pub fn run_commit(args: &CommitArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let CommitCommand::Add(add) = &args.command;
    let committed_at = add
        .at
        .as_deref()
        .map_or_else(|| Ok(Utc::now()), |raw| parse_instant(raw, false))?;

    let workspace = Workspace::open(project_root, output)?;
    let project = ProjectId(add.project);
    let group = workspace.project_group(project, output)?;
    let _lock = workspace.lock(group, output)?;

    let record = CommitRecord {
        project,
        hash: add.hash.clone(),
        author_name: add.author_name.clone(),
        author_email: add.author_email.clone(),
        lines_added: add.added,
        lines_removed: add.removed,
        committed_at,
    };
    let recorded =
        ingest::record_commit(&workspace.conn, &record).map_err(|err| tree_failure(output, err))?;

    render_recorded(
        output,
        &RecordedOutput {
            ok: true,
            kind: "commit",
            key: record.hash,
            recorded,
            minutes: None,
        },
    )
}
