pub mod activity;
pub mod assess;
pub mod category;
pub mod completions;
pub mod group;
pub mod init;
pub mod report;
pub mod roster;
pub mod tree;

use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rubric_core::config::{self, ProjectConfig, RUBRIC_DIR};
use rubric_core::db::{self, query};
use rubric_core::error::ErrorCode;
use rubric_core::lock::{LockError, TreeLock, TreeReadLock};
use rubric_core::model::{EnrollmentId, GroupId, ProjectId, Subject};
use rubric_core::{TreeError, TreeResult};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::output::{CliError, OutputMode, render_error};

/// Store file inside the project directory.
pub const STORE_FILE: &str = "rubric.db";

/// How long a command waits for another `rb` holding the group's lock.
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Walk up from `start` to the first directory containing `.rubric/`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(RUBRIC_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// An opened rubric project: store connection plus project config.
pub struct Workspace {
    pub root: PathBuf,
    pub conn: Connection,
    pub config: ProjectConfig,
}

impl Workspace {
    /// Locate and open the project containing `start`.
    ///
    /// # Errors
    ///
    /// Renders a not-initialized error when no `.rubric/` exists above
    /// `start`, and fails if the store or config cannot be opened.
    pub fn open(start: &Path, output: OutputMode) -> Result<Self> {
        let Some(root) = find_project_root(start) else {
            let code = ErrorCode::NotInitialized;
            render_error(
                output,
                &CliError::with_details(code.message(), code.hint().unwrap_or_default(), code.code()),
            )?;
            anyhow::bail!("no {RUBRIC_DIR}/ directory found above {}", start.display());
        };
        let conn = db::open_store(&root.join(RUBRIC_DIR).join(STORE_FILE))?;
        let config = config::load_project_config(&root)?;
        Ok(Self { root, conn, config })
    }

    pub fn rubric_dir(&self) -> PathBuf {
        self.root.join(RUBRIC_DIR)
    }

    /// Exclusive lock on the group's tree for the rest of the command.
    pub fn lock(&self, group: GroupId, output: OutputMode) -> Result<TreeLock> {
        TreeLock::acquire(&self.rubric_dir(), group, LOCK_TIMEOUT)
            .map_err(|err| lock_failure(output, err))
    }

    /// Shared lock for read-only reports.
    pub fn read_lock(&self, group: GroupId, output: OutputMode) -> Result<TreeReadLock> {
        TreeReadLock::acquire(&self.rubric_dir(), group, LOCK_TIMEOUT)
            .map_err(|err| lock_failure(output, err))
    }

    /// Group owning `project`.
    pub fn project_group(&self, project: ProjectId, output: OutputMode) -> Result<GroupId> {
        query::get_project(&self.conn, project)
            .and_then(|row| row.ok_or(TreeError::ProjectNotFound(project)))
            .map(|row| row.group_id)
            .map_err(|err| tree_failure(output, err))
    }

    /// Group owning `enrollment`.
    pub fn enrollment_group(&self, enrollment: EnrollmentId, output: OutputMode) -> Result<GroupId> {
        let member = query::get_enrollment(&self.conn, enrollment)
            .and_then(|row| row.ok_or(TreeError::EnrollmentNotFound(enrollment)))
            .map_err(|err| tree_failure(output, err))?;
        self.project_group(member.project_id, output)
    }
}

/// Render a core error and hand it back for `?`.
pub fn tree_failure(output: OutputMode, err: TreeError) -> anyhow::Error {
    if let Err(render_err) = render_error(output, &CliError::from(&err)) {
        return render_err;
    }
    anyhow::Error::new(err)
}

fn lock_failure(output: OutputMode, err: LockError) -> anyhow::Error {
    let cli = CliError {
        message: err.to_string(),
        suggestion: err.hint().map(str::to_string),
        error_code: Some(err.code().code().to_string()),
    };
    if let Err(render_err) = render_error(output, &cli) {
        return render_err;
    }
    anyhow::Error::new(err)
}

/// Resolve a group by numeric id or by name, rendering a miss.
pub fn resolve_group(conn: &Connection, key: &str, output: OutputMode) -> Result<query::GroupRow> {
    match lookup_group(conn, key) {
        Ok(Some(row)) => Ok(row),
        Ok(None) => {
            let code = ErrorCode::GroupNotFound;
            render_error(
                output,
                &CliError::with_details(
                    format!("group '{key}' not found"),
                    "List groups with `rb group list`.",
                    code.code(),
                ),
            )?;
            anyhow::bail!("group '{key}' not found")
        }
        Err(err) => Err(tree_failure(output, err)),
    }
}

fn lookup_group(conn: &Connection, key: &str) -> TreeResult<Option<query::GroupRow>> {
    if let Ok(raw) = key.parse::<i64>() {
        if let Some(row) = query::get_group(conn, GroupId(raw))? {
            return Ok(Some(row));
        }
    }
    query::find_group_by_name(conn, key)
}

/// Parse `enrollment:<id>` / `user:<id>` or `project:<id>`.
pub fn parse_subject(raw: &str) -> Result<Subject> {
    let (kind, id) = raw
        .split_once(':')
        .with_context(|| format!("subject '{raw}' must look like enrollment:<id> or project:<id>"))?;
    let id: i64 = id
        .parse()
        .with_context(|| format!("subject id '{id}' is not a number"))?;
    match kind {
        "enrollment" | "user" => Ok(Subject::Enrollment(EnrollmentId(id))),
        "project" => Ok(Subject::Project(ProjectId(id))),
        other => anyhow::bail!("unknown subject kind '{other}'"),
    }
}

/// Parse an instant; a bare date reads as the start or end of that day.
pub fn parse_instant(raw: &str, end_of_day: bool) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("'{raw}' is neither RFC 3339 nor YYYY-MM-DD"))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|naive| naive.and_utc())
        .with_context(|| format!("'{raw}' has no valid time of day"))
}
