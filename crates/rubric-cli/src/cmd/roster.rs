//! Roster commands: projects, users and enrollments.
//!
//! - `rb project add <group> <name>`: add a project and seed its placeholders
//! - `rb user add <username> <email>`
//! - `rb enroll <username> <project> [--role]`: enroll and seed placeholders
//! - `rb enrollment disable|enable <id>`

use clap::{Args, Subcommand};
use rubric_core::Grader;
use rubric_core::TreeError;
use rubric_core::db::query;
use rubric_core::model::{EnrollmentId, ProjectId, Role};
use rubric_core::scoring::SqliteSignals;
use serde::Serialize;
use std::path::Path;

use super::{Workspace, resolve_group, tree_failure};
use crate::output::{OutputMode, render_mode};

// ---------------------------------------------------------------------------
// Clap types
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub command: ProjectCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    #[command(
        about = "Add a project to a group",
        after_help = "EXAMPLES:\n    rb project add 2024-fall \"Team Rocket\""
    )]
    Add(ProjectAddArgs),
}

#[derive(Args, Debug)]
pub struct ProjectAddArgs {
    /// Group name or id.
    pub group: String,
    /// Project name.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    #[command(about = "Register a user")]
    Add(UserAddArgs),
}

#[derive(Args, Debug)]
pub struct UserAddArgs {
    /// Unique username; commit authors are matched against it.
    pub username: String,
    pub email: String,
}

/// Arguments for `rb enroll`.
#[derive(Args, Debug)]
pub struct EnrollArgs {
    /// Username to enroll.
    pub username: String,
    /// Project id.
    pub project: i64,
    /// Role within the project.
    #[arg(long, default_value = "member")]
    pub role: Role,
}

#[derive(Args, Debug)]
pub struct EnrollmentArgs {
    #[command(subcommand)]
    pub command: EnrollmentCommand,
}

#[derive(Subcommand, Debug)]
pub enum EnrollmentCommand {
    #[command(about = "Exclude an enrollment from project fan-out and project signal sums")]
    Disable(EnrollmentToggleArgs),
    #[command(about = "Re-enable a disabled enrollment")]
    Enable(EnrollmentToggleArgs),
}

#[derive(Args, Debug)]
pub struct EnrollmentToggleArgs {
    /// Enrollment id.
    pub id: i64,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CreatedOutput {
    ok: bool,
    kind: &'static str,
    id: i64,
    name: String,
}

#[derive(Debug, Serialize)]
struct EnrollmentOutput {
    ok: bool,
    enrollment: i64,
    username: String,
    project: i64,
    role: Role,
    disabled: bool,
}

fn render_created(output: OutputMode, created: &CreatedOutput) -> anyhow::Result<()> {
    render_mode(
        output,
        created,
        |r, w| writeln!(w, "{}\t{}", r.id, r.name),
        |r, w| writeln!(w, "✓ Added {} {} ({})", r.kind, r.name, r.id),
    )
}

fn render_enrollment(output: OutputMode, enrollment: &EnrollmentOutput) -> anyhow::Result<()> {
    render_mode(
        output,
        enrollment,
        |r, w| {
            let state = if r.disabled { "disabled" } else { "enabled" };
            writeln!(w, "{}\t{}\t{}\t{}\t{state}", r.enrollment, r.username, r.project, r.role)
        },
        |r, w| {
            let state = if r.disabled { " (disabled)" } else { "" };
            writeln!(
                w,
                "✓ Enrollment {}: {} in project {} as {}{state}",
                r.enrollment, r.username, r.project, r.role
            )
        },
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub fn run_project(
    args: &ProjectArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let ProjectCommand::Add(add) = &args.command;
    let workspace = Workspace::open(project_root, output)?;
    let group = resolve_group(&workspace.conn, &add.group, output)?;
    let _lock = workspace.lock(group.id, output)?;

    let signals = SqliteSignals::new(&workspace.conn);
    let mut grader = Grader::new(&workspace.conn, &signals).with_config(&workspace.config);
    let project = grader
        .add_project(group.id, &add.name)
        .map_err(|err| tree_failure(output, err))?;

    render_created(
        output,
        &CreatedOutput {
            ok: true,
            kind: "project",
            id: project.0,
            name: add.name.clone(),
        },
    )
}

pub fn run_user(args: &UserArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let UserCommand::Add(add) = &args.command;
    let workspace = Workspace::open(project_root, output)?;
    let user = query::insert_user(&workspace.conn, &add.username, &add.email)
        .map_err(|err| tree_failure(output, err))?;
    tracing::info!(%user, username = %add.username, "registered user");

    render_created(
        output,
        &CreatedOutput {
            ok: true,
            kind: "user",
            id: user.0,
            name: add.username.clone(),
        },
    )
}

pub fn run_enroll(args: &EnrollArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let workspace = Workspace::open(project_root, output)?;
    let project = ProjectId(args.project);
    let group = workspace.project_group(project, output)?;
    let _lock = workspace.lock(group, output)?;

    let user = query::find_user_by_username(&workspace.conn, &args.username)
        .and_then(|row| row.ok_or_else(|| TreeError::UserNotFound(args.username.clone())))
        .map_err(|err| tree_failure(output, err))?;

    let signals = SqliteSignals::new(&workspace.conn);
    let mut grader = Grader::new(&workspace.conn, &signals).with_config(&workspace.config);
    let enrollment = grader
        .enroll(user.id, project, args.role)
        .map_err(|err| tree_failure(output, err))?;

    render_enrollment(
        output,
        &EnrollmentOutput {
            ok: true,
            enrollment: enrollment.0,
            username: user.username,
            project: project.0,
            role: args.role,
            disabled: false,
        },
    )
}

pub fn run_enrollment(
    args: &EnrollmentArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let (toggle, disabled) = match &args.command {
        EnrollmentCommand::Disable(toggle) => (toggle, true),
        EnrollmentCommand::Enable(toggle) => (toggle, false),
    };
    let workspace = Workspace::open(project_root, output)?;
    let id = EnrollmentId(toggle.id);
    let group = workspace.enrollment_group(id, output)?;
    let _lock = workspace.lock(group, output)?;

    query::set_enrollment_disabled(&workspace.conn, id, disabled)
        .and_then(|found| {
            if found {
                Ok(())
            } else {
                Err(TreeError::EnrollmentNotFound(id))
            }
        })
        .map_err(|err| tree_failure(output, err))?;
    let member = query::get_enrollment(&workspace.conn, id)
        .and_then(|row| row.ok_or(TreeError::EnrollmentNotFound(id)))
        .map_err(|err| tree_failure(output, err))?;
    let username = query::get_user(&workspace.conn, member.user_id)
        .map_err(|err| tree_failure(output, err))?
        .map_or_else(|| member.user_id.to_string(), |user| user.username);
    tracing::info!(enrollment = %id, disabled, "updated enrollment");

    render_enrollment(
        output,
        &EnrollmentOutput {
            ok: true,
            enrollment: id.0,
            username,
            project: member.project_id.0,
            role: member.role,
            disabled: member.disabled,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct EnrollWrapper {
        #[command(flatten)]
        args: EnrollArgs,
    }

    #[derive(Parser)]
    struct EnrollmentWrapper {
        #[command(flatten)]
        args: EnrollmentArgs,
    }

    #[test]
    fn enroll_defaults_to_member() {
        let w = EnrollWrapper::parse_from(["test", "ann", "3"]);
        assert_eq!(w.args.username, "ann");
        assert_eq!(w.args.project, 3);
        assert_eq!(w.args.role, Role::Member);
    }

    #[test]
    fn enroll_accepts_role_names() {
        let w = EnrollWrapper::parse_from(["test", "ann", "3", "--role", "owner"]);
        assert_eq!(w.args.role, Role::Owner);
        assert!(EnrollWrapper::try_parse_from(["test", "ann", "3", "--role", "dean"]).is_err());
    }

    #[test]
    fn enrollment_disable_parses_id() {
        let w = EnrollmentWrapper::parse_from(["test", "disable", "7"]);
        assert!(matches!(
            w.args.command,
            EnrollmentCommand::Disable(EnrollmentToggleArgs { id: 7 })
        ));
    }
}
