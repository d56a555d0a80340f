//! `rb group`: create and list groups.
//!
//! A group owns projects and exactly one category tree.

use clap::{Args, Subcommand};
use rubric_core::db::query::{self, GroupRow};
use serde::Serialize;
use std::path::Path;

use super::{Workspace, tree_failure};
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct GroupArgs {
    #[command(subcommand)]
    pub command: GroupCommand,
}

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    #[command(
        about = "Create a group with an empty tree",
        after_help = "EXAMPLES:\n    rb group create 2024-fall"
    )]
    Create(GroupCreateArgs),

    #[command(about = "List groups with their root category and milestone count")]
    List,
}

#[derive(Args, Debug)]
pub struct GroupCreateArgs {
    /// Unique group name.
    pub name: String,
}

#[derive(Debug, Serialize)]
struct GroupCreateOutput {
    ok: bool,
    id: i64,
    name: String,
}

pub fn run_group(args: &GroupArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let workspace = Workspace::open(project_root, output)?;
    match &args.command {
        GroupCommand::Create(create) => run_create(&workspace, create, output),
        GroupCommand::List => run_list(&workspace, output),
    }
}

fn run_create(
    workspace: &Workspace,
    args: &GroupCreateArgs,
    output: OutputMode,
) -> anyhow::Result<()> {
    let id = query::insert_group(&workspace.conn, &args.name)
        .map_err(|err| tree_failure(output, err))?;
    tracing::info!(group = %id, name = %args.name, "created group");

    let result = GroupCreateOutput {
        ok: true,
        id: id.0,
        name: args.name.clone(),
    };
    render_mode(
        output,
        &result,
        |r, w| writeln!(w, "{}\t{}", r.id, r.name),
        |r, w| writeln!(w, "✓ Created group {} ({})", r.name, r.id),
    )
}

fn run_list(workspace: &Workspace, output: OutputMode) -> anyhow::Result<()> {
    let groups = query::list_groups(&workspace.conn).map_err(|err| tree_failure(output, err))?;
    render_mode(
        output,
        &groups,
        |groups, w| write_text(groups, w),
        |groups, w| write_pretty(groups, w),
    )
}

fn write_text(groups: &[GroupRow], w: &mut dyn std::io::Write) -> std::io::Result<()> {
    for group in groups {
        let root = group.root.map_or_else(|| "-".to_string(), |id| id.to_string());
        writeln!(w, "{}\t{}\t{}\t{}", group.id, group.name, root, group.milestone_seq)?;
    }
    Ok(())
}

fn write_pretty(groups: &[GroupRow], w: &mut dyn std::io::Write) -> std::io::Result<()> {
    if groups.is_empty() {
        return writeln!(w, "No groups yet. Create one with `rb group create <name>`.");
    }
    pretty_section(w, "Groups")?;
    writeln!(w, "{:>4}  {:<24} {:>6} {:>10}", "ID", "NAME", "ROOT", "MILESTONES")?;
    for group in groups {
        let root = group.root.map_or_else(|| "-".to_string(), |id| id.to_string());
        writeln!(
            w,
            "{:>4}  {:<24} {:>6} {:>10}",
            group.id.0, group.name, root, group.milestone_seq
        )?;
    }
    Ok(())
}
