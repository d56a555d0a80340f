//! `rb report`: per-milestone points and logged time for one project.

use clap::Args;
use rubric_core::model::ProjectId;
use rubric_core::report::{MilestoneReport, milestone_report};
use rust_decimal::Decimal;
use std::io::Write;
use std::path::Path;

use super::{Workspace, tree_failure};
use crate::output::{OutputMode, pretty_rule, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Project id.
    pub project: i64,
}

fn write_text(report: &MilestoneReport, w: &mut dyn Write) -> std::io::Result<()> {
    for milestone in &report.milestones {
        for member in &milestone.members {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                milestone.order_index,
                milestone.name,
                member.username,
                member.points,
                member.minutes,
                member.issues.authored,
                member.issues.closed,
                member.issues.participated
            )?;
        }
    }
    Ok(())
}

fn write_pretty(report: &MilestoneReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Milestones of {}", report.project_name))?;
    if report.milestones.is_empty() {
        return writeln!(w, "No milestones in this group yet.");
    }
    for milestone in &report.milestones {
        let state = if milestone.assessed { "assessed" } else { "open" };
        writeln!(
            w,
            "#{} {}  {} .. {}  [{state}]",
            milestone.order_index,
            milestone.name,
            milestone.window.start.format("%Y-%m-%d"),
            milestone.window.end.format("%Y-%m-%d"),
        )?;
        for member in &milestone.members {
            writeln!(
                w,
                "    {:<20} {:>10} pts {:>8} min  issues {}/{}/{}",
                member.username,
                member.points.to_string(),
                member.minutes.to_string(),
                member.issues.authored,
                member.issues.closed,
                member.issues.participated
            )?;
        }
        for category in &milestone.categories {
            writeln!(w, "    - {} (of {})", category.name, category.total)?;
            for points in &category.points {
                writeln!(
                    w,
                    "        {:<16} auto {:>8}  given {:>8}",
                    points.subject.to_string(),
                    optional(points.automatic_points),
                    optional(points.given_points)
                )?;
            }
        }
    }
    pretty_rule(w)
}

fn optional(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}

pub fn run_report(args: &ReportArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let workspace = Workspace::open(project_root, output)?;
    let project = ProjectId(args.project);
    let group = workspace.project_group(project, output)?;
    let _lock = workspace.read_lock(group, output)?;

    let report = milestone_report(&workspace.conn, project).map_err(|err| tree_failure(output, err))?;
    render_mode(
        output,
        &report,
        |report, w| write_text(report, w),
        |report, w| write_pretty(report, w),
    )
}
