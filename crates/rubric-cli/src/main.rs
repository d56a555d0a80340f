#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use rubric_core::config::resolve_config;
use std::env;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "rb: weighted assessment trees for supervised team projects",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output format. Overrides FORMAT and the user config.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Explicit flag first, then FORMAT, the user config and TTY detection.
    fn output_mode(&self, project_root: &Path) -> anyhow::Result<OutputMode> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        let config = resolve_config(project_root, self.json)?;
        Ok(OutputMode::from_resolved(&config.resolved_output))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a rubric project",
        long_about = "Create .rubric/ with a default config and an empty store in the current directory.",
        after_help = "EXAMPLES:\n    rb init\n\n    # Rewrite config files, keeping the store\n    rb init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(next_help_heading = "Roster", about = "Create and list groups")]
    Group(cmd::group::GroupArgs),

    #[command(next_help_heading = "Roster", about = "Manage projects")]
    Project(cmd::roster::ProjectArgs),

    #[command(next_help_heading = "Roster", about = "Manage users")]
    User(cmd::roster::UserArgs),

    #[command(
        next_help_heading = "Roster",
        about = "Enroll a user in a project",
        after_help = "EXAMPLES:\n    rb enroll ann 1\n    rb enroll prof 1 --role owner"
    )]
    Enroll(cmd::roster::EnrollArgs),

    #[command(next_help_heading = "Roster", about = "Disable or re-enable an enrollment")]
    Enrollment(cmd::roster::EnrollmentArgs),

    #[command(next_help_heading = "Tree", about = "Add, remove and copy categories")]
    Category(cmd::category::CategoryArgs),

    #[command(
        next_help_heading = "Tree",
        about = "Show a group's category tree",
        after_help = "EXAMPLES:\n    rb tree 2024-fall\n\n    # With one enrollment's scores\n    rb tree 2024-fall --subject enrollment:3"
    )]
    Tree(cmd::tree::TreeArgs),

    #[command(
        next_help_heading = "Scoring",
        about = "Record a manual score",
        after_help = "EXAMPLES:\n    # Enrollment 3 earns 7.5 on category 4\n    rb assess 3 4 7.5"
    )]
    Assess(cmd::assess::AssessArgs),

    #[command(
        next_help_heading = "Scoring",
        about = "Recalculate a category's subtree",
        after_help = "EXAMPLES:\n    rb recalc 1\n    rb recalc 4 --subject project:2"
    )]
    Recalc(cmd::assess::RecalcArgs),

    #[command(next_help_heading = "Activity", about = "Record tracker issues")]
    Issue(cmd::activity::IssueArgs),

    #[command(next_help_heading = "Activity", about = "Log time spent on issues")]
    Time(cmd::activity::TimeArgs),

    #[command(next_help_heading = "Activity", about = "Record commits")]
    Commit(cmd::activity::CommitArgs),

    #[command(
        next_help_heading = "Read",
        about = "Milestone progress of a project",
        after_help = "EXAMPLES:\n    rb report 1\n    rb report 1 --format json"
    )]
    Report(cmd::report::ReportArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    rb completions bash > ~/.local/share/bash-completion/completions/rb"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RUBRIC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "rubric=debug,info"
        } else {
            "rubric=info,warn"
        })
    });

    let format = env::var("RUBRIC_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let cwd = env::current_dir()?;
    let config_root = cmd::find_project_root(&cwd).unwrap_or_else(|| cwd.clone());
    let output = cli.output_mode(&config_root)?;

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, output, &cwd),
        Commands::Group(args) => cmd::group::run_group(args, output, &cwd),
        Commands::Project(args) => cmd::roster::run_project(args, output, &cwd),
        Commands::User(args) => cmd::roster::run_user(args, output, &cwd),
        Commands::Enroll(args) => cmd::roster::run_enroll(args, output, &cwd),
        Commands::Enrollment(args) => cmd::roster::run_enrollment(args, output, &cwd),
        Commands::Category(args) => cmd::category::run_category(args, output, &cwd),
        Commands::Tree(args) => cmd::tree::run_tree(args, output, &cwd),
        Commands::Assess(args) => cmd::assess::run_assess(args, output, &cwd),
        Commands::Recalc(args) => cmd::assess::run_recalc(args, output, &cwd),
        Commands::Issue(args) => cmd::activity::run_issue(args, output, &cwd),
        Commands::Time(args) => cmd::activity::run_time(args, output, &cwd),
        Commands::Commit(args) => cmd::activity::run_commit(args, output, &cwd),
        Commands::Report(args) => cmd::report::run_report(args, output, &cwd),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}
