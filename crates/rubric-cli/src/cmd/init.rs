use anyhow::{Context as _, Result};
use clap::Args;
use rubric_core::config::RUBRIC_DIR;
use rubric_core::db;
use serde::Serialize;
use std::path::Path;

use super::STORE_FILE;
use crate::output::{OutputMode, pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Re-initialize even if `.rubric/` already exists. The store is kept.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[automation]\n\
    reroll_random = true\n\
    \n\
    [scoring]\n\
    decimals = 5\n";

const GITIGNORE: &str = "rubric.db\nrubric.db-wal\nrubric.db-shm\nlocks/\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    ok: bool,
    path: String,
    store: String,
    config: String,
}

/// Execute `rb init`. Creates the project skeleton:
///
/// ```text
/// .rubric/
///   config.toml   (default project config)
///   .gitignore    (store files, locks/)
///   rubric.db     (migrated store)
///   locks/
/// ```
///
/// # Errors
///
/// Returns an error if `.rubric/` already exists and `--force` is not set,
/// or if any filesystem or store operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let rubric_dir = project_root.join(RUBRIC_DIR);

    if rubric_dir.exists() && !args.force {
        anyhow::bail!("{RUBRIC_DIR}/ already exists. Use `rb init --force` to reinitialize.");
    }

    let locks_dir = rubric_dir.join("locks");
    std::fs::create_dir_all(&locks_dir)
        .with_context(|| format!("Failed to create {}", locks_dir.display()))?;

    let config_path = rubric_dir.join("config.toml");
    std::fs::write(&config_path, CONFIG_TOML)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = rubric_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let store_path = rubric_dir.join(STORE_FILE);
    db::open_store(&store_path)?;
    tracing::info!(path = %rubric_dir.display(), "initialized rubric project");

    let result = InitOutput {
        ok: true,
        path: rubric_dir.display().to_string(),
        store: store_path.display().to_string(),
        config: config_path.display().to_string(),
    };
    render_mode(
        output,
        &result,
        |r, w| writeln!(w, "initialized {}", r.path),
        |r, w| {
            writeln!(w, "✓ Initialized {RUBRIC_DIR}/ project structure.")?;
            writeln!(w)?;
            pretty_kv(w, "store", &r.store)?;
            pretty_kv(w, "config", &r.config)?;
            writeln!(w)?;
            writeln!(w, "Next steps:")?;
            writeln!(w, "  rb group create 2024-fall")?;
            writeln!(w, "  rb category add 2024-fall \"Final grade\" --type sum --total 10")
        },
    )
}
