//! Query-to-folder backup tool
//!
//! Runs the query from `query.sql` and writes every result row
//! (folder, file name, content) as a file under the configured storage folder.

// querytree/src/main.rs
mod backup;
mod config;
mod errors;
mod utils;

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Main entry point for the backup tool
fn main() -> ExitCode {
    match run_app() {
        Ok(report) => {
            println!(
                "✅ Резервное копирование завершено ({}, файлов: {})",
                report.storage.display(),
                report.files_written
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_app() -> Result<backup::BackupReport> {
    let project_dir = project_dir()?;
    let report = backup::run_backup_flow(&project_dir)?;
    Ok(report)
}

/// Directory holding `settings.json` and `query.sql`.
///
/// The first command-line argument wins, taken relative to the working
/// directory; otherwise the directory of the running executable, with
/// symlinks resolved.
fn project_dir() -> Result<PathBuf> {
    if let Some(dir) = env::args_os().nth(1) {
        let cwd = env::current_dir().context("Failed to read the working directory")?;
        return Ok(absolute_from(&cwd, Path::new(&dir)));
    }

    let exe = env::current_exe().context("Failed to locate the running executable")?;
    let exe = exe
        .canonicalize()
        .with_context(|| format!("Failed to resolve executable path {}", exe.display()))?;
    exe.parent()
        .map(|dir| dir.to_path_buf())
        .context("Executable path has no parent directory")
}

fn absolute_from(cwd: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        utils::paths::normalize(cwd.join(dir))
    }
}
