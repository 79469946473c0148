pub(crate) mod logic;
pub(crate) mod materialize;
pub(crate) mod source;
pub(crate) mod validate;

use std::path::Path;

use crate::errors::Result;
pub use logic::{BackupReport, BackupTool};

/// Public entry point for the backup process.
/// Exports the result of `query.sql` into the storage folder named in `settings.json`,
/// both looked up in `project_dir`.
pub fn run_backup_flow(project_dir: &Path) -> Result<BackupReport> {
    BackupTool::new(project_dir).create_backup()
}
