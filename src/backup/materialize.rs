// querytree/src/backup/materialize.rs
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};

use crate::backup::source::ExportRow;
use crate::errors::{BackupError, PathIssue, Result};
use crate::utils::paths::{ResolvedPath, TargetRoot, resolve};

/// What to do when a row's file already exists. Fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Truncate and rewrite the existing file.
    Overwrite,
    /// Fail the run if the file exists.
    ExclusiveCreate,
}

impl OverwritePolicy {
    pub fn from_flag(overwrite: bool) -> Self {
        if overwrite {
            OverwritePolicy::Overwrite
        } else {
            OverwritePolicy::ExclusiveCreate
        }
    }

    fn open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.write(true);
        match self {
            OverwritePolicy::Overwrite => options.create(true).truncate(true),
            OverwritePolicy::ExclusiveCreate => options.create_new(true),
        };
        options
    }
}

/// Turns rows into files under a target root, one row at a time.
#[derive(Debug, Clone)]
pub struct Materializer<'a> {
    root: &'a TargetRoot,
    policy: OverwritePolicy,
}

impl<'a> Materializer<'a> {
    pub fn new(root: &'a TargetRoot, policy: OverwritePolicy) -> Self {
        Materializer { root, policy }
    }

    /// Writes every row in order and calls `on_written` after each file.
    ///
    /// The first error stops the run. Files written before it stay on disk.
    pub fn run<I, F>(&self, rows: I, mut on_written: F) -> Result<u64>
    where
        I: IntoIterator<Item = Result<ExportRow>>,
        F: FnMut(&ResolvedPath),
    {
        let mut written = 0;
        for row in rows {
            let row = row?;
            let target = self.write_row(&row)?;
            on_written(&target);
            written += 1;
        }
        Ok(written)
    }

    /// Creates the file for a single row, including missing parent folders.
    ///
    /// A directory sitting at the file's path is an error under either policy.
    pub fn write_row(&self, row: &ExportRow) -> Result<ResolvedPath> {
        let target = resolve(self.root, &[row.folder.as_str(), row.file_name.as_str()])?;
        let display = target.display_string();
        let invalid = |issue| BackupError::InvalidPath {
            path: display.clone(),
            issue,
        };

        if let Some(folder) = target.absolute.parent() {
            fs::create_dir_all(folder).map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists | ErrorKind::NotADirectory => {
                    invalid(PathIssue::NotADirectory)
                }
                _ => invalid(PathIssue::CreateDir),
            })?;
        }

        if fs::metadata(&target.absolute).is_ok_and(|m| m.is_dir()) {
            return Err(invalid(PathIssue::IsDirectory));
        }

        let mut file = self
            .policy
            .open_options()
            .open(&target.absolute)
            .map_err(|source| match source.kind() {
                ErrorKind::AlreadyExists => BackupError::FileExists {
                    path: display.clone(),
                },
                ErrorKind::NotFound | ErrorKind::NotADirectory => {
                    invalid(PathIssue::NotADirectory)
                }
                ErrorKind::IsADirectory => invalid(PathIssue::IsDirectory),
                _ => BackupError::Storage {
                    path: display.clone(),
                    source,
                },
            })?;

        file.write_all(row.content.as_bytes())
            .map_err(|source| BackupError::Storage {
                path: display.clone(),
                source,
            })?;

        Ok(target)
    }
}
