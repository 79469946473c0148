// querytree/src/utils/paths.rs
//! Path arithmetic for untrusted folder and file names coming from query rows.
//!
//! Nothing here touches the file system. Fragments are normalized lexically and
//! joined under a [`TargetRoot`]; fragments that would leave the root after
//! normalization are rejected instead of being followed.

use std::path::{Component, Path, PathBuf};

use crate::errors::{BackupError, PathIssue, Result};

#[cfg(windows)]
const RESERVED_CHARS: &[char] = &['\0', '<', '>', ':', '"', '|', '?', '*'];
#[cfg(not(windows))]
const RESERVED_CHARS: &[char] = &['\0'];

/// Trusted directory every output file is placed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRoot {
    absolute: PathBuf,
    label: PathBuf,
}

impl TargetRoot {
    /// `label` is how the root is shown in messages, usually the storage
    /// directory as written in the settings file.
    pub fn new(absolute: impl Into<PathBuf>, label: impl Into<PathBuf>) -> Self {
        TargetRoot {
            absolute: absolute.into(),
            label: label.into(),
        }
    }

    pub fn absolute(&self) -> &Path {
        &self.absolute
    }
}

/// A path under a [`TargetRoot`], in the two forms callers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Path used for I/O.
    pub absolute: PathBuf,
    /// Root label joined with the relative part, used in messages.
    pub display: PathBuf,
}

impl ResolvedPath {
    pub fn display_string(&self) -> String {
        self.display.display().to_string()
    }
}

/// Lexically normalizes a path: drops `.`, collapses repeated separators and
/// resolves `name/..` pairs. Leading `..` and root components are kept so that
/// the caller can decide what to do with them. An input that normalizes to
/// nothing yields an empty path.
pub fn normalize(raw: impl AsRef<Path>) -> PathBuf {
    let mut out = PathBuf::new();
    for component in raw.as_ref().components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // "/.." is "/"
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// Normalizes each fragment on its own and joins them in order under `root`.
///
/// Earlier fragments may normalize to nothing, which means "the root itself";
/// the last fragment names the file and must not.
pub fn resolve(root: &TargetRoot, fragments: &[&str]) -> Result<ResolvedPath> {
    let mut relative = PathBuf::new();
    let mut last_is_empty = true;

    for raw in fragments {
        let normalized = normalize(raw);
        let invalid = |issue| BackupError::InvalidPath {
            path: root.label.join(raw).display().to_string(),
            issue,
        };

        if normalized.has_root()
            || normalized
                .components()
                .any(|c| matches!(c, Component::Prefix(_) | Component::ParentDir))
        {
            return Err(invalid(PathIssue::Escapes));
        }
        for component in normalized.components() {
            let text = component.as_os_str().to_string_lossy();
            if let Some(c) = text.chars().find(|c| RESERVED_CHARS.contains(c) || c.is_control()) {
                return Err(invalid(PathIssue::Reserved(c)));
            }
        }

        last_is_empty = normalized.as_os_str().is_empty();
        relative.push(normalized);
    }

    if last_is_empty {
        return Err(BackupError::InvalidPath {
            path: root.label.join(fragments.join("/")).display().to_string(),
            issue: PathIssue::Empty,
        });
    }

    Ok(ResolvedPath {
        absolute: root.absolute.join(&relative),
        display: root.label.join(&relative),
    })
}
