// memreplay (camcorder sidecar cataloguer)
// Copyright (C) 2025 Andrew Nissen

use globset::{GlobBuilder, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub fn get_sidecar_extensions() -> Vec<&'static str> {
    vec!["modd"]
}

/// Walk every directory and collect sidecar files, sorted by path.
pub fn find_modd_files<P: AsRef<Path>>(directories: &[P]) -> Result<Vec<PathBuf>, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for ext in get_sidecar_extensions() {
        let pattern = format!("**/*.{}", ext);
        builder.add(GlobBuilder::new(&pattern).case_insensitive(true).build()?);
    }
    let globset = builder.build()?;

    let mut found = Vec::new();
    for directory in directories {
        let directory = directory.as_ref();
        for entry in WalkDir::new(directory).into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let relative_path = entry
                .path()
                .strip_prefix(directory)
                .unwrap_or(entry.path());
            if globset.is_match(relative_path) {
                found.push(entry.into_path());
            }
        }
    }

    found.sort();
    found.dedup();
    Ok(found)
}

/// Result of moving one file into a directory.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    /// Where the file now lives, if it moved
    pub new_location: Option<PathBuf>,
    pub success: bool,
}

/// Create `out_dir`, copy `source` into it under the same file name and
/// delete the original once the copy succeeded.
///
/// Every failure is logged. A failed directory creation still lets the copy
/// be attempted; the original is only removed after a successful copy. An
/// existing file at the target is never overwritten.
pub fn move_into_directory(source: &Path, out_dir: &Path) -> MoveOutcome {
    let mut success = true;

    if let Err(e) = fs::create_dir_all(out_dir) {
        warn!(dir = %out_dir.display(), error = %e, "failed to create archive directory");
        success = false;
    }

    let Some(file_name) = source.file_name() else {
        warn!(path = %source.display(), "cannot relocate a path without a file name");
        return MoveOutcome {
            new_location: None,
            success: false,
        };
    };
    let target = out_dir.join(file_name);

    if is_same_file(source, &target) {
        return MoveOutcome {
            new_location: None,
            success,
        };
    }

    if target.exists() {
        warn!(target = %target.display(), "refusing to overwrite existing file");
        return MoveOutcome {
            new_location: None,
            success: false,
        };
    }

    if let Err(e) = fs::copy(source, &target) {
        warn!(source = %source.display(), target = %target.display(), error = %e, "failed to copy file");
        return MoveOutcome {
            new_location: None,
            success: false,
        };
    }

    match fs::remove_file(source) {
        Ok(()) => MoveOutcome {
            new_location: Some(target),
            success,
        },
        Err(e) => {
            warn!(path = %source.display(), error = %e, "copied file but failed to remove original");
            MoveOutcome {
                new_location: None,
                success: false,
            }
        }
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
