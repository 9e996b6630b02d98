//! # Path Resolution Module
//!
//! Centralizza la risoluzione dei path sorgente e destinazione.
//! Nessun effetto collaterale oltre alle chiamate `stat` sul filesystem.

use crate::error::{FailureKind, StageFailure};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A source file that resolved to a real, regular file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub path: PathBuf,
    pub size: u64,
}

/// Utility per calcolare i path in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Make a raw source path absolute and symlink-free.
    ///
    /// The source must exist and be a regular file.
    pub fn resolve_source(raw: &Path) -> Result<ResolvedSource, StageFailure> {
        let path = raw.canonicalize().map_err(|e| {
            StageFailure::new(
                FailureKind::PathResolution,
                format!("{}: {}", raw.display(), e),
            )
        })?;

        let metadata = std::fs::metadata(&path).map_err(|e| {
            StageFailure::new(FailureKind::PathResolution, format!("{}: {}", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(StageFailure::new(
                FailureKind::PathResolution,
                format!("{} is not a regular file", path.display()),
            ));
        }

        debug!("Resolved source {} -> {}", raw.display(), path.display());
        Ok(ResolvedSource {
            path,
            size: metadata.len(),
        })
    }

    /// Key used for a source that could not be resolved.
    ///
    /// Lexically absolute when possible so that two spellings of the same
    /// missing file still collapse to one record.
    pub fn fallback_key(raw: &Path) -> PathBuf {
        std::path::absolute(raw).unwrap_or_else(|_| raw.to_path_buf())
    }

    /// Check that the destination exists and is a directory
    pub fn validate_destination(dest: &Path) -> Result<PathBuf, StageFailure> {
        let metadata = match std::fs::metadata(dest) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StageFailure::new(
                    FailureKind::DestinationMissing,
                    format!("{}: {}", dest.display(), e),
                ));
            }
            Err(e) => {
                return Err(StageFailure::new(
                    FailureKind::DestinationMissing,
                    format!("cannot stat {}: {}", dest.display(), e),
                ));
            }
        };

        if !metadata.is_dir() {
            return Err(StageFailure::new(
                FailureKind::DestinationNotDirectory,
                format!("{} is not a directory", dest.display()),
            ));
        }

        dest.canonicalize().map_err(|e| {
            StageFailure::new(FailureKind::DestinationMissing, format!("{}: {}", dest.display(), e))
        })
    }

    /// Full destination path for a source: `<dest dir>/<source file name>`.
    ///
    /// The destination may never be the source itself, by path or by hard
    /// link: creating it would truncate the source before it is read.
    pub fn destination_for(source: &Path, dest: &Path) -> Result<PathBuf, StageFailure> {
        let dest_dir = Self::validate_destination(dest)?;
        let file_name = source.file_name().ok_or_else(|| {
            StageFailure::new(
                FailureKind::PathResolution,
                format!("{} has no file name", source.display()),
            )
        })?;

        let result = dest_dir.join(file_name);
        if Self::is_same_file(source, &result) {
            return Err(StageFailure::new(
                FailureKind::DestinationConflict,
                format!("destination is the source file: {}", result.display()),
            ));
        }

        debug!("Resolved destination: {} -> {}", source.display(), result.display());
        Ok(result)
    }

    /// Whether two paths name the same file, including hard links
    pub fn is_same_file(a: &Path, b: &Path) -> bool {
        let (Ok(a_meta), Ok(b_meta)) = (std::fs::metadata(a), std::fs::metadata(b)) else {
            return a == b;
        };
        if same_inode(&a_meta, &b_meta) {
            return true;
        }
        match (a.canonicalize(), b.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        }
    }
}

#[cfg(unix)]
fn same_inode(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_inode(_a: &Metadata, _b: &Metadata) -> bool {
    false
}
