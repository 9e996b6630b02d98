//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore della libreria.
//!
//! ## Due famiglie di errori:
//! - `LibrarianError`: errori fatali (tool mancanti, configurazione invalida).
//!   Sono gli unici che escono dalla libreria come `Err`.
//! - `FailureKind` + `StageFailure`: fallimenti di un singolo file. Non vengono
//!   mai propagati: finiscono dentro il `MediaRecord` e nel riepilogo finale.
//!
//! ## Esempio:
//! ```rust,ignore
//! if !ffmpeg.exists() {
//!     return Err(LibrarianError::MissingDependency("ffmpeg".to_string()));
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fatal errors: the batch cannot even start
#[derive(thiserror::Error, Debug)]
pub enum LibrarianError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Closed set of reasons a single file can fail the pipeline.
///
/// The first failure recorded on a file wins; later stages never run.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    #[error("failed to resolve realpath")]
    PathResolution,

    #[error("destination path doesn't exist")]
    DestinationMissing,

    #[error("destination path isn't a directory")]
    DestinationNotDirectory,

    #[error("destination would overwrite a file of this batch")]
    DestinationConflict,

    #[error("failed to launch media tool")]
    ProbeLaunch,

    #[error("failed to read a usable duration")]
    ProbeParse,

    #[error("failed media integrity test")]
    MediaCorrupt,

    #[error("media decode timed out")]
    DecodeTimeout,

    #[error("failed checksum on source file")]
    SourceChecksumIo,

    #[error("failed checksum on copied file")]
    DestChecksumIo,

    #[error("failed to copy media")]
    CopyIo,

    #[error("failed checksum validation")]
    ChecksumMismatch,
}

impl FailureKind {
    /// Stable snake_case name, identical to the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PathResolution => "path_resolution",
            Self::DestinationMissing => "destination_missing",
            Self::DestinationNotDirectory => "destination_not_directory",
            Self::DestinationConflict => "destination_conflict",
            Self::ProbeLaunch => "probe_launch",
            Self::ProbeParse => "probe_parse",
            Self::MediaCorrupt => "media_corrupt",
            Self::DecodeTimeout => "decode_timeout",
            Self::SourceChecksumIo => "source_checksum_io",
            Self::DestChecksumIo => "dest_checksum_io",
            Self::CopyIo => "copy_io",
            Self::ChecksumMismatch => "checksum_mismatch",
        }
    }
}

/// A failure kind plus the free-text diagnostic that explains it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl StageFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_includes_detail() {
        let failure = StageFailure::new(FailureKind::MediaCorrupt, "Invalid NAL unit size");
        assert_eq!(
            failure.to_string(),
            "failed media integrity test: Invalid NAL unit size"
        );

        let bare = StageFailure::new(FailureKind::ChecksumMismatch, "");
        assert_eq!(bare.to_string(), "failed checksum validation");
    }

    #[test]
    fn test_as_str_matches_serialized_name() {
        let kinds = [
            FailureKind::PathResolution,
            FailureKind::DestinationMissing,
            FailureKind::DestinationNotDirectory,
            FailureKind::DestinationConflict,
            FailureKind::ProbeLaunch,
            FailureKind::ProbeParse,
            FailureKind::MediaCorrupt,
            FailureKind::DecodeTimeout,
            FailureKind::SourceChecksumIo,
            FailureKind::DestChecksumIo,
            FailureKind::CopyIo,
            FailureKind::ChecksumMismatch,
        ];
        for kind in kinds {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json.as_str(), Some(kind.as_str()), "{:?}", kind);
        }
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::DestinationNotDirectory).unwrap();
        assert_eq!(json, "\"destination_not_directory\"");
    }
}
