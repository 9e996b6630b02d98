//! # Media Record Module
//!
//! Questo modulo traccia lo stato di un singolo file lungo la pipeline.
//!
//! ## Stati (solo in avanti):
//! `Created → DestinationResolved → IntegrityVerified → SourceChecksummed →
//! Copied → DestChecksummed → Validated`
//!
//! ## Regole:
//! - Tutte le mutazioni passano da un'unica funzione, [`MediaRecord::apply`]
//! - Il primo fallimento è definitivo: `succeeded` non torna mai a `true`
//!   e gli esiti successivi vengono ignorati
//! - `Validated` si raggiunge solo se i due digest coincidono, altrimenti
//!   il record fallisce con `ChecksumMismatch`
//! - La sola validazione salta `DestinationResolved`
//!
//! ## Pipeline per file:
//! - [`MediaRecord::verify`]: solo il probe di integrità
//! - [`MediaRecord::shelve`]: destinazione → integrità → checksum → copia → checksum

use crate::checksum::checksum_file;
use crate::copier::copy_file;
use crate::error::{FailureKind, StageFailure};
use crate::path_resolver::{PathResolver, ResolvedSource};
use crate::prober::IntegrityProber;
use crate::progress::ProgressSink;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pipeline position of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    DestinationResolved,
    IntegrityVerified,
    SourceChecksummed,
    Copied,
    DestChecksummed,
    Validated,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::DestinationResolved => "destination resolved",
            Self::IntegrityVerified => "integrity verified",
            Self::SourceChecksummed => "source checksummed",
            Self::Copied => "copied",
            Self::DestChecksummed => "destination checksummed",
            Self::Validated => "validated",
        };
        write!(f, "{}", name)
    }
}

/// Result of one stage, fed to [`MediaRecord::apply`]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    DestinationResolved(PathBuf),
    IntegrityVerified { media_duration: f64, elapsed: Duration },
    SourceChecksummed(String),
    Copied { elapsed: Duration },
    DestChecksummed(String),
    IntegrityFailed { failure: StageFailure, elapsed: Duration },
    CopyFailed { failure: StageFailure, elapsed: Duration },
    Failed(StageFailure),
}

impl Outcome {
    /// Stage this outcome moves the record to
    fn target(&self) -> Option<Stage> {
        match self {
            Self::DestinationResolved(_) => Some(Stage::DestinationResolved),
            Self::IntegrityVerified { .. } => Some(Stage::IntegrityVerified),
            Self::SourceChecksummed(_) => Some(Stage::SourceChecksummed),
            Self::Copied { .. } => Some(Stage::Copied),
            Self::DestChecksummed(_) => Some(Stage::DestChecksummed),
            Self::IntegrityFailed { .. } | Self::CopyFailed { .. } | Self::Failed(_) => None,
        }
    }
}

/// Per-file state and outcome
#[derive(Debug, Clone, Serialize)]
pub struct MediaRecord {
    path: PathBuf,
    dest_path: Option<PathBuf>,
    stage: Stage,
    succeeded: bool,
    source_digest: Option<String>,
    dest_digest: Option<String>,
    failure_kind: Option<FailureKind>,
    failure_detail: Option<String>,
    #[serde(serialize_with = "serialize_millis")]
    probe_duration: Option<Duration>,
    #[serde(serialize_with = "serialize_millis")]
    copy_duration: Option<Duration>,
    file_size: Option<u64>,
    media_duration: Option<f64>,
}

fn serialize_millis<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

impl MediaRecord {
    /// Record for a source that resolved to a real file
    pub fn new(source: ResolvedSource) -> Self {
        Self {
            path: source.path,
            dest_path: None,
            stage: Stage::Created,
            succeeded: true,
            source_digest: None,
            dest_digest: None,
            failure_kind: None,
            failure_detail: None,
            probe_duration: None,
            copy_duration: None,
            file_size: Some(source.size),
            media_duration: None,
        }
    }

    /// Record for a source that could not be resolved; already terminal
    pub fn unresolved(path: PathBuf, failure: StageFailure) -> Self {
        let mut record = Self::new(ResolvedSource { path, size: 0 });
        record.file_size = None;
        record.apply(Outcome::Failed(failure));
        record
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dest_path(&self) -> Option<&Path> {
        self.dest_path.as_deref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn source_digest(&self) -> Option<&str> {
        self.source_digest.as_deref()
    }

    pub fn dest_digest(&self) -> Option<&str> {
        self.dest_digest.as_deref()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure_kind
    }

    pub fn failure_detail(&self) -> Option<&str> {
        self.failure_detail.as_deref()
    }

    pub fn probe_duration(&self) -> Option<Duration> {
        self.probe_duration
    }

    pub fn copy_duration(&self) -> Option<Duration> {
        self.copy_duration
    }

    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    pub fn media_duration(&self) -> Option<f64> {
        self.media_duration
    }

    /// Human readable failure, e.g. `failed media integrity test: <detail>`
    pub fn failure_text(&self) -> Option<String> {
        let kind = self.failure_kind?;
        Some(StageFailure::new(kind, self.failure_detail.clone().unwrap_or_default()).to_string())
    }

    /// Stages that may precede `target`
    fn allowed_from(target: Stage) -> &'static [Stage] {
        match target {
            Stage::Created => &[],
            Stage::DestinationResolved => &[Stage::Created],
            Stage::IntegrityVerified => &[Stage::Created, Stage::DestinationResolved],
            Stage::SourceChecksummed => &[Stage::IntegrityVerified],
            Stage::Copied => &[Stage::SourceChecksummed],
            Stage::DestChecksummed => &[Stage::Copied],
            Stage::Validated => &[Stage::DestChecksummed],
        }
    }

    /// The only place a record changes state.
    ///
    /// Returns `true` when the outcome was accepted and the record is still
    /// healthy. Outcomes on a failed record and out-of-order outcomes are
    /// ignored.
    pub fn apply(&mut self, outcome: Outcome) -> bool {
        if !self.succeeded {
            debug!("Ignoring {:?} for failed record {}", outcome, self.path.display());
            return false;
        }

        if let Some(target) = outcome.target() {
            if !Self::allowed_from(target).contains(&self.stage) {
                warn!(
                    "Rejected transition {} -> {} for {}",
                    self.stage,
                    target,
                    self.path.display()
                );
                return false;
            }
            if target == Stage::Copied && self.dest_path.is_none() {
                warn!("Rejected copy without a destination for {}", self.path.display());
                return false;
            }
        }

        match outcome {
            Outcome::DestinationResolved(dest) => {
                self.dest_path = Some(dest);
                self.stage = Stage::DestinationResolved;
            }
            Outcome::IntegrityVerified { media_duration, elapsed } => {
                self.media_duration = Some(media_duration);
                self.probe_duration = Some(elapsed);
                self.stage = Stage::IntegrityVerified;
            }
            Outcome::SourceChecksummed(digest) => {
                self.source_digest = Some(digest);
                self.stage = Stage::SourceChecksummed;
            }
            Outcome::Copied { elapsed } => {
                self.copy_duration = Some(elapsed);
                self.stage = Stage::Copied;
            }
            Outcome::DestChecksummed(digest) => {
                self.dest_digest = Some(digest);
                self.stage = Stage::DestChecksummed;

                if self.source_digest == self.dest_digest {
                    self.stage = Stage::Validated;
                } else {
                    let detail = format!(
                        "source {} != destination {}",
                        self.source_digest.as_deref().unwrap_or("-"),
                        self.dest_digest.as_deref().unwrap_or("-")
                    );
                    self.fail(StageFailure::new(FailureKind::ChecksumMismatch, detail));
                }
            }
            Outcome::IntegrityFailed { failure, elapsed } => {
                self.probe_duration = Some(elapsed);
                self.fail(failure);
            }
            Outcome::CopyFailed { failure, elapsed } => {
                self.copy_duration = Some(elapsed);
                self.fail(failure);
            }
            Outcome::Failed(failure) => self.fail(failure),
        }

        self.succeeded
    }

    fn fail(&mut self, failure: StageFailure) {
        warn!("{}: {}", self.path.display(), failure);
        self.succeeded = false;
        self.failure_kind = Some(failure.kind);
        self.failure_detail = Some(failure.detail);
    }

    /// Run the integrity stage only
    pub async fn verify(&mut self, prober: &IntegrityProber) {
        if !self.succeeded {
            return;
        }

        let started = Instant::now();
        let outcome = match prober.verify(&self.path).await {
            Ok(media_duration) => Outcome::IntegrityVerified {
                media_duration,
                elapsed: started.elapsed(),
            },
            Err(failure) => Outcome::IntegrityFailed {
                failure,
                elapsed: started.elapsed(),
            },
        };

        if self.apply(outcome) {
            info!(
                "Validated {} in {:.2}s",
                self.path.display(),
                started.elapsed().as_secs_f64()
            );
        }
    }

    /// Resolve `<dest_dir>/<file name>` for this record
    pub fn resolve_destination(&mut self, dest_dir: &Path) -> bool {
        let outcome = match PathResolver::destination_for(&self.path, dest_dir) {
            Ok(dest) => Outcome::DestinationResolved(dest),
            Err(failure) => Outcome::Failed(failure),
        };
        self.apply(outcome)
    }

    /// Run the full verify, copy, verify pipeline into `dest_dir`.
    ///
    /// A destination already resolved by the cart is kept as is.
    pub async fn shelve(&mut self, dest_dir: &Path, prober: &IntegrityProber, sink: &dyn ProgressSink) {
        if !self.succeeded {
            return;
        }
        if self.stage == Stage::Created && !self.resolve_destination(dest_dir) {
            return;
        }

        self.verify(prober).await;
        if !self.succeeded {
            return;
        }

        let outcome = match checksum_file(&self.path).await {
            Ok(digest) => Outcome::SourceChecksummed(digest),
            Err(e) => Outcome::Failed(StageFailure::new(FailureKind::SourceChecksumIo, e.to_string())),
        };
        if !self.apply(outcome) {
            return;
        }

        let Some(dest) = self.dest_path.clone() else {
            return;
        };

        info!("Copying {} -> {}", self.path.display(), dest.display());
        let started = Instant::now();
        let outcome = match copy_file(&self.path, &dest, sink).await {
            Ok(bytes) => {
                debug!("Copied {} bytes to {}", bytes, dest.display());
                Outcome::Copied {
                    elapsed: started.elapsed(),
                }
            }
            Err(e) => Outcome::CopyFailed {
                failure: StageFailure::new(FailureKind::CopyIo, e.to_string()),
                elapsed: started.elapsed(),
            },
        };
        if !self.apply(outcome) {
            return;
        }

        let outcome = match checksum_file(&dest).await {
            Ok(digest) => Outcome::DestChecksummed(digest),
            Err(e) => Outcome::Failed(StageFailure::new(FailureKind::DestChecksumIo, e.to_string())),
        };
        if self.apply(outcome) {
            info!("✅ {} shelved and checksum verified", self.path.display());
        }
    }
}
