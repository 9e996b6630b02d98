//! # Cart Module
//!
//! Questo modulo contiene il batch di file (`Cart`) e l'orchestratore
//! (`Librarian`) che lo fa avanzare lungo la pipeline.
//!
//! ## Responsabilità:
//! - **Cart**: mappa ordinata path risolto → `MediaRecord`
//!   - l'ordine è quello di inserimento
//!   - i duplicati collassano in un solo record (vince l'ultimo)
//!   - un path non risolvibile resta nel batch come record fallito
//!   - ogni destinazione appartiene a un solo record e non può coincidere
//!     con un sorgente del batch
//! - **Librarian**: le operazioni pubbliche
//!   - `validate_files`: solo il probe di integrità, nessuna scrittura
//!   - `move_files`: verify → copy → verify per ogni record
//!   - `plan_move`: solo la risoluzione dei path (dry run)
//!
//! ## Concorrenza:
//! Con `workers == 1` i record vengono elaborati uno alla volta, in ordine.
//! Con più worker lo stream è limitato (`buffered`) e conserva l'ordine;
//! ogni record in volo è posseduto da un solo task.

use crate::config::MediaOptions;
use crate::error::{FailureKind, LibrarianError, StageFailure};
use crate::media::{MediaRecord, Outcome};
use crate::path_resolver::PathResolver;
use crate::prober::IntegrityProber;
use crate::progress::ProgressSink;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Insertion-ordered batch of media records, keyed by resolved source path
#[derive(Debug, Default, Serialize)]
pub struct Cart {
    #[serde(rename = "media")]
    records: Vec<MediaRecord>,
    #[serde(skip)]
    index: HashMap<PathBuf, usize>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cart by resolving every input path
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut cart = Self::new();
        for path in paths {
            cart.add_media(path.as_ref());
        }
        cart
    }

    /// Resolve `raw` and add its record.
    ///
    /// A path that cannot be resolved is still added, already failed, so
    /// that every input shows up in the summary.
    pub fn add_media(&mut self, raw: &Path) {
        let record = match PathResolver::resolve_source(raw) {
            Ok(source) => MediaRecord::new(source),
            Err(failure) => MediaRecord::unresolved(PathResolver::fallback_key(raw), failure),
        };
        self.insert(record);
    }

    fn insert(&mut self, record: MediaRecord) {
        match self.index.get(record.path()) {
            Some(&position) => {
                debug!("Duplicate source collapsed: {}", record.path().display());
                self.records[position] = record;
            }
            None => {
                self.index.insert(record.path().to_path_buf(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<&MediaRecord> {
        self.index.get(path).map(|&position| &self.records[position])
    }

    pub fn records(&self) -> &[MediaRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        self.records.iter().any(|record| !record.succeeded())
    }

    /// Resolve the destination of every healthy record, without touching any file.
    ///
    /// Records are claimed in insertion order. A destination that is already
    /// claimed by an earlier record, or that is a source of this batch, fails
    /// the later record with `DestinationConflict`.
    pub fn resolve_destinations(&mut self, destination: &Path) {
        let mut claimed: HashMap<PathBuf, PathBuf> = self
            .index
            .keys()
            .map(|source| (source.clone(), source.clone()))
            .collect();

        for record in self.records.iter_mut() {
            if !record.succeeded() {
                continue;
            }
            let outcome = match PathResolver::destination_for(record.path(), destination) {
                Ok(dest) => match claimed.get(&dest) {
                    Some(owner) => Outcome::Failed(StageFailure::new(
                        FailureKind::DestinationConflict,
                        format!("{} is already claimed by {}", dest.display(), owner.display()),
                    )),
                    None => {
                        claimed.insert(dest.clone(), record.path().to_path_buf());
                        Outcome::DestinationResolved(dest)
                    }
                },
                Err(failure) => Outcome::Failed(failure),
            };
            record.apply(outcome);
        }
    }

    /// Drive every record through `step`, at most `workers` at a time.
    ///
    /// Records come back in insertion order, so the index stays valid.
    async fn drive<F, Fut>(&mut self, workers: usize, step: F)
    where
        F: FnMut(MediaRecord) -> Fut,
        Fut: Future<Output = MediaRecord>,
    {
        let records = std::mem::take(&mut self.records);
        self.records = stream::iter(records)
            .map(step)
            .buffered(workers.max(1))
            .collect()
            .await;
    }
}

/// Entry point of the library: owns the resolved options and the prober
pub struct Librarian {
    options: MediaOptions,
    sink: Arc<dyn ProgressSink>,
    prober: IntegrityProber,
}

impl Librarian {
    /// Fails unless both external tools are present
    pub fn new(options: MediaOptions, sink: Arc<dyn ProgressSink>) -> Result<Self, LibrarianError> {
        for (name, path) in [("ffmpeg", &options.ffmpeg_path), ("ffprobe", &options.ffprobe_path)] {
            if !path.is_file() {
                return Err(LibrarianError::MissingDependency(format!(
                    "{} not found at {}",
                    name,
                    path.display()
                )));
            }
        }

        let prober = IntegrityProber::new(options.clone(), Arc::clone(&sink));
        Ok(Self {
            options,
            sink,
            prober,
        })
    }

    pub fn options(&self) -> &MediaOptions {
        &self.options
    }

    /// Run the integrity probe on every source; nothing is written
    pub async fn validate_files<P: AsRef<Path>>(&self, paths: &[P]) -> Cart {
        let mut cart = Cart::from_paths(paths);
        info!("🔍 Validating {} file(s) with {} worker(s)", cart.len(), self.options.workers);

        let started = Instant::now();
        let prober = &self.prober;
        cart.drive(self.options.workers, move |mut record| async move {
            record.verify(prober).await;
            record
        })
        .await;

        info!("Validation finished in {:.2}s", started.elapsed().as_secs_f64());
        cart
    }

    /// Verify, copy and re-verify every source into `destination`
    pub async fn move_files<P: AsRef<Path>>(&self, paths: &[P], destination: &Path) -> Cart {
        let mut cart = Cart::from_paths(paths);
        info!(
            "📦 Starting cart copying routine: {} file(s) -> {}",
            cart.len(),
            destination.display()
        );
        cart.resolve_destinations(destination);

        let started = Instant::now();
        let prober = &self.prober;
        let sink = self.sink.as_ref();
        cart.drive(self.options.workers, move |mut record| async move {
            record.shelve(destination, prober, sink).await;
            record
        })
        .await;

        info!("Copying routine finished in {:.2}s", started.elapsed().as_secs_f64());
        cart
    }

    /// Resolve sources and destinations only, for dry runs
    pub fn plan_move<P: AsRef<Path>>(&self, paths: &[P], destination: &Path) -> Cart {
        let mut cart = Cart::from_paths(paths);
        cart.resolve_destinations(destination);
        cart
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Stage;
    use crate::progress::NoProgress;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_duplicates_collapse_to_one_record() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.mp4");
        fs::write(&file, b"data").unwrap();
        let other_spelling = dir.path().join(".").join("a.mp4");

        let cart = Cart::from_paths(&[file.clone(), file.clone(), other_spelling]);
        assert_eq!(cart.len(), 1);
        assert!(cart.get(&file.canonicalize().unwrap()).is_some());
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let dir = TempDir::new().unwrap();
        let names = ["c.mkv", "a.mkv", "b.mkv"];
        let paths: Vec<PathBuf> = names.iter().map(|n| dir.path().join(n)).collect();
        for path in &paths {
            fs::write(path, b"x").unwrap();
        }

        let cart = Cart::from_paths(&[&paths[0], &paths[1], &paths[2], &paths[0]]);
        let order: Vec<String> = cart
            .records()
            .iter()
            .map(|r| r.path().file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(order, names);
    }

    #[test]
    fn test_unresolvable_path_stays_in_cart() {
        let dir = TempDir::new().unwrap();
        let cart = Cart::from_paths(&[dir.path().join("ghost.mp4")]);

        assert_eq!(cart.len(), 1);
        assert!(cart.has_failures());
        assert_eq!(cart.records()[0].failure_kind(), Some(FailureKind::PathResolution));
    }

    #[test]
    fn test_librarian_requires_both_tools() {
        let dir = TempDir::new().unwrap();
        let options = crate::test_support::options_for(dir.path().join("ffmpeg"), dir.path().join("ffprobe"));
        let result = Librarian::new(options, Arc::new(NoProgress));
        assert!(matches!(result, Err(LibrarianError::MissingDependency(_))));
    }

    #[cfg(unix)]
    mod end_to_end {
        use super::*;
        use crate::test_support::{
            corrupt_ffmpeg, ffprobe_printing, healthy_ffmpeg, options_for, RecordingProgress,
        };
        use std::time::Duration;

        struct Workspace {
            _root: TempDir,
            tools: PathBuf,
            media: PathBuf,
            out: PathBuf,
        }

        impl Workspace {
            fn new() -> Self {
                let root = TempDir::new().unwrap();
                let tools = root.path().join("tools");
                let media = root.path().join("media");
                let out = root.path().join("out");
                for dir in [&tools, &media, &out] {
                    fs::create_dir(dir).unwrap();
                }
                Self {
                    _root: root,
                    tools,
                    media,
                    out,
                }
            }

            fn media_file(&self, name: &str, content: &[u8]) -> PathBuf {
                let path = self.media.join(name);
                fs::write(&path, content).unwrap();
                path
            }

            fn librarian(&self, ffmpeg: PathBuf, duration: &str, sink: Arc<dyn ProgressSink>) -> Librarian {
                let ffprobe = ffprobe_printing(&self.tools, duration);
                Librarian::new(options_for(ffmpeg, ffprobe), sink).unwrap()
            }

            fn healthy(&self) -> Librarian {
                self.librarian(healthy_ffmpeg(&self.tools), "12.5", Arc::new(NoProgress))
            }
        }

        fn listing(dir: &Path) -> Vec<PathBuf> {
            let mut entries: Vec<PathBuf> = fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect();
            entries.sort();
            entries
        }

        #[tokio::test]
        async fn test_move_duplicate_source_succeeds_once() {
            let ws = Workspace::new();
            let source = ws.media_file("a.mp4", b"some video bytes");
            let librarian = ws.healthy();

            let cart = librarian.move_files(&[source.clone(), source.clone()], &ws.out).await;

            assert_eq!(cart.len(), 1);
            let record = &cart.records()[0];
            assert!(record.succeeded(), "{:?}", record.failure_text());
            assert_eq!(record.stage(), Stage::Validated);
            assert!(record.source_digest().is_some());
            assert_eq!(record.source_digest(), record.dest_digest());
            assert_eq!(record.media_duration(), Some(12.5));
            assert!(record.copy_duration().is_some());

            let copied = ws.out.canonicalize().unwrap().join("a.mp4");
            assert_eq!(record.dest_path(), Some(copied.as_path()));
            assert_eq!(fs::read(&copied).unwrap(), b"some video bytes");
        }

        #[tokio::test]
        async fn test_missing_destination_runs_no_stage() {
            let ws = Workspace::new();
            let source = ws.media_file("a.mp4", b"bytes");
            let sink = Arc::new(RecordingProgress::default());
            let librarian = ws.librarian(healthy_ffmpeg(&ws.tools), "12.5", sink.clone());

            let cart = librarian.move_files(&[source], &ws.out.join("missing")).await;

            let record = &cart.records()[0];
            assert_eq!(record.failure_kind(), Some(FailureKind::DestinationMissing));
            assert_eq!(record.stage(), Stage::Created);
            assert_eq!(record.source_digest(), None);
            assert_eq!(record.probe_duration(), None);
            assert!(sink.events().is_empty());
        }

        #[tokio::test]
        async fn test_zero_duration_stops_before_copy() {
            let ws = Workspace::new();
            let source = ws.media_file("a.mp4", b"bytes");
            let librarian = ws.librarian(healthy_ffmpeg(&ws.tools), "0", Arc::new(NoProgress));

            let cart = librarian.move_files(&[source], &ws.out).await;

            let record = &cart.records()[0];
            assert_eq!(record.failure_kind(), Some(FailureKind::ProbeParse));
            assert_eq!(record.source_digest(), None);
            assert!(listing(&ws.out).is_empty());
        }

        #[tokio::test]
        async fn test_corrupt_media_is_never_copied() {
            let ws = Workspace::new();
            let source = ws.media_file("broken.mkv", b"bytes");
            let librarian = ws.librarian(corrupt_ffmpeg(&ws.tools), "12.5", Arc::new(NoProgress));

            let cart = tokio::time::timeout(
                Duration::from_secs(15),
                librarian.move_files(&[source], &ws.out),
            )
            .await
            .expect("corrupt decode was not aborted");

            let record = &cart.records()[0];
            assert!(!record.succeeded());
            assert_eq!(record.failure_kind(), Some(FailureKind::MediaCorrupt));
            assert!(record.failure_detail().unwrap().contains("Invalid NAL unit size"));
            assert_eq!(record.stage(), Stage::DestinationResolved);
            assert!(listing(&ws.out).is_empty());
        }

        #[tokio::test]
        async fn test_failure_does_not_abort_siblings() {
            let ws = Workspace::new();
            let good = ws.media_file("good.mp4", b"good");
            let ghost = ws.media.join("ghost.mp4");
            let librarian = ws.healthy();

            let cart = librarian.move_files(&[ghost, good], &ws.out).await;

            assert_eq!(cart.len(), 2);
            assert_eq!(cart.records()[0].failure_kind(), Some(FailureKind::PathResolution));
            assert!(cart.records()[1].succeeded());
            assert!(cart.has_failures());
        }

        #[tokio::test]
        async fn test_validate_writes_nothing() {
            let ws = Workspace::new();
            let a = ws.media_file("a.mp4", b"a");
            let b = ws.media_file("b.mp4", b"b");
            let before = listing(&ws.media);
            let librarian = ws.healthy();

            let cart = librarian.validate_files(&[a, b]).await;

            assert_eq!(cart.len(), 2);
            for record in cart.records() {
                assert!(record.succeeded());
                assert_eq!(record.stage(), Stage::IntegrityVerified);
                assert_eq!(record.dest_path(), None);
                assert_eq!(record.source_digest(), None);
            }
            assert_eq!(listing(&ws.media), before);
            assert!(listing(&ws.out).is_empty());
        }

        #[tokio::test]
        async fn test_parallel_workers_keep_order() {
            let ws = Workspace::new();
            let names = ["3.mp4", "1.mp4", "2.mp4", "0.mp4"];
            let sources: Vec<PathBuf> = names.iter().map(|n| ws.media_file(n, n.as_bytes())).collect();

            let mut options = options_for(healthy_ffmpeg(&ws.tools), ffprobe_printing(&ws.tools, "4"));
            options.workers = 3;
            let librarian = Librarian::new(options, Arc::new(NoProgress)).unwrap();

            let cart = librarian.move_files(&sources, &ws.out).await;

            let order: Vec<&str> = cart
                .records()
                .iter()
                .map(|r| r.path().file_name().unwrap().to_str().unwrap())
                .collect();
            assert_eq!(order, names);
            assert!(!cart.has_failures());
            assert_eq!(listing(&ws.out).len(), 4);
        }

        #[tokio::test]
        async fn test_shelving_into_the_source_directory_keeps_the_source() {
            let ws = Workspace::new();
            let source = ws.media_file("a.mp4", b"precious bytes");
            let librarian = ws.healthy();

            let cart = librarian.move_files(&[source.clone()], &ws.media).await;

            let record = &cart.records()[0];
            assert!(!record.succeeded());
            assert_eq!(record.failure_kind(), Some(FailureKind::DestinationConflict));
            assert_eq!(record.stage(), Stage::Created);
            assert_eq!(fs::read(&source).unwrap(), b"precious bytes");
        }

        #[tokio::test]
        async fn test_hard_linked_destination_keeps_the_source() {
            let ws = Workspace::new();
            let source = ws.media_file("a.mp4", b"precious bytes");
            fs::hard_link(&source, ws.out.join("a.mp4")).unwrap();
            let librarian = ws.healthy();

            let cart = librarian.move_files(&[source.clone()], &ws.out).await;

            let record = &cart.records()[0];
            assert_eq!(record.failure_kind(), Some(FailureKind::DestinationConflict));
            assert_eq!(fs::read(&source).unwrap(), b"precious bytes");
        }

        #[tokio::test]
        async fn test_same_file_name_from_two_directories_copies_once() {
            let ws = Workspace::new();
            let first_dir = ws.media.join("d1");
            let second_dir = ws.media.join("d2");
            fs::create_dir(&first_dir).unwrap();
            fs::create_dir(&second_dir).unwrap();
            let first = first_dir.join("a.mp4");
            let second = second_dir.join("a.mp4");
            fs::write(&first, b"first").unwrap();
            fs::write(&second, b"second").unwrap();
            let librarian = ws.healthy();

            let plan = librarian.plan_move(&[first.clone(), second.clone()], &ws.out);
            assert_eq!(plan.records()[0].stage(), Stage::DestinationResolved);
            assert_eq!(plan.records()[1].failure_kind(), Some(FailureKind::DestinationConflict));

            let cart = librarian.move_files(&[first, second], &ws.out).await;

            assert_eq!(cart.records()[0].stage(), Stage::Validated);
            let loser = &cart.records()[1];
            assert!(!loser.succeeded());
            assert_eq!(loser.failure_kind(), Some(FailureKind::DestinationConflict));
            assert_eq!(loser.source_digest(), None);
            assert_eq!(fs::read(ws.out.join("a.mp4")).unwrap(), b"first");
        }

        #[tokio::test]
        async fn test_destination_may_not_overwrite_another_source() {
            let ws = Workspace::new();
            let copy_target = ws.out.join("a.mp4");
            fs::write(&copy_target, b"also in the batch").unwrap();
            let source = ws.media_file("a.mp4", b"incoming");
            let librarian = ws.healthy();

            let cart = librarian.move_files(&[source, copy_target.clone()], &ws.out).await;

            assert_eq!(cart.records()[0].failure_kind(), Some(FailureKind::DestinationConflict));
            assert_eq!(fs::read(&copy_target).unwrap(), b"also in the batch");
        }

        #[tokio::test]
        async fn test_copy_failure_is_recorded_after_source_checksum() {
            let ws = Workspace::new();
            let source = ws.media_file("a.mp4", b"bytes");
            fs::create_dir(ws.out.join("a.mp4")).unwrap();
            let librarian = ws.healthy();

            let cart = librarian.move_files(&[source], &ws.out).await;

            let record = &cart.records()[0];
            assert!(!record.succeeded());
            assert_eq!(record.failure_kind(), Some(FailureKind::CopyIo));
            assert_eq!(record.stage(), Stage::SourceChecksummed);
            assert!(record.source_digest().is_some());
            assert_eq!(record.dest_digest(), None);
            assert!(record.copy_duration().is_some());
        }

        #[tokio::test]
        async fn test_plan_move_touches_nothing() {
            let ws = Workspace::new();
            let source = ws.media_file("a.mp4", b"a");
            let librarian = ws.healthy();

            let cart = librarian.plan_move(&[source], &ws.out);

            let record = &cart.records()[0];
            assert_eq!(record.stage(), Stage::DestinationResolved);
            assert!(record.dest_path().unwrap().ends_with("a.mp4"));
            assert!(listing(&ws.out).is_empty());
        }
    }
}
