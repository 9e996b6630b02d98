//! # Progress Reporting Module
//!
//! Questo modulo gestisce le notifiche di avanzamento emesse dalla pipeline.
//!
//! ## Responsabilità:
//! - Definisce `ProgressEvent`, gli eventi emessi durante analisi e copia
//! - Definisce il trait `ProgressSink`, iniettato nell'orchestratore
//! - Fornisce tre implementazioni:
//!   - `ConsoleProgress`: una progress bar `indicatif` per file
//!   - `LogProgress`: eventi inoltrati a `tracing`
//!   - `NoProgress`: scarta tutto
//!
//! Ogni evento porta il path sorgente, così file elaborati in parallelo
//! non mescolano mai le proprie righe.
//!
//! ## Visual feedback:
//! ```text
//! ⠋ analyze clip.mp4 [██████████████████░░░░░░░░░░░░░░░░░░░░░░]  45%
//! ⠙ copy    clip.mp4 [████████████████████████████░░░░░░░░░░░░]  70%
//! ```

use crate::utils::file_label;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Progress notification emitted while a record moves through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    AnalysisStarted { path: PathBuf },
    Analyzing { path: PathBuf, percent: f64 },
    AnalysisFinished { path: PathBuf },
    AnalysisAborted { path: PathBuf, reason: String },
    CopyStarted { path: PathBuf, total_bytes: u64 },
    Copying { path: PathBuf, percent: u8 },
    CopyFinished { path: PathBuf, bytes: u64 },
}

impl ProgressEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::AnalysisStarted { path }
            | Self::Analyzing { path, .. }
            | Self::AnalysisFinished { path }
            | Self::AnalysisAborted { path, .. }
            | Self::CopyStarted { path, .. }
            | Self::Copying { path, .. }
            | Self::CopyFinished { path, .. } => path.as_path(),
        }
    }
}

/// Receiver of progress notifications
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events to the tracing facade at DEBUG level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::AnalysisStarted { path } => debug!("Analyzing {}", path.display()),
            ProgressEvent::Analyzing { path, percent } => {
                debug!("Analyzing {}: {:.2}%", path.display(), percent)
            }
            ProgressEvent::AnalysisFinished { path } => debug!("Analysis done: {}", path.display()),
            ProgressEvent::AnalysisAborted { path, reason } => {
                debug!("Analysis aborted for {}: {}", path.display(), reason)
            }
            ProgressEvent::CopyStarted { path, total_bytes } => {
                debug!("Copying {} ({} bytes)", path.display(), total_bytes)
            }
            ProgressEvent::Copying { path, percent } => {
                debug!("Copying {}: {}%", path.display(), percent)
            }
            ProgressEvent::CopyFinished { path, bytes } => {
                debug!("Copy complete. Copied {} bytes for {}", bytes, path.display())
            }
        }
    }
}

/// One `indicatif` bar per file and stage, grouped in a `MultiProgress`
pub struct ConsoleProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<PathBuf, ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:7} {msg} [{bar:40.cyan/blue}] {pos:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    fn start_bar(&self, path: &Path, prefix: &'static str) {
        let bar = self.multi.add(ProgressBar::new(100));
        bar.set_style(Self::style());
        bar.set_prefix(prefix);
        bar.set_message(file_label(path));
        bar.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut bars) = self.bars.lock() {
            if let Some(previous) = bars.insert(path.to_path_buf(), bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn set_position(&self, path: &Path, percent: u64) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(path) {
                bar.set_position(percent.min(100));
            }
        }
    }

    fn abandon_bar(&self, path: &Path, reason: &str) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(bar) = bars.remove(path) {
                bar.abandon_with_message(format!("{} ✗ {}", file_label(path), reason));
            }
        }
    }

    fn finish_bar(&self, path: &Path) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(bar) = bars.remove(path) {
                bar.set_position(100);
                bar.finish_and_clear();
            }
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn emit(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::AnalysisStarted { path } => self.start_bar(path, "analyze"),
            ProgressEvent::Analyzing { path, percent } => {
                self.set_position(path, percent.max(0.0).round() as u64)
            }
            ProgressEvent::AnalysisAborted { path, reason } => self.abandon_bar(path, reason),
            ProgressEvent::CopyStarted { path, .. } => self.start_bar(path, "copy"),
            ProgressEvent::Copying { path, percent } => self.set_position(path, u64::from(*percent)),
            ProgressEvent::AnalysisFinished { path } | ProgressEvent::CopyFinished { path, .. } => {
                self.finish_bar(path)
            }
        }
    }
}
