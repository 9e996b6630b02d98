//! # Report Module
//!
//! Questo modulo trasforma un `Cart` concluso in un riepilogo leggibile.
//!
//! ## Responsabilità:
//! - `BatchStats`: conteggi aggregati (successi, fallimenti per tipo, byte copiati)
//! - `render_table`: una riga per record, come la tabella della CLI
//! - `render_json`: la lista dei record serializzata
//!
//! ## Formato tabella:
//! ```text
//! Summary:
//! true   clip.mp4                                 9f86d081884c7d659a2feaa0c5 9f86d081884c7d659a2feaa0c5
//! false  broken.mkv                                                                                     failed media integrity test: ...
//! ```

use crate::cart::Cart;
use crate::error::LibrarianError;
use crate::file_manager::FileManager;
use crate::media::{MediaRecord, Stage};
use serde::Serialize;
use std::collections::BTreeMap;

/// Width of the digest columns in the table
const DIGEST_WIDTH: usize = 33;

/// Aggregate figures for one batch
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes_copied: u64,
    pub failures: BTreeMap<String, usize>,
}

impl BatchStats {
    pub fn from_cart(cart: &Cart) -> Self {
        let mut stats = Self::default();
        for record in cart.records() {
            stats.add(record);
        }
        stats
    }

    fn add(&mut self, record: &MediaRecord) {
        self.total += 1;
        if record.succeeded() {
            self.succeeded += 1;
            if record.stage() == Stage::Validated {
                self.bytes_copied += record.file_size().unwrap_or(0);
            }
        } else {
            self.failed += 1;
            let kind = record.failure_kind().map(|kind| kind.as_str()).unwrap_or("unknown");
            *self.failures.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    pub fn format_summary(&self) -> String {
        let mut summary = format!(
            "Processed: {} files | Succeeded: {} | Failed: {} | Copied: {}",
            self.total,
            self.succeeded,
            self.failed,
            FileManager::format_size(self.bytes_copied)
        );

        if !self.failures.is_empty() {
            let breakdown: Vec<String> = self
                .failures
                .iter()
                .map(|(kind, count)| format!("{}={}", kind, count))
                .collect();
            summary.push_str(&format!(" ({})", breakdown.join(", ")));
        }

        summary
    }
}

fn truncate(value: Option<&str>, width: usize) -> &str {
    let value = value.unwrap_or("");
    match value.char_indices().nth(width) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

/// One line per record: state, file name, both digests, failure
pub fn render_table(cart: &Cart) -> String {
    let mut out = String::from("Summary:\n");
    for record in cart.records() {
        let line = format!(
            "{:<6} {:<40} {:<dw$} {:<dw$} {}",
            record.succeeded(),
            crate::utils::file_label(record.path()),
            truncate(record.source_digest(), DIGEST_WIDTH),
            truncate(record.dest_digest(), DIGEST_WIDTH),
            record.failure_text().unwrap_or_default(),
            dw = DIGEST_WIDTH,
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// The record list as pretty JSON
pub fn render_json(cart: &Cart) -> Result<String, LibrarianError> {
    Ok(serde_json::to_string_pretty(cart)?)
}

/// Planned `source -> destination` pairs for a dry run
pub fn render_plan(cart: &Cart) -> String {
    let mut out = String::new();
    for record in cart.records() {
        match (record.dest_path(), record.failure_text()) {
            (Some(dest), None) => {
                out.push_str(&format!("{} -> {}\n", record.path().display(), dest.display()))
            }
            (_, failure) => out.push_str(&format!(
                "{} -> (skipped: {})\n",
                record.path().display(),
                failure.unwrap_or_default()
            )),
        }
    }
    out
}
