//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` persistita in `<config dir>/config.json`
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Definisce `MediaOptions`, la vista risolta e immutabile usata dalla pipeline
//!
//! ## Parametri di configurazione:
//! - `ffmpeg_path` / `ffprobe_path`: path espliciti dei tool (default: ricerca nel PATH)
//! - `use_hwaccel`: abilita la decodifica VAAPI (default: false)
//! - `hwaccel_device` / `hwaccel_driver`: device e driver VAAPI
//! - `dry_run`: mostra le azioni senza eseguirle (default: false)
//! - `format`: formato del riepilogo, `table` o `json` (default: table)
//! - `workers`: file elaborati in parallelo (default: 1, sequenziale)
//! - `decode_timeout_secs`: limite per la decodifica completa (default: nessuno)
//! - `console_output`: log su console (default: true)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     use_hwaccel: true,
//!     workers: 2,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::LibrarianError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How the batch summary is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
    #[default]
    Table,
    Json,
}

impl FromStr for SummaryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown summary format '{}' (expected table or json)", other)),
        }
    }
}

impl fmt::Display for SummaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Configuration for the librarian
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit ffmpeg binary (None = look it up)
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit ffprobe binary (None = look it up)
    pub ffprobe_path: Option<PathBuf>,
    /// Decode through VAAPI
    pub use_hwaccel: bool,
    /// VAAPI render node
    pub hwaccel_device: String,
    /// VAAPI driver name
    pub hwaccel_driver: String,
    /// Dry run - only print the actions that would be taken
    pub dry_run: bool,
    /// Summary format
    pub format: SummaryFormat,
    /// Number of files driven through the pipeline at the same time
    pub workers: usize,
    /// Upper bound for one full decode pass, in seconds
    pub decode_timeout_secs: Option<u64>,
    /// Emit logs on the console
    pub console_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            use_hwaccel: false,
            hwaccel_device: "/dev/dri/renderD128".to_string(),
            hwaccel_driver: "iHD".to_string(),
            dry_run: false,
            format: SummaryFormat::Table,
            workers: 1,
            decode_timeout_secs: None,
            console_output: true,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), LibrarianError> {
        if self.workers == 0 {
            return Err(LibrarianError::Config(
                "Number of workers must be greater than 0".to_string(),
            ));
        }

        if self.decode_timeout_secs == Some(0) {
            return Err(LibrarianError::Config(
                "Decode timeout must be greater than 0 seconds".to_string(),
            ));
        }

        for (name, path) in [("ffmpeg", &self.ffmpeg_path), ("ffprobe", &self.ffprobe_path)] {
            if let Some(path) = path {
                if !path.is_file() {
                    return Err(LibrarianError::Config(format!(
                        "Configured {} does not exist: {}",
                        name,
                        path.display()
                    )));
                }
            }
        }

        if self.use_hwaccel && self.hwaccel_device.trim().is_empty() {
            return Err(LibrarianError::Config(
                "Hardware acceleration needs a device".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from file, falling back to defaults when it is missing
    pub async fn from_file(path: &Path) -> Result<Self, LibrarianError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<(), LibrarianError> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// Resolved, per-run options handed to every pipeline stage.
///
/// Built by [`crate::tool_resolver::ToolPathResolver::resolve_options`], so
/// both tool paths point at files that existed when the run started.
#[derive(Debug, Clone)]
pub struct MediaOptions {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub use_hwaccel: bool,
    pub hwaccel_device: String,
    pub hwaccel_driver: String,
    pub dry_run: bool,
    pub workers: usize,
    pub decode_timeout: Option<Duration>,
}

impl MediaOptions {
    /// Combine a validated config with already resolved tool paths
    pub fn new(config: &Config, ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            use_hwaccel: config.use_hwaccel,
            hwaccel_device: config.hwaccel_device.clone(),
            hwaccel_driver: config.hwaccel_driver.clone(),
            dry_run: config.dry_run,
            workers: config.workers.max(1),
            decode_timeout: config.decode_timeout_secs.map(Duration::from_secs),
        }
    }
}
