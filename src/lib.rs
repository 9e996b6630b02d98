//! # Media Librarian Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione persistita e opzioni risolte per run
//! - `error`: Errori fatali e tassonomia dei fallimenti per file
//! - `tool_resolver`: Ricerca di ffmpeg/ffprobe
//! - `path_resolver`: Risoluzione di sorgenti e destinazione
//! - `checksum`: Digest SHA-256 in streaming
//! - `prober`: Probe della durata e decodifica completa con kill al primo errore
//! - `copier`: Copia byte per byte con progresso
//! - `media`: Macchina a stati per singolo file
//! - `cart`: Batch di file e orchestratore `Librarian`
//! - `progress`: Notifiche di avanzamento iniettabili
//! - `report`: Riepilogo tabellare e JSON
//! - `file_manager`: Espansione delle directory sorgente
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use media_librarian::{Config, Librarian, ToolPathResolver, LogProgress};
//!
//! let options = ToolPathResolver::new().resolve_options(&Config::default())?;
//! let librarian = Librarian::new(options, Arc::new(LogProgress))?;
//! let cart = librarian.move_files(&sources, &destination).await;
//! println!("{}", render_table(&cart));
//! ```

pub mod cart;
pub mod checksum;
pub mod config;
pub mod copier;
pub mod error;
pub mod file_manager;
pub mod media;
pub mod path_resolver;
pub mod prober;
pub mod progress;
pub mod report;
pub mod tool_resolver;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use cart::{Cart, Librarian};
pub use config::{Config, MediaOptions, SummaryFormat};
pub use error::{FailureKind, LibrarianError, StageFailure};
pub use media::{MediaRecord, Stage};
pub use progress::{ConsoleProgress, LogProgress, NoProgress, ProgressEvent, ProgressSink};
pub use report::{render_json, render_plan, render_table, BatchStats};
pub use tool_resolver::ToolPathResolver;
