//! # Media Librarian - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Bootstrap della directory di configurazione (`<config dir>/librarian`)
//! - Inizializzazione del logging con `tracing`: console + file JSON
//! - Risoluzione dei tool esterni e avvio del `Librarian`
//! - Stampa del riepilogo nel formato richiesto
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Carica `config.json` (creandolo con i default se manca) e applica i flag
//! 3. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 4. Verifica che ffmpeg e ffprobe esistano
//! 5. Esegue `validate` o `shelf` e stampa il riepilogo
//!
//! ## Esempio di utilizzo:
//! ```bash
//! librarian validate ~/Videos/2024 --recursive
//! librarian shelf clip1.mp4 clip2.mkv /mnt/archive/ --hwaccel --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use media_librarian::file_manager::FileManager;
use media_librarian::{
    render_json, render_plan, render_table, BatchStats, Cart, Config, ConsoleProgress, Librarian,
    LogProgress, ProgressSink, SummaryFormat, ToolPathResolver,
};

const APP_DIR: &str = "librarian";
const CONFIG_FILE: &str = "config.json";
const LOG_FILE: &str = "librarian.log";

#[derive(Parser)]
#[command(name = "librarian")]
#[command(about = "Verify, copy and checksum media files so nothing is lost in transit")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Decode through VAAPI hardware acceleration
    #[arg(long, global = true)]
    hwaccel: bool,

    /// Summary format (table or json)
    #[arg(short, long, global = true)]
    format: Option<SummaryFormat>,

    /// Dry run - only print what would be copied
    #[arg(short, long, global = true)]
    dry_run: bool,

    /// No log output on the console
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the ffmpeg binary
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    /// Path to the ffprobe binary
    #[arg(long, global = true)]
    ffprobe: Option<PathBuf>,

    /// Number of files processed in parallel
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Give up on a decode after this many seconds
    #[arg(long, global = true)]
    decode_timeout: Option<u64>,

    /// Expand directory sources into the media files they contain
    #[arg(short, long, global = true)]
    recursive: bool,

    /// Exit with an error status when any file fails
    #[arg(long, global = true)]
    fail_on_error: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check the integrity of media files without copying them
    Validate {
        /// Media files to check
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
    /// Copy media files into a directory, verifying them before and after
    Shelf {
        /// Media files to copy, followed by the destination directory
        #[arg(required = true, num_args = 2.., value_name = "SOURCE... DEST")]
        paths: Vec<PathBuf>,
    },
}

impl Args {
    /// Command line flags take precedence over the config file
    fn apply_to(&self, config: &mut Config) {
        if self.hwaccel {
            config.use_hwaccel = true;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if self.quiet {
            config.console_output = false;
        }
        if let Some(ref ffmpeg) = self.ffmpeg {
            config.ffmpeg_path = Some(ffmpeg.clone());
        }
        if let Some(ref ffprobe) = self.ffprobe {
            config.ffprobe_path = Some(ffprobe.clone());
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(timeout) = self.decode_timeout {
            config.decode_timeout_secs = Some(timeout);
        }
    }
}

/// Create `<config dir>/librarian` if needed and return it
fn bootstrap_config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine the user config directory")?;
    let dir = base.join(APP_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    Ok(dir)
}

/// Console layer (unless quiet) plus a JSON layer appending to the log file
fn init_logging(config_dir: &Path, console: bool, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_path = config_dir.join(LOG_FILE);
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let console_layer = console.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });
    let file_layer = fmt::layer()
        .json()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    Ok(())
}

/// Log the outcome as one structured event and print it in the chosen format
fn print_summary(cart: &Cart, format: SummaryFormat) -> Result<()> {
    let stats = BatchStats::from_cart(cart);
    let json = render_json(cart)?;
    info!(
        total = stats.total,
        succeeded = stats.succeeded,
        failed = stats.failed,
        data = %json,
        "summary"
    );

    match format {
        SummaryFormat::Table => {
            print!("{}", render_table(cart));
            println!("{}", stats.format_summary());
        }
        SummaryFormat::Json => println!("{}", json),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = bootstrap_config_dir()?;
    let config_path = config_dir.join(CONFIG_FILE);
    let mut config = Config::from_file(&config_path)
        .await
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if !config_path.exists() {
        config.save_to_file(&config_path).await?;
    }
    args.apply_to(&mut config);

    init_logging(&config_dir, config.console_output, args.verbose)?;
    debug!("Using config from {}: {:?}", config_path.display(), config);
    config.validate()?;

    let options = ToolPathResolver::new().resolve_options(&config)?;
    info!(
        "Using ffmpeg at {} and ffprobe at {}",
        options.ffmpeg_path.display(),
        options.ffprobe_path.display()
    );

    let sink: Arc<dyn ProgressSink> = if config.console_output {
        Arc::new(ConsoleProgress::new())
    } else {
        Arc::new(LogProgress)
    };
    let librarian = Librarian::new(options, sink)?;

    let cart = match args.command {
        Command::Validate { ref sources } => {
            let sources = FileManager::expand_sources(sources, args.recursive);
            librarian.validate_files(&sources).await
        }
        Command::Shelf { ref paths } => {
            let Some((destination, sources)) = paths.split_last() else {
                anyhow::bail!("shelf needs at least one source and a destination");
            };
            let sources = FileManager::expand_sources(sources, args.recursive);

            if config.dry_run {
                info!("Dry run: nothing will be copied");
                let cart = librarian.plan_move(&sources, destination);
                print!("{}", render_plan(&cart));
                return Ok(());
            }

            librarian.move_files(&sources, destination).await
        }
    };

    print_summary(&cart, config.format)?;

    if args.fail_on_error && cart.has_failures() {
        let failed = cart.records().iter().filter(|r| !r.succeeded()).count();
        anyhow::bail!("{} of {} file(s) failed", failed, cart.len());
    }

    Ok(())
}
