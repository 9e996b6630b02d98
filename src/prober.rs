//! # Integrity Prober Module
//!
//! Questo modulo decide se un file media è strutturalmente valido.
//!
//! ## Pipeline di verifica:
//! 1. **Duration probe**: `ffprobe` legge la durata (secondi) dal container.
//!    Una durata nulla o non disponibile è un fallimento, non un valore da
//!    propagare (evita divisioni per zero nel calcolo della percentuale).
//! 2. **Decode pass**: `ffmpeg` decodifica l'intero stream verso un sink nullo,
//!    con progresso machine-readable su stdout e soli errori su stderr.
//!
//! ## Monitoraggio dei due canali:
//! - **stderr**: la prima riga non vuota è la prova della corruzione. Il
//!   processo viene ucciso subito e il probe fallisce con `MediaCorrupt`.
//! - **stdout**: `out_time_ms=` produce la percentuale, `progress=end` la
//!   notifica di completamento.
//! - Il segnale di kill è one-shot: solo il primo errore lo consuma.
//! - Il probe ritorna solo dopo l'uscita (o il kill) del processo e dopo che
//!   entrambi i lettori hanno terminato, con un periodo di grazia limitato.
//!
//! ## Accelerazione hardware:
//! Con `use_hwaccel` vengono aggiunti i flag VAAPI. Cambia solo l'invocazione
//! del tool, non la macchina a stati.
//!
//! ## Esempio:
//! ```rust,ignore
//! let prober = IntegrityProber::new(options, sink);
//! let duration = prober.verify(&path).await?;
//! ```

use crate::args;
use crate::config::MediaOptions;
use crate::error::{FailureKind, StageFailure};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::utils::command_line;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a channel reader may keep running once the decoder is gone
const READER_GRACE: Duration = Duration::from_secs(2);

/// Progress key emitted by `-progress pipe:1` (microseconds, despite the name)
const OUT_TIME_KEY: &str = "out_time_ms=";
/// End-of-stream marker emitted by `-progress pipe:1`
const PROGRESS_END: &str = "progress=end";

/// How the decode process came to an end
enum DecodeEnd {
    Exited(ExitStatus),
    Corrupt(String),
    TimedOut(Duration),
    WaitFailed(std::io::Error),
}

/// Runs the duration probe and the full decode pass for one file
pub struct IntegrityProber {
    options: MediaOptions,
    sink: Arc<dyn ProgressSink>,
}

impl IntegrityProber {
    pub fn new(options: MediaOptions, sink: Arc<dyn ProgressSink>) -> Self {
        Self { options, sink }
    }

    /// Probe the duration, then decode the whole stream.
    ///
    /// Returns the probed duration in seconds.
    pub async fn verify(&self, path: &Path) -> Result<f64, StageFailure> {
        let duration = self.probe_duration(path).await?;

        self.sink.emit(ProgressEvent::AnalysisStarted {
            path: path.to_path_buf(),
        });

        match self.decode(path, duration).await {
            Ok(()) => Ok(duration),
            Err(failure) => {
                self.sink.emit(ProgressEvent::AnalysisAborted {
                    path: path.to_path_buf(),
                    reason: failure.kind.to_string(),
                });
                Err(failure)
            }
        }
    }

    /// Ask ffprobe for the container duration, in seconds
    pub async fn probe_duration(&self, path: &Path) -> Result<f64, StageFailure> {
        let args = args![
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ];
        info!("{} {}", command_line(&self.options.ffprobe_path, &args), path.display());

        let output = Command::new(&self.options.ffprobe_path)
            .args(&args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                StageFailure::new(
                    FailureKind::ProbeLaunch,
                    format!("failed to start {}: {}", self.options.ffprobe_path.display(), e),
                )
            })?;

        if !output.status.success() {
            return Err(StageFailure::new(
                FailureKind::ProbeParse,
                format!(
                    "ffprobe exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let duration = parse_duration(&stdout)?;
        debug!("Duration of {}: {:.3}s", path.display(), duration);
        Ok(duration)
    }

    /// Arguments for the full decode pass
    pub fn decode_args(&self, path: &Path) -> Vec<OsString> {
        let mut command: Vec<String> = Vec::new();
        if self.options.use_hwaccel {
            command.extend(args![
                "-init_hw_device",
                format!(
                    "vaapi=va:{},driver={}",
                    self.options.hwaccel_device, self.options.hwaccel_driver
                ),
                "-hwaccel",
                "vaapi",
                "-hwaccel_output_format",
                "vaapi",
            ]);
        }
        command.extend(args!["-v", "error", "-i"]);

        // The input path may not be valid UTF-8, so it goes in as an OsString
        let mut command: Vec<OsString> = command.into_iter().map(OsString::from).collect();
        command.push(path.as_os_str().to_os_string());
        command.extend(
            args!["-f", "null", "-", "-progress", "pipe:1"]
                .into_iter()
                .map(OsString::from),
        );
        command
    }

    /// Decode the stream to a null sink, aborting on the first error line
    pub async fn decode(&self, path: &Path, duration: f64) -> Result<(), StageFailure> {
        let args = self.decode_args(path);
        info!("{}", command_line(&self.options.ffmpeg_path, &args));

        let mut child = Command::new(&self.options.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                StageFailure::new(
                    FailureKind::ProbeLaunch,
                    format!("failed to start {}: {}", self.options.ffmpeg_path.display(), e),
                )
            })?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                return Err(StageFailure::new(
                    FailureKind::ProbeLaunch,
                    "decoder output channels unavailable",
                ))
            }
        };

        let (corrupt_tx, mut corrupt_rx) = oneshot::channel::<String>();
        let stderr_task = tokio::spawn(watch_errors(stderr, corrupt_tx));
        let stdout_task = tokio::spawn(watch_progress(
            stdout,
            path.to_path_buf(),
            duration,
            Arc::clone(&self.sink),
        ));

        let limit = self.options.decode_timeout;
        let deadline = async move {
            match limit {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        let end = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => DecodeEnd::Exited(status),
                Err(e) => DecodeEnd::WaitFailed(e),
            },
            Ok(line) = &mut corrupt_rx => DecodeEnd::Corrupt(line),
            limit = deadline => DecodeEnd::TimedOut(limit),
        };

        if matches!(end, DecodeEnd::Corrupt(_) | DecodeEnd::TimedOut(_)) {
            debug!("Killing decoder for {}", path.display());
            if let Err(e) = child.kill().await {
                warn!("Failed to kill decoder for {}: {}", path.display(), e);
            }
        }

        let first_error = drain_reader(stderr_task).await;
        drain_reader(stdout_task).await;

        match end {
            DecodeEnd::Corrupt(line) => Err(StageFailure::new(
                FailureKind::MediaCorrupt,
                format!("aborted due to error output: {}", line),
            )),
            DecodeEnd::TimedOut(limit) => Err(StageFailure::new(
                FailureKind::DecodeTimeout,
                format!("decoder still running after {}s", limit.as_secs_f64()),
            )),
            DecodeEnd::WaitFailed(e) => Err(StageFailure::new(
                FailureKind::MediaCorrupt,
                format!("failed waiting for decoder: {}", e),
            )),
            DecodeEnd::Exited(status) => match first_error {
                Some(line) => Err(StageFailure::new(
                    FailureKind::MediaCorrupt,
                    format!("aborted due to error output: {}", line),
                )),
                None if !status.success() => Err(StageFailure::new(
                    FailureKind::MediaCorrupt,
                    format!("ffmpeg exited with error: {}", status),
                )),
                None => Ok(()),
            },
        }
    }
}

/// Parse the single duration line printed by ffprobe
pub fn parse_duration(output: &str) -> Result<f64, StageFailure> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");

    let duration: f64 = line.parse().map_err(|_| {
        StageFailure::new(
            FailureKind::ProbeParse,
            format!("unparseable duration '{}'", line),
        )
    })?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(StageFailure::new(
            FailureKind::ProbeParse,
            format!("duration is zero or unavailable ({})", line),
        ));
    }

    Ok(duration)
}

/// Percentage complete for an `out_time_ms=` value against the probed duration
pub fn progress_percent(out_time: &str, duration: f64) -> Option<f64> {
    if duration <= 0.0 {
        return None;
    }
    let micros: f64 = out_time.trim().parse().ok()?;
    Some(micros / 1_000_000.0 / duration * 100.0)
}

/// Read one line as lossy UTF-8; `None` at end of stream
async fn next_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    let n = reader.read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(buf).trim_end().to_string()))
}

/// Drain stderr; the first non-blank line fires the kill signal.
///
/// Later lines are read and dropped so the decoder never blocks on a full pipe.
async fn watch_errors<R: AsyncRead + Unpin>(stderr: R, signal: oneshot::Sender<String>) -> Option<String> {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut signal = Some(signal);
    let mut first_error = None;

    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                let line = line.trim();
                if first_error.is_none() && !line.is_empty() {
                    warn!("Decoder reported: {}", line);
                    if let Some(signal) = signal.take() {
                        let _ = signal.send(line.to_string());
                    }
                    first_error = Some(line.to_string());
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading stderr: {}", e);
                break;
            }
        }
    }

    first_error
}

/// Turn `-progress pipe:1` output into progress events
async fn watch_progress<R: AsyncRead + Unpin>(
    stdout: R,
    path: PathBuf,
    duration: f64,
    sink: Arc<dyn ProgressSink>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                if let Some(value) = line.strip_prefix(OUT_TIME_KEY) {
                    if let Some(percent) = progress_percent(value, duration) {
                        sink.emit(ProgressEvent::Analyzing {
                            path: path.clone(),
                            percent,
                        });
                    }
                } else if line.starts_with(PROGRESS_END) {
                    info!("Done analyzing {}", path.display());
                    sink.emit(ProgressEvent::AnalysisFinished { path: path.clone() });
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading decoder progress: {}", e);
                break;
            }
        }
    }
}

/// Wait for a reader task, aborting it if it outlives the grace period
async fn drain_reader<T: Default>(mut handle: JoinHandle<T>) -> T {
    match tokio::time::timeout(READER_GRACE, &mut handle).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!("Channel reader failed: {}", e);
            T::default()
        }
        Err(_) => {
            warn!("Channel reader still blocked after {:?}, aborting it", READER_GRACE);
            handle.abort();
            T::default()
        }
    }
}
