//! Shared helpers for unit tests: stub media tools and an event recorder.

use crate::config::{Config, MediaOptions};
use crate::progress::{ProgressEvent, ProgressSink};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Collects every emitted event in order
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Write an executable `/bin/sh` script into `dir`
#[cfg(unix)]
pub fn write_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// ffprobe stub that prints a fixed duration
#[cfg(unix)]
pub fn ffprobe_printing(dir: &Path, output: &str) -> PathBuf {
    write_stub(dir, "ffprobe", &format!("echo '{}'", output))
}

/// ffmpeg stub that decodes cleanly and reports progress on stdout
#[cfg(unix)]
pub fn healthy_ffmpeg(dir: &Path) -> PathBuf {
    write_stub(
        dir,
        "ffmpeg",
        "echo 'out_time_ms=2500000'\n\
         echo 'progress=continue'\n\
         echo 'out_time_ms=5000000'\n\
         echo 'progress=end'\n\
         exit 0",
    )
}

/// ffmpeg stub that reports one decode error and then hangs
#[cfg(unix)]
pub fn corrupt_ffmpeg(dir: &Path) -> PathBuf {
    write_stub(
        dir,
        "ffmpeg",
        "echo 'out_time_ms=1000000'\n\
         echo '[h264 @ 0x55] Invalid NAL unit size' >&2\n\
         exec sleep 30",
    )
}

/// Options pointing at the given stub tools
pub fn options_for(ffmpeg: PathBuf, ffprobe: PathBuf) -> MediaOptions {
    MediaOptions::new(&Config::default(), ffmpeg, ffprobe)
}
