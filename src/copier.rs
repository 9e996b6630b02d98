//! # Copy Engine
//!
//! Copies a source file byte-for-byte onto its destination, overwriting any
//! existing file, and reports progress as a percentage of the source size.
//!
//! A failed copy leaves the partial destination where it is; deciding whether
//! to clean it up is up to the caller.

use crate::checksum::CHUNK_SIZE;
use crate::progress::{ProgressEvent, ProgressSink};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Emits a progress event only when the whole-number percentage changes
struct CopyProgress<'a> {
    sink: &'a dyn ProgressSink,
    source: &'a Path,
    total: u64,
    written: u64,
    last_percent: Option<u8>,
}

impl<'a> CopyProgress<'a> {
    fn new(sink: &'a dyn ProgressSink, source: &'a Path, total: u64) -> Self {
        Self {
            sink,
            source,
            total,
            written: 0,
            last_percent: None,
        }
    }

    fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.written.min(self.total) as u128 * 100) / self.total as u128) as u8
    }

    fn advance(&mut self, n: usize) {
        self.written += n as u64;
        let percent = self.percent();
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            self.sink.emit(ProgressEvent::Copying {
                path: self.source.to_path_buf(),
                percent,
            });
        }
    }
}

/// Copy `source` to `dest`, returning the number of bytes written
pub async fn copy_file(source: &Path, dest: &Path, sink: &dyn ProgressSink) -> std::io::Result<u64> {
    let mut src_file = File::open(source).await?;
    let total = src_file.metadata().await?.len();
    let mut dst_file = File::create(dest).await?;

    sink.emit(ProgressEvent::CopyStarted {
        path: source.to_path_buf(),
        total_bytes: total,
    });

    let mut progress = CopyProgress::new(sink, source, total);
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = src_file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        dst_file.write_all(&buffer[..n]).await?;
        progress.advance(n);
    }

    dst_file.flush().await?;
    dst_file.sync_all().await?;

    sink.emit(ProgressEvent::CopyFinished {
        path: source.to_path_buf(),
        bytes: progress.written,
    });

    Ok(progress.written)
}
