//! # File Manager Module
//!
//! Questo modulo prepara la lista dei sorgenti passati da riga di comando.
//!
//! ## Responsabilità:
//! - Espande le directory sorgente nei file media che contengono (`--recursive`)
//! - Riconosce i formati media per estensione
//! - Formatta le dimensioni in forma leggibile per il riepilogo
//!
//! ## Esempio:
//! ```rust,ignore
//! let sources = FileManager::expand_sources(&args.sources, true);
//! let cart = librarian.validate_files(&sources).await;
//! ```

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Container and stream extensions ffmpeg can decode
const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "mkv", "webm", "avi", "mts", "m2ts", "ts", "mpg", "mpeg", "wmv", "flv",
    "3gp", "mp3", "m4a", "aac", "flac", "wav", "ogg", "opus",
];

/// Discovers source files
pub struct FileManager;

impl FileManager {
    /// Expand directory sources into the media files below them.
    ///
    /// Files are always kept as given, whatever their extension. Without
    /// `recursive` directories are kept too, so they later fail resolution
    /// and show up in the summary.
    pub fn expand_sources(sources: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
        let mut expanded = Vec::new();

        for source in sources {
            if recursive && source.is_dir() {
                let found = Self::find_media_files(source);
                debug!("Found {} media file(s) under {}", found.len(), source.display());
                expanded.extend(found);
            } else {
                expanded.push(source.clone());
            }
        }

        expanded
    }

    /// All media files below `dir`, sorted for a stable processing order
    pub fn find_media_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| Self::is_media(path))
            .collect();

        files.sort();
        files
    }

    /// Check if a file looks like audio or video by its extension
    pub fn is_media(path: &Path) -> bool {
        match path.extension() {
            Some(ext) => {
                let ext_lower = ext.to_string_lossy().to_lowercase();
                MEDIA_EXTENSIONS.contains(&ext_lower.as_str())
            }
            None => false,
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_is_media() {
        assert!(FileManager::is_media(Path::new("holiday.MKV")));
        assert!(FileManager::is_media(Path::new("/a/b/song.flac")));
        assert!(!FileManager::is_media(Path::new("notes.txt")));
        assert!(!FileManager::is_media(Path::new("README")));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(1536), "1.50 KB");
        assert_eq!(FileManager::format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_expand_sources_recursive() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("2024/summer");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("b.mp4"), b"x").unwrap();
        fs::write(nested.join("a.mov"), b"x").unwrap();
        fs::write(nested.join("thumbs.db"), b"x").unwrap();
        let loose = dir.path().join("loose.bin");
        fs::write(&loose, b"x").unwrap();

        let expanded = FileManager::expand_sources(&[dir.path().to_path_buf(), loose.clone()], true);

        assert_eq!(
            expanded,
            vec![nested.join("a.mov"), dir.path().join("b.mp4"), loose]
        );
    }

    #[test]
    fn test_expand_sources_keeps_directories_without_recursion() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.mp4"), b"x").unwrap();

        let expanded = FileManager::expand_sources(&[dir.path().to_path_buf()], false);
        assert_eq!(expanded, vec![dir.path().to_path_buf()]);
    }
}
