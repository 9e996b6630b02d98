//! # Tool Path Resolver
//!
//! Finds the two external media tools the pipeline depends on:
//! - explicitly configured paths
//! - system `PATH`
//! - the conventional `/usr/bin` location

use crate::config::{Config, MediaOptions};
use crate::error::LibrarianError;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Media-analysis tool used for the duration probe
pub const FFPROBE: &str = "ffprobe";
/// Media-decoding tool used for the full decode pass
pub const FFMPEG: &str = "ffmpeg";

/// Tool path resolver
pub struct ToolPathResolver {
    /// Value of `PATH` captured at construction
    search_path: Option<OsString>,
    /// Last-resort directory
    fallback_dir: PathBuf,
}

impl ToolPathResolver {
    /// Create a resolver over the current process `PATH`
    pub fn new() -> Self {
        Self {
            search_path: env::var_os("PATH"),
            fallback_dir: PathBuf::from("/usr/bin"),
        }
    }

    /// Create a resolver over an explicit search path (tests, sandboxes)
    pub fn with_search_path(search_path: impl Into<OsString>, fallback_dir: impl Into<PathBuf>) -> Self {
        Self {
            search_path: Some(search_path.into()),
            fallback_dir: fallback_dir.into(),
        }
    }

    /// Resolve the path to a specific tool, preferring an explicit one
    pub fn resolve_tool(&self, tool_name: &str, configured: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = configured {
            debug!("Using configured {}: {}", tool_name, path.display());
            return path.is_file().then(|| path.to_path_buf());
        }

        if let Some(system_path) = self.find_in_search_path(tool_name) {
            debug!("Using system tool: {} -> {}", tool_name, system_path.display());
            return Some(system_path);
        }

        let fallback = self.fallback_dir.join(Self::executable_name(tool_name));
        if fallback.is_file() {
            debug!("Using fallback tool: {} -> {}", tool_name, fallback.display());
            return Some(fallback);
        }

        warn!("Tool not found: {}", tool_name);
        None
    }

    fn executable_name(tool_name: &str) -> String {
        let extension = if cfg!(windows) { ".exe" } else { "" };
        format!("{}{}", tool_name, extension)
    }

    /// Find tool in the captured search path
    fn find_in_search_path(&self, tool_name: &str) -> Option<PathBuf> {
        let tool_with_ext = Self::executable_name(tool_name);

        env::split_paths(self.search_path.as_ref()?)
            .map(|dir| dir.join(&tool_with_ext))
            .find(|path| path.is_file())
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.resolve_tool(tool_name, None).is_some()
    }

    /// Resolve both tools, or explain how to install what is missing
    pub fn resolve_options(&self, config: &Config) -> Result<MediaOptions, LibrarianError> {
        let ffmpeg = self.check_tool_with_instructions(FFMPEG, config.ffmpeg_path.as_deref());
        let ffprobe = self.check_tool_with_instructions(FFPROBE, config.ffprobe_path.as_deref());

        match (ffmpeg, ffprobe) {
            (Ok(ffmpeg), Ok(ffprobe)) => Ok(MediaOptions::new(config, ffmpeg, ffprobe)),
            (ffmpeg, ffprobe) => {
                let missing: Vec<String> = [ffmpeg.err(), ffprobe.err()].into_iter().flatten().collect();
                Err(LibrarianError::MissingDependency(missing.join("\n\n")))
            }
        }
    }

    /// Get installation instructions for a tool on Linux
    fn get_linux_install_instructions(&self, tool_name: &str) -> String {
        match tool_name {
            FFMPEG | FFPROBE => "sudo apt-get install ffmpeg".to_string(),
            _ => format!("sudo apt-get install {}", tool_name),
        }
    }

    /// Check if a tool is available and provide installation instructions if not
    pub fn check_tool_with_instructions(
        &self,
        tool_name: &str,
        configured: Option<&Path>,
    ) -> Result<PathBuf, String> {
        if let Some(path) = self.resolve_tool(tool_name, configured) {
            return Ok(path);
        }

        if let Some(path) = configured {
            return Err(format!(
                "Tool '{}' not found at configured path {}",
                tool_name,
                path.display()
            ));
        }

        if cfg!(target_os = "linux") {
            Err(format!(
                "Tool '{}' not found in system PATH.\n\
                To install on Linux, run:\n  {}",
                tool_name,
                self.get_linux_install_instructions(tool_name)
            ))
        } else {
            Err(format!("Tool '{}' not found. Please ensure it's installed.", tool_name))
        }
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}
