//! # Utility Functions Module
//!
//! Small helpers for building and logging external tool invocations.

use std::ffi::OsStr;
use std::path::Path;

/// Converts any iterable of string-like items to `Vec<String>`.
///
/// Used to assemble ffmpeg/ffprobe argument lists without sprinkling
/// `.to_string()` on every literal.
///
/// # Example
/// ```rust
/// use media_librarian::utils::to_string_vec;
///
/// let args = to_string_vec(["-v", "error", "-show_entries", "format=duration"]);
/// assert_eq!(args.len(), 4);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Build an argument vector from heterogeneous items.
///
/// # Example
/// ```rust
/// use media_librarian::args;
///
/// let device = "/dev/dri/renderD128";
/// let args = args!["-init_hw_device", format!("vaapi=va:{}", device)];
/// assert_eq!(args[1], "vaapi=va:/dev/dri/renderD128");
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::utils::to_string_vec([$($item.to_string()),*])
    };
}

/// Render a program and its arguments as a single shell-like line for logging
pub fn command_line<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

/// Base name of a path, for compact console output
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
