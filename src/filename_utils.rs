// Copyright 2024-2025 Irreducible Inc.

use std::path::{Path, PathBuf};

use chrono::Utc;

/// Longest explicit log file path accepted, in bytes.
pub const PATH_NAME_MAX_LENGTH: usize = 4096;
/// Longest generated log file name, in bytes.
pub const FILE_NAME_MAX_LENGTH: usize = 1024;

/// `YYYYmmdd_HHMMSS` in UTC. One second resolution.
pub fn get_formatted_time() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Replace characters that would split a name component into directories
/// or confuse shells. Dots are kept so version strings stay readable.
pub fn sanitize_filename(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | ' ' => '-',
            c if c.is_control() => '-',
            _ => c,
        })
        .collect()
}

/// Path reported to callers for a log file.
///
/// Absolute paths are returned verbatim, relative ones are joined onto the
/// current working directory. The file itself is still opened with the path
/// as given.
pub fn resolve_for_reporting(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
