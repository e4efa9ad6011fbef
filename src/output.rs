//! Persists the extracted value as plain decimal text
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{ProbeError, Result};

/// Fixed-point rendering with six fractional digits, e.g. `123.456000`
pub fn format_value(value: f64) -> String {
    format!("{:.6}", value)
}

/// Resolve `file_name` against `dir`, or against the current working directory
pub fn resolve_path(dir: Option<&Path>, file_name: &str) -> Result<PathBuf> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().map_err(ProbeError::WorkingDirectory)?,
    };
    Ok(dir.join(file_name))
}

/// Write the value to `path`, replacing any previous contents
pub fn write_value(path: &Path, value: f64) -> Result<()> {
    let text = format_value(value);
    debug!("Writing {} to {}", text, path.display());
    fs::write(path, text).map_err(|source| ProbeError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_format_matches_fixed_point() {
        assert_eq!(format_value(123.456), "123.456000");
        assert_eq!(format_value(0.0), "0.000000");
        assert_eq!(format_value(-1.5), "-1.500000");
        assert_eq!(format_value(2400.0), "2400.000000");
    }

    #[test]
    fn test_write_overwrites() {
        let dir = tempdir().unwrap();
        let path = resolve_path(Some(dir.path()), "metrics.txt").unwrap();

        write_value(&path, 1234.5678).unwrap();
        write_value(&path, 1.0).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "1.000000");
    }

    #[test]
    fn test_resolve_defaults_to_working_directory() {
        let path = resolve_path(None, "metrics.txt").unwrap();
        assert_eq!(path, std::env::current_dir().unwrap().join("metrics.txt"));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("metrics.txt");

        let err = write_value(&path, 1.0).unwrap_err();
        assert!(matches!(err, ProbeError::Write { .. }));
    }
}
