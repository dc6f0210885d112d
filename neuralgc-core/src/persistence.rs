//! Shared persistence utilities: atomic file writes, exclusive creation, JSON load.
//!
//! Result bundles are the durable "completed" marker for a run, so they must
//! never be observable half-written at their canonical path. Every writer
//! stages into a uniquely named sibling and renames into place.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Serialize `data` as pretty JSON and [`atomic_write`] it to `path`.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Stage `data` in a sibling file, fsync it, and rename it onto `path`,
/// creating parent directories as needed.
///
/// The temporary name carries a fresh UUID, so two processes racing on the
/// same target never share a staging file; the last rename wins. On any
/// failure the staging file is removed and the target is left untouched.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = staging_path(path);
    let staged = write_and_sync(&tmp, data).and_then(|()| std::fs::rename(&tmp, path));
    if let Err(e) = staged {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Create `path` exclusively and write `data` into it.
///
/// Fails with [`io::ErrorKind::AlreadyExists`] if the file is already there.
pub fn create_exclusive(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = file.write_all(data).and_then(|()| file.sync_all()) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

/// Read a JSON file; a missing file is `Ok(None)`, a malformed one
/// [`io::ErrorKind::InvalidData`].
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

fn write_and_sync(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Marker {
        identity: String,
        best_nepoch: Vec<usize>,
    }

    fn marker() -> Marker {
        Marker {
            identity: "expt_nepoch=10_lr=1.000000e-02".into(),
            best_nepoch: vec![10, 5],
        }
    }

    fn staged_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[test]
    fn test_bundle_written_then_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Lorenz MLP Encoding").join("expt_seed=1.json");

        atomic_write_json(&path, &marker()).unwrap();
        assert_eq!(load_json::<Marker>(&path).unwrap(), Some(marker()));
        assert_eq!(staged_files(path.parent().unwrap()), 0);
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("expt_seed=2.json");
        assert!(load_json::<Marker>(&missing).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expt_seed=3.json");
        std::fs::write(&path, b"{ truncated").unwrap();
        let err = load_json::<Marker>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_last_rename_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expt_seed=4.json");

        atomic_write(&path, b"first writer").unwrap();
        atomic_write(&path, b"second writer").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second writer");
    }

    #[test]
    fn test_failed_rename_cleans_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory squats on the target, so the rename fails.
        let path = dir.path().join("occupied");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        assert!(atomic_write(&path, b"data").is_err());
        assert!(path.is_dir());
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[test]
    fn test_create_exclusive_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep_20240101_000000.job");

        create_exclusive(&path, b"line\n").unwrap();
        let err = create_exclusive(&path, b"other\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line\n");
    }
}
