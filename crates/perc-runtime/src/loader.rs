//! Recorded frames on disk.
//!
//! A recording is a directory of `instance-{index}.json` archives with
//! zero-based, gap-free indices. Each archive is a JSON object mapping a
//! modality key (see [`DataType::key`]) to an array of rows; `null` stands
//! for NaN. Keys that are not a known modality are ignored.
//!
//! ```json
//! { "hesai_pointcloud": [[1.0, 2.0, 3.0, 12.0], [null, 0.5, 0.1, 3.0]] }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use perc_types::{DataBundle, DataType, Frame, PercError};
use tracing::debug;

const PREFIX: &str = "instance-";
const SUFFIX: &str = ".json";

/// Random access to the archives of one recording.
#[derive(Debug, Clone)]
pub struct FrameLoader {
    dir: PathBuf,
    count: usize,
}

impl FrameLoader {
    /// Index `dir`.
    ///
    /// # Errors
    ///
    /// [`PercError::Io`] when the directory cannot be listed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PercError> {
        let dir = dir.as_ref().to_path_buf();
        let entries = fs::read_dir(&dir)
            .map_err(|e| PercError::Io(format!("cannot list {}: {e}", dir.display())))?;
        let count = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| archive_index(&entry.file_name().to_string_lossy()).is_some())
            .count();
        debug!(dir = %dir.display(), frames = count, "recording opened");
        Ok(Self { dir, count })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of archives found when the recording was opened.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn path_of(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{PREFIX}{index}{SUFFIX}"))
    }

    /// Read archive `index`.
    ///
    /// # Errors
    ///
    /// - [`PercError::Io`] when the archive is missing or unreadable.
    /// - [`PercError::Validation`] when it is not a valid archive.
    pub fn load(&self, index: usize) -> Result<DataBundle, PercError> {
        let path = self.path_of(index);
        let raw = fs::read_to_string(&path)
            .map_err(|e| PercError::Io(format!("cannot read {}: {e}", path.display())))?;
        parse_archive(&raw)
            .map_err(|e| PercError::Validation(format!("{}: {e}", path.display())))
    }

    /// Every archive in index order.
    pub fn iter(&self) -> impl Iterator<Item = Result<DataBundle, PercError>> + '_ {
        (0..self.count).map(|i| self.load(i))
    }
}

fn archive_index(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix(PREFIX)?
        .strip_suffix(SUFFIX)?
        .parse()
        .ok()
}

/// Decode one archive body.
fn parse_archive(raw: &str) -> Result<DataBundle, String> {
    let modalities: HashMap<String, Vec<Vec<Option<f64>>>> =
        serde_json::from_str(raw).map_err(|e| e.to_string())?;

    let mut bundle = DataBundle::new();
    for (key, rows) in modalities {
        let Some(data_type) = DataType::from_key(&key) else {
            debug!(key = %key, "skipping unknown modality");
            continue;
        };
        let rows: Vec<Vec<f64>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect();
        let frame = Frame::from_rows(&rows).map_err(|e| format!("{key}: {e}"))?;
        bundle.insert(data_type, frame);
    }
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, index: usize, body: &str) {
        fs::write(dir.join(format!("instance-{index}.json")), body).unwrap();
    }

    #[test]
    fn counts_only_archives() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 0, "{}");
        write(dir.path(), 1, "{}");
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("instance-x.json"), "{}").unwrap();

        let loader = FrameLoader::open(dir.path()).unwrap();
        assert_eq!(loader.len(), 2);
        assert_eq!(loader.iter().filter(Result::is_ok).count(), 2);
    }

    #[test]
    fn loads_rows_with_null_as_nan() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            0,
            r#"{"hesai_pointcloud": [[1.0, 2.0, 3.0], [null, 1.0, 1.0]], "gps": [[1]]}"#,
        );
        let bundle = FrameLoader::open(dir.path()).unwrap().load(0).unwrap();
        assert_eq!(bundle.len(), 1);

        let frame = bundle.get(DataType::HesaiPointcloud).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.row(0), Some(&[1.0, 2.0, 3.0][..]));
        assert!(frame.row(1).unwrap()[0].is_nan());
    }

    #[test]
    fn missing_archive_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FrameLoader::open(dir.path()).unwrap();
        assert!(loader.is_empty());
        assert!(matches!(loader.load(3), Err(PercError::Io(_))));
    }

    #[test]
    fn malformed_archive_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 0, "[1, 2, 3]");
        write(dir.path(), 1, r#"{"hesai_pointcloud": [[1.0, 2.0, 3.0], [1.0]]}"#);
        let loader = FrameLoader::open(dir.path()).unwrap();
        assert!(matches!(loader.load(0), Err(PercError::Validation(_))));
        assert!(matches!(loader.load(1), Err(PercError::Validation(_))));
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        assert!(matches!(FrameLoader::open(gone), Err(PercError::Io(_))));
    }
}
