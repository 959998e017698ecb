//! Append-only JSON array files, one per [`SeriesId`].
//!
//! A series is only ever rewritten as a whole: the new array is written to a temporary file next to the series,
//! synced and renamed over it. Readers therefore see either the old or the new array, never a partial one.

use crate::metrics::{
    SeriesId,
    Snapshot,
};
use serde_json::Value;
use std::{
    fs::{
        self,
        File,
    },
    io::{
        self,
        Write,
    },
    path::{
        Path,
        PathBuf,
    },
};
use strum::IntoEnumIterator;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode a {series} entry: {source}")]
    Encode {
        series: SeriesId,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    data_dir: PathBuf,
}

impl RecordStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self, series: SeriesId) -> PathBuf {
        self.data_dir.join(series.file_name())
    }

    /// Temporary file a series is written to before it is renamed into place. Hidden and ending in `.tmp`.
    pub fn temp_path(&self, series: SeriesId) -> PathBuf {
        self.data_dir.join(format!(".{}.tmp", series.file_name()))
    }

    /// Create the data directory and seed missing series files with an empty array. Temporary files left behind
    /// by an interrupted write are removed.
    pub fn prepare(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir).map_err(|source| StoreError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        for series in SeriesId::iter() {
            let temp_path = self.temp_path(series);
            if temp_path.exists() {
                warn!(%series, path = %temp_path.display(), "Removing leftover temporary file");
                fs::remove_file(&temp_path).map_err(|source| StoreError::Io {
                    path: temp_path.clone(),
                    source,
                })?;
            }

            let path = self.path(series);
            if !path.exists() {
                info!(%series, path = %path.display(), "Creating empty series");
                self.write(series, &[])?;
            }
        }
        Ok(())
    }

    /// All entries of a series in insertion order.
    ///
    /// A missing file is an empty series. So is a file that does not hold a JSON array, which is logged.
    pub fn load_raw(&self, series: SeriesId) -> Vec<Value> {
        let path = self.path(series);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(%series, path = %path.display(), %err, "Failed to read series, treating it as empty");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Value>(&content) {
            Ok(Value::Array(entries)) => entries,
            Ok(other) => {
                warn!(%series, path = %path.display(), kind = json_kind(&other), "Series is not a JSON array, treating it as empty");
                Vec::new()
            }
            Err(err) => {
                warn!(%series, path = %path.display(), %err, "Series is malformed, treating it as empty");
                Vec::new()
            }
        }
    }

    /// The entries of a series that can be read as `S`. Entries of an unknown shape are skipped.
    pub fn load<S: Snapshot>(&self) -> Vec<S> {
        self.load_raw(S::SERIES)
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value(entry) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    debug!(series = %S::SERIES, index, %err, "Skipping unreadable entry");
                    None
                }
            })
            .collect()
    }

    /// Append one entry and rewrite the series atomically. Existing entries are kept verbatim.
    pub fn append<S: Snapshot>(&self, entry: &S) -> Result<(), StoreError> {
        let series = S::SERIES;
        let entry = serde_json::to_value(entry).map_err(|source| StoreError::Encode { series, source })?;

        let mut entries = self.load_raw(series);
        entries.push(entry);
        self.write(series, &entries)?;

        debug!(%series, entries = entries.len(), "Appended entry");
        Ok(())
    }

    fn write(&self, series: SeriesId, entries: &[Value]) -> Result<(), StoreError> {
        let path = self.path(series);
        let content = serde_json::to_vec_pretty(entries).map_err(|source| StoreError::Encode { series, source })?;

        let temp_path = self.temp_path(series);
        let io_error = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let result = write_synced(&temp_path, &content).and_then(|()| fs::rename(&temp_path, &path));
        if let Err(err) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(io_error(err));
        }
        Ok(())
    }
}

fn write_synced(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
