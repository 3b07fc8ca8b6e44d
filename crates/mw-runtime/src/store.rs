use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use mw_io::{IoError, read_series_csv_inputs, write_jsonl_string};
use mw_series::TimeSeries;
use serde_json::json;
use thiserror::Error;

use crate::manifest::{DatasetManifest, MetricOutputManifest};
use crate::object_path;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("storage I/O failed for {key}: {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },
    #[error("invalid JSON in {key}: {source}")]
    Json {
        key: String,
        source: serde_json::Error,
    },
    #[error("object {0} is not valid UTF-8")]
    Utf8(String),
    #[error(transparent)]
    Series(#[from] IoError),
    #[error("object store lock poisoned")]
    LockPoisoned,
}

/// Raw byte storage addressed by `/`-separated keys.
pub trait ObjectStore: Send + Sync {
    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), StoreError>;
    fn object_exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// Storage operations the run pipeline needs.
pub trait SeriesStore: Send + Sync {
    fn get_dataset_manifest(&self, path: &str) -> Result<DatasetManifest, StoreError>;

    /// Read one series from the CSV data files at `paths`.
    fn read_series(&self, paths: &[String], series_code: &str) -> Result<TimeSeries, StoreError>;

    /// Write the series as JSONL at `path`; returns the file names written.
    fn write_jsonl(&self, series: &TimeSeries, path: &str) -> Result<Vec<String>, StoreError>;

    fn write_manifest(&self, manifest: &MetricOutputManifest, path: &str) -> Result<(), StoreError>;

    fn run_marker_exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Writes `{"run_id": <file stem>}` at `path`.
    fn create_run_marker(&self, path: &str) -> Result<(), StoreError>;
}

fn decode_json<T: serde::de::DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Json {
        key: key.to_owned(),
        source,
    })
}

fn encode_json<T: serde::Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        key: key.to_owned(),
        source,
    })
}

impl<T: ObjectStore> SeriesStore for T {
    fn get_dataset_manifest(&self, path: &str) -> Result<DatasetManifest, StoreError> {
        let bytes = self.get_object(path)?;
        decode_json(path, &bytes)
    }

    fn read_series(&self, paths: &[String], series_code: &str) -> Result<TimeSeries, StoreError> {
        let contents = paths
            .iter()
            .map(|path| {
                let bytes = self.get_object(path)?;
                String::from_utf8(bytes).map_err(|_| StoreError::Utf8(path.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(read_series_csv_inputs(contents.as_slice(), series_code)?)
    }

    fn write_jsonl(&self, series: &TimeSeries, path: &str) -> Result<Vec<String>, StoreError> {
        let body = write_jsonl_string(series)?;
        self.put_object(path, body.as_bytes())?;
        Ok(vec![object_path::basename(path).to_owned()])
    }

    fn write_manifest(
        &self,
        manifest: &MetricOutputManifest,
        path: &str,
    ) -> Result<(), StoreError> {
        let body = encode_json(path, manifest)?;
        self.put_object(path, &body)
    }

    fn run_marker_exists(&self, path: &str) -> Result<bool, StoreError> {
        self.object_exists(path)
    }

    fn create_run_marker(&self, path: &str) -> Result<(), StoreError> {
        let body = encode_json(path, &json!({ "run_id": object_path::stem(path) }))?;
        self.put_object(path, &body)
    }
}

/// Object map behind a mutex. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        key: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Result<(), StoreError> {
        self.objects
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(object_path::normalize(&key.into()), body.into());
        Ok(())
    }

    pub fn get_string(&self, key: &str) -> Result<String, StoreError> {
        let bytes = self.get_object(key)?;
        String::from_utf8(bytes).map_err(|_| StoreError::Utf8(key.to_owned()))
    }

    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let objects = self.objects.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(objects.keys().cloned().collect())
    }
}

impl ObjectStore for InMemoryStore {
    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let key = object_path::normalize(key);
        self.objects
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .get(&key)
            .cloned()
            .ok_or(StoreError::NotFound(key))
    }

    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), StoreError> {
        self.objects
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(object_path::normalize(key), body.to_vec());
        Ok(())
    }

    fn object_exists(&self, key: &str) -> Result<bool, StoreError> {
        let key = object_path::normalize(key);
        Ok(self
            .objects
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .contains_key(&key))
    }
}

/// Objects as files below `root`. Keys must stay inside the root.
#[derive(Debug, Clone)]
pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let key = object_path::normalize(key);
        let relative = Path::new(key.trim_start_matches('/'));
        if key.is_empty()
            || relative
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(StoreError::InvalidKey(key));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalFsStore {
    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(key)?;
        std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(key.to_owned())
            } else {
                StoreError::Io {
                    key: key.to_owned(),
                    source,
                }
            }
        })
    }

    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        let io_err = |source| StoreError::Io {
            key: key.to_owned(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&path, body).map_err(io_err)
    }

    fn object_exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.resolve(key)?.is_file())
    }
}
