use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::request::{RunRequest, parse_request_message};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unknown receipt {0}")]
    UnknownReceipt(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("queue lock poisoned")]
    LockPoisoned,
}

/// A parsed request plus the handle needed to acknowledge it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub request: RunRequest,
    pub receipt: String,
}

pub trait RunQueue: Send + Sync {
    /// Next parseable request, or `None` when nothing is waiting.
    /// Malformed messages are logged and removed.
    fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    fn ack(&self, receipt: &str) -> Result<(), QueueError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    pending: VecDeque<(String, String)>,
    in_flight: BTreeSet<String>,
    next_id: u64,
}

/// FIFO of raw message bodies. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_raw(&self, body: impl Into<String>) -> Result<String, QueueError> {
        let mut state = self.state.lock().map_err(|_| QueueError::LockPoisoned)?;
        state.next_id += 1;
        let receipt = format!("msg-{}", state.next_id);
        state.pending.push_back((receipt.clone(), body.into()));
        Ok(receipt)
    }

    pub fn push_request(&self, request: &RunRequest) -> Result<String, QueueError> {
        self.push_raw(serde_json::to_string(request)?)
    }

    pub fn pending(&self) -> Result<usize, QueueError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| QueueError::LockPoisoned)?
            .pending
            .len())
    }

    pub fn in_flight(&self) -> Result<usize, QueueError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| QueueError::LockPoisoned)?
            .in_flight
            .len())
    }
}

impl RunQueue for InMemoryQueue {
    fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut state = self.state.lock().map_err(|_| QueueError::LockPoisoned)?;
        while let Some((receipt, body)) = state.pending.pop_front() {
            match parse_request_message(&body) {
                Ok(request) => {
                    state.in_flight.insert(receipt.clone());
                    return Ok(Some(Delivery { request, receipt }));
                }
                Err(err) => {
                    tracing::warn!(receipt = %receipt, error = %err, "invalid_message_dropped");
                }
            }
        }
        Ok(None)
    }

    fn ack(&self, receipt: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().map_err(|_| QueueError::LockPoisoned)?;
        if state.in_flight.remove(receipt) {
            Ok(())
        } else {
            Err(QueueError::UnknownReceipt(receipt.to_owned()))
        }
    }
}

/// One `*.json` file per message, received in file-name order.
/// Acknowledging a message deletes its file.
#[derive(Debug)]
pub struct DirectoryQueue {
    dir: PathBuf,
    in_flight: Mutex<BTreeSet<PathBuf>>,
}

impl DirectoryQueue {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| QueueError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            in_flight: Mutex::new(BTreeSet::new()),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn message_files(&self) -> Result<Vec<PathBuf>, QueueError> {
        let io_err = |source| QueueError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn remove(path: &Path) -> Result<(), QueueError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(QueueError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl RunQueue for DirectoryQueue {
    fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut in_flight = self.in_flight.lock().map_err(|_| QueueError::LockPoisoned)?;
        for path in self.message_files()? {
            if in_flight.contains(&path) {
                continue;
            }
            let bytes = std::fs::read(&path).map_err(|source| QueueError::Io {
                path: path.clone(),
                source,
            })?;
            let parsed = String::from_utf8(bytes)
                .map_err(|err| err.to_string())
                .and_then(|body| parse_request_message(&body).map_err(|err| err.to_string()));
            match parsed {
                Ok(request) => {
                    let receipt = path.to_string_lossy().into_owned();
                    in_flight.insert(path);
                    return Ok(Some(Delivery { request, receipt }));
                }
                Err(err) => {
                    tracing::warn!(file = %path.display(), error = %err, "invalid_message_dropped");
                    Self::remove(&path)?;
                }
            }
        }
        Ok(None)
    }

    fn ack(&self, receipt: &str) -> Result<(), QueueError> {
        let path = PathBuf::from(receipt);
        let mut in_flight = self.in_flight.lock().map_err(|_| QueueError::LockPoisoned)?;
        if !in_flight.remove(&path) {
            return Err(QueueError::UnknownReceipt(receipt.to_owned()));
        }
        Self::remove(&path)
    }
}
