//! Persistent medium abstraction.
//!
//! The pipeline only needs four things from the SD card (or whatever backs the
//! journal): open a named resource for append, open it for sequential read,
//! write one line, read one line. Closing is dropping the handle.
//!
//! - [`FsMedium`] - files under a directory, using `tokio::fs`
//! - [`MemoryMedium`] - in-memory resources for tests and dry runs
//!
//! Neither implementation locks anything: mutual exclusion between the writer
//! and replay readers is the day log's job (see [`super::day_log`]).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::StorageError;

/// Named-resource storage with append and sequential-read access.
#[async_trait]
pub trait StorageMedium: Send + Sync {
    /// Open (creating if needed) `name` for appending.
    async fn open_append(&self, name: &str) -> Result<Box<dyn LineSink>, StorageError>;

    /// Open `name` for reading from its first line. `Ok(None)` if it does not exist.
    async fn open_read(&self, name: &str) -> Result<Option<Box<dyn LineSource>>, StorageError>;
}

/// Append handle on one resource.
#[async_trait]
pub trait LineSink: Send {
    /// Append `line` verbatim. The caller supplies the terminator.
    async fn write_line(&mut self, line: &str) -> Result<(), StorageError>;
}

/// Sequential read handle on one resource.
#[async_trait]
pub trait LineSource: Send {
    /// Next line including its terminator, or `None` at end of resource.
    async fn read_line(&mut self) -> Result<Option<String>, StorageError>;
}

// =============================================================================
// FsMedium - files in a directory
// =============================================================================

/// Day logs stored as files under `root`.
#[derive(Debug, Clone)]
pub struct FsMedium {
    root: PathBuf,
}

impl FsMedium {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageMedium for FsMedium {
    async fn open_append(&self, name: &str) -> Result<Box<dyn LineSink>, StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::unavailable(name, e))?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(name))
            .await
            .map_err(|e| StorageError::unavailable(name, e))?;

        Ok(Box::new(FsSink {
            name: name.to_string(),
            file,
        }))
    }

    async fn open_read(&self, name: &str) -> Result<Option<Box<dyn LineSource>>, StorageError> {
        match File::open(self.root.join(name)).await {
            Ok(file) => Ok(Some(Box::new(FsSource {
                name: name.to_string(),
                reader: BufReader::new(file),
            }))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::unavailable(name, e)),
        }
    }
}

struct FsSink {
    name: String,
    file: File,
}

#[async_trait]
impl LineSink for FsSink {
    async fn write_line(&mut self, line: &str) -> Result<(), StorageError> {
        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(|e| StorageError::unavailable(&self.name, e))?;
        // tokio buffers file writes in the background until flushed
        self.file
            .flush()
            .await
            .map_err(|e| StorageError::unavailable(&self.name, e))
    }
}

struct FsSource {
    name: String,
    reader: BufReader<File>,
}

#[async_trait]
impl LineSource for FsSource {
    async fn read_line(&mut self) -> Result<Option<String>, StorageError> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| StorageError::unavailable(&self.name, e))?;
        Ok((read > 0).then_some(line))
    }
}

// =============================================================================
// MemoryMedium - in-memory resources
// =============================================================================

/// In-memory medium. Readers see appends made after they were opened, like a
/// file being grown underneath them.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    files: Arc<Mutex<BTreeMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a removed or full card: every open fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Replace the contents of `name`.
    pub fn insert(&self, name: impl Into<String>, contents: impl Into<String>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), contents.into());
    }

    /// Current contents of `name`.
    pub fn contents(&self, name: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of all resources, sorted.
    pub fn resources(&self) -> Vec<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn check_available(&self, name: &str) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                name,
                std::io::Error::new(std::io::ErrorKind::NotConnected, "medium not present"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageMedium for MemoryMedium {
    async fn open_append(&self, name: &str) -> Result<Box<dyn LineSink>, StorageError> {
        self.check_available(name)?;
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default();
        Ok(Box::new(MemorySink {
            medium: self.clone(),
            name: name.to_string(),
        }))
    }

    async fn open_read(&self, name: &str) -> Result<Option<Box<dyn LineSource>>, StorageError> {
        self.check_available(name)?;
        if self.contents(name).is_none() {
            return Ok(None);
        }
        Ok(Some(Box::new(MemorySource {
            medium: self.clone(),
            name: name.to_string(),
            offset: 0,
        })))
    }
}

struct MemorySink {
    medium: MemoryMedium,
    name: String,
}

#[async_trait]
impl LineSink for MemorySink {
    async fn write_line(&mut self, line: &str) -> Result<(), StorageError> {
        self.medium.check_available(&self.name)?;
        self.medium
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(self.name.clone())
            .or_default()
            .push_str(line);
        Ok(())
    }
}

struct MemorySource {
    medium: MemoryMedium,
    name: String,
    offset: usize,
}

#[async_trait]
impl LineSource for MemorySource {
    async fn read_line(&mut self) -> Result<Option<String>, StorageError> {
        self.medium.check_available(&self.name)?;
        let files = self
            .medium
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let rest = files
            .get(&self.name)
            .and_then(|contents| contents.get(self.offset..))
            .unwrap_or("");
        if rest.is_empty() {
            return Ok(None);
        }
        let end = rest.find('\n').map_or(rest.len(), |i| i + 1);
        let line = rest[..end].to_string();
        self.offset += end;
        Ok(Some(line))
    }
}
