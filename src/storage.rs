//! Storage abstraction layer for Quiver.
//!
//! Segment writers stream their files into a [`Storage`] through
//! [`StorageOutput`]; readers pull whole files back with [`read_file`] and
//! traverse them in place. Backends can be swapped without touching the codec
//! code.
//!
//! # Storage Types
//!
//! - [`file::FileStorage`]: one OS file per named resource under a directory.
//! - [`memory::MemoryStorage`]: a shared in-memory map, for tests and
//!   temporary segments.
//!
//! # Example
//!
//! ```
//! use quiver::storage::{StorageConfig, StorageFactory};
//! use quiver::storage::memory::MemoryStorageConfig;
//!
//! # fn main() -> quiver::error::Result<()> {
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))?;
//! let mut output = storage.create_output("_0.tim")?;
//! std::io::Write::write_all(&mut output, b"abc")?;
//! output.close()?;
//! assert_eq!(storage.file_size("_0.tim")?, 3);
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};

pub mod file;
pub mod memory;
pub mod structured;

use file::{FileStorage, FileStorageConfig};
use memory::{MemoryStorage, MemoryStorageConfig};

/// A trait for storage backends that can store and retrieve named byte
/// sequences.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a file for writing, truncating any existing content.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all files in the storage, sorted by name.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Rename a file.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Sync all pending writes to storage.
    fn sync(&self) -> Result<()>;
}

/// A trait for reading data from storage.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Get the size of the input stream.
    fn size(&self) -> Result<u64>;

    /// Close the input stream.
    fn close(&mut self) -> Result<()>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush and sync the output to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Number of bytes written so far.
    fn position(&self) -> u64;

    /// Close the output stream, publishing its content.
    fn close(&mut self) -> Result<()>;
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.as_mut().flush_and_sync()
    }

    fn position(&self) -> u64 {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// I/O error.
    IoError(String),

    /// Output already closed.
    OutputClosed(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::OutputClosed(name) => write!(f, "Output is closed: {name}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for QuiverError {
    fn from(err: StorageError) -> Self {
        QuiverError::storage(err.to_string())
    }
}

/// Type-safe configuration for the supported backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Files under a directory on disk.
    File(FileStorageConfig),
    /// In-memory map.
    Memory(MemoryStorageConfig),
}

/// Helper for constructing concrete storage instances.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a storage backend from its configuration.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::File(config) => Ok(Arc::new(FileStorage::new(config)?)),
            StorageConfig::Memory(config) => Ok(Arc::new(MemoryStorage::new(config))),
        }
    }
}

/// Read a whole file into an immutable shared buffer.
pub fn read_file(storage: &dyn Storage, name: &str) -> Result<Arc<[u8]>> {
    let mut input = storage.open_input(name)?;
    let size = input.size()? as usize;
    let mut data = Vec::with_capacity(size);
    input.read_to_end(&mut data)?;
    input.close()?;
    Ok(Arc::from(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::FileNotFound("test.txt".to_string());
        assert_eq!(err.to_string(), "File not found: test.txt");

        let err: QuiverError = StorageError::IoError("disk full".to_string()).into();
        assert_eq!(err.to_string(), "Storage error: I/O error: disk full");
    }

    #[test]
    fn test_factory_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let configs = vec![
            StorageConfig::Memory(MemoryStorageConfig::default()),
            StorageConfig::File(FileStorageConfig::new(dir.path())),
        ];

        for config in configs {
            let storage = StorageFactory::create(config).unwrap();
            let mut output = storage.create_output("seg.bin").unwrap();
            output.write_all(b"hello").unwrap();
            assert_eq!(output.position(), 5);
            output.close().unwrap();

            let data = read_file(storage.as_ref(), "seg.bin").unwrap();
            assert_eq!(&data[..], b"hello");
            assert_eq!(storage.list_files().unwrap(), vec!["seg.bin".to_string()]);
        }
    }

    #[test]
    fn test_config_json() {
        let json = r#"{"type":"memory"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config, StorageConfig::Memory(_)));
    }
}
