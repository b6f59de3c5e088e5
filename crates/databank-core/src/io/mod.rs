//! # Persistence Boundary
//!
//! The abstract load/save contract consumed by banks.
//!
//! Concrete backends (JSON files, key-value stores, spreadsheets) live
//! outside the CORE and implement these two traits. A bank never interprets
//! the storage format; it only sequences calls to a reader and a writer.
//!
//! ## Failure Model
//!
//! - Readers return `Result<_, SourceError>`.
//! - Writers catch their own errors and report `false`. Banks must not rely
//!   on a panic or an `Err` to learn that a write failed.

mod memory;

pub use memory::MemoryStore;

use crate::{Record, SourceError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

// =============================================================================
// READER
// =============================================================================

/// Loads every record of one type from a named source.
#[async_trait]
pub trait DataReader<R: Record>: Send + Sync {
    /// Human-readable source name for diagnostics.
    fn source_name(&self) -> String;

    /// Eagerly read all records.
    ///
    /// Returns `SourceError::NotFound` if the backing resource is absent and
    /// the backend is not configured to create it.
    fn read_data(&self) -> Result<Vec<R>, SourceError>;

    /// Asynchronous read honouring `cancel`.
    ///
    /// The provided implementation checks the token around the synchronous
    /// read. Backends with real async I/O should override it.
    async fn read_data_async(&self, cancel: &CancellationToken) -> Result<Vec<R>, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled {
                source_name: self.source_name(),
            });
        }
        let data = self.read_data()?;
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled {
                source_name: self.source_name(),
            });
        }
        Ok(data)
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// Saves records of one type to a named source.
///
/// All methods return whether the write succeeded.
#[async_trait]
pub trait DataWriter<R: Record>: Send + Sync {
    /// Human-readable source name for diagnostics.
    fn source_name(&self) -> String;

    /// Insert or replace one record.
    fn write_one(&self, item: &R) -> bool;

    /// Insert or replace several records.
    fn write_many(&self, items: &[R]) -> bool;

    /// Replace the whole stored set with `items`.
    ///
    /// Upsert-only backends may keep the default, which delegates to
    /// `write_many`; records absent from `items` then survive in storage.
    fn write_snapshot(&self, items: &[R]) -> bool {
        self.write_many(items)
    }

    async fn write_one_async(&self, item: &R, cancel: &CancellationToken) -> bool {
        !cancel.is_cancelled() && self.write_one(item)
    }

    async fn write_many_async(&self, items: &[R], cancel: &CancellationToken) -> bool {
        !cancel.is_cancelled() && self.write_many(items)
    }

    async fn write_snapshot_async(&self, items: &[R], cancel: &CancellationToken) -> bool {
        !cancel.is_cancelled() && self.write_snapshot(items)
    }
}
