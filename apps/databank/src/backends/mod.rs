//! # Storage Backends
//!
//! Concrete `DataReader`/`DataWriter` implementations.
//!
//! | Backend          | Layout                               | Snapshot write          |
//! |------------------|--------------------------------------|-------------------------|
//! | `JsonFileStore`  | `<dir>/<bank>.json`, one JSON array  | file overwrite          |
//! | `JsonSplitStore` | `<dir>/<bank>/<id>.json` per record  | stale files removed     |
//! | `RedbStore`      | `<dir>/databank.redb`, table per bank| table cleared in txn    |
//!
//! Writers never return errors: failures are logged with `tracing::warn!`
//! and reported as `false`, which makes the bank roll back.

mod json_file;
mod json_split;
mod redb_store;

pub use json_file::JsonFileStore;
pub use json_split::JsonSplitStore;
pub use redb_store::RedbStore;

use crate::config::{BackendKind, Config};
use crate::{AppError, Contact};
use databank_core::{Bank, MemoryStore, SmallestAvailable, SourceError};
use std::ffi::OsString;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the shared redb database inside the data directory.
pub const REDB_FILE: &str = "databank.redb";

/// Write `bytes` to a temporary sibling, then rename it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

fn io_error(source_name: String, err: impl Display) -> SourceError {
    SourceError::Io {
        source_name,
        message: err.to_string(),
    }
}

fn format_error(source_name: String, err: impl Display) -> SourceError {
    SourceError::Format {
        source_name,
        message: err.to_string(),
    }
}

/// Assemble the contacts bank on the configured backend.
pub fn contacts_bank(config: &Config) -> Result<Bank<Contact>, AppError> {
    let builder = Bank::builder("Contacts")
        .description("Address book entries")
        .identity(SmallestAvailable::starting_at(config.id_start))
        .drop_strategy(config.drop_strategy)
        .factory(Contact::default);
    let dir = &config.data_dir;

    let builder = match config.backend {
        BackendKind::Json => {
            builder.store(JsonFileStore::new(dir.join("contact.json"), config.auto_create))
        }
        BackendKind::JsonSplit => {
            builder.store(JsonSplitStore::new(dir.join("contact"), config.auto_create))
        }
        BackendKind::Redb => {
            fs::create_dir_all(dir)?;
            let store = RedbStore::open(dir.join(REDB_FILE), "contact", config.auto_create)
                .map_err(AppError::Storage)?;
            builder.store(store)
        }
        BackendKind::Memory => builder.store(MemoryStore::new("contact")),
    };

    tracing::debug!(backend = %config.backend, dir = %dir.display(), "contacts bank assembled");
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("file.json");

        write_atomic(&path, b"[]").expect("write");

        assert_eq!(fs::read(&path).expect("read"), b"[]");
        assert!(!dir.path().join("nested").join("file.json.tmp").exists());
    }
}
