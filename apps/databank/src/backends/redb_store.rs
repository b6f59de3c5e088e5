//! # redb-backed Record Storage
//!
//! One redb table per bank inside a shared database file.
//!
//! - Key: postcard-encoded record id
//! - Value: postcard-encoded record
//!
//! Every write is a single ACID transaction, so a rejected batch leaves the
//! table exactly as it was.

use super::{format_error, io_error};
use databank_core::{DataReader, DataWriter, Record, SourceError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type RecordTable<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

/// redb table holding every record of one bank.
pub struct RedbStore<R> {
    db: Arc<Database>,
    path: PathBuf,
    table: String,
    _record: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for RedbStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl<R> RedbStore<R>
where
    R: Record + Serialize + DeserializeOwned,
    R::Id: Serialize,
{
    /// Open (or create, when `auto_create`) the database and its table.
    pub fn open(
        path: impl AsRef<Path>,
        table: impl Into<String>,
        auto_create: bool,
    ) -> Result<Self, String> {
        let path = path.as_ref().to_path_buf();
        if !auto_create && !path.exists() {
            return Err(format!("database not found: {}", path.display()));
        }
        let db = Database::create(&path).map_err(|e| e.to_string())?;
        Self::with_database(Arc::new(db), path, table)
    }

    /// Use an already open database, sharing it with other stores.
    pub fn with_database(
        db: Arc<Database>,
        path: PathBuf,
        table: impl Into<String>,
    ) -> Result<Self, String> {
        let store = Self {
            db,
            path,
            table: table.into(),
            _record: PhantomData,
        };

        // Initialize the table if it doesn't exist
        let write_txn = store.db.begin_write().map_err(|e| e.to_string())?;
        write_txn
            .open_table(store.definition())
            .map_err(|e| e.to_string())?;
        write_txn.commit().map_err(|e| e.to_string())?;
        Ok(store)
    }

    /// Shared database handle.
    #[must_use]
    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    fn definition(&self) -> RecordTable<'_> {
        TableDefinition::new(&self.table)
    }

    fn name(&self) -> String {
        format!("redb:{}#{}", self.path.display(), self.table)
    }

    fn encode(item: &R) -> Result<(Vec<u8>, Vec<u8>), String> {
        let key = postcard::to_allocvec(&item.id()).map_err(|e| e.to_string())?;
        let value = postcard::to_allocvec(item).map_err(|e| e.to_string())?;
        Ok((key, value))
    }

    /// Insert `items` in one transaction, optionally clearing the table first.
    fn commit(&self, items: &[R], clear: bool) -> Result<(), String> {
        let encoded = items
            .iter()
            .map(Self::encode)
            .collect::<Result<Vec<_>, _>>()?;

        let write_txn = self.db.begin_write().map_err(|e| e.to_string())?;
        if clear {
            write_txn
                .delete_table(self.definition())
                .map_err(|e| e.to_string())?;
        }
        {
            let mut table = write_txn
                .open_table(self.definition())
                .map_err(|e| e.to_string())?;
            for (key, value) in &encoded {
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(|e| e.to_string())?;
            }
        }
        write_txn.commit().map_err(|e| e.to_string())
    }

    fn report(&self, result: Result<(), String>) -> bool {
        match result {
            Ok(()) => true,
            Err(message) => {
                tracing::warn!(store = %self.name(), error = %message, "redb write failed");
                false
            }
        }
    }
}

impl<R> DataReader<R> for RedbStore<R>
where
    R: Record + Serialize + DeserializeOwned,
    R::Id: Serialize,
{
    fn source_name(&self) -> String {
        self.name()
    }

    fn read_data(&self) -> Result<Vec<R>, SourceError> {
        let read_txn = self.db.begin_read().map_err(|e| io_error(self.name(), e))?;
        let table = read_txn
            .open_table(self.definition())
            .map_err(|e| io_error(self.name(), e))?;

        let mut records = Vec::new();
        for entry in table.iter().map_err(|e| io_error(self.name(), e))? {
            let (_key, value) = entry.map_err(|e| io_error(self.name(), e))?;
            let record: R =
                postcard::from_bytes(value.value()).map_err(|e| format_error(self.name(), e))?;
            records.push(record);
        }
        Ok(records)
    }
}

impl<R> DataWriter<R> for RedbStore<R>
where
    R: Record + Serialize + DeserializeOwned,
    R::Id: Serialize,
{
    fn source_name(&self) -> String {
        self.name()
    }

    fn write_one(&self, item: &R) -> bool {
        self.report(self.commit(std::slice::from_ref(item), false))
    }

    fn write_many(&self, items: &[R]) -> bool {
        self.report(self.commit(items, false))
    }

    fn write_snapshot(&self, items: &[R]) -> bool {
        self.report(self.commit(items, true))
    }
}
