//! One pretty-printed JSON array per bank.

use super::{format_error, io_error, write_atomic};
use async_trait::async_trait;
use databank_core::{DataReader, DataWriter, Record, SourceError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// JSON array file holding every record of one bank.
pub struct JsonFileStore<R> {
    path: PathBuf,
    auto_create: bool,
    _record: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for JsonFileStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .field("auto_create", &self.auto_create)
            .finish()
    }
}

impl<R> JsonFileStore<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, auto_create: bool) -> Self {
        Self {
            path: path.into(),
            auto_create,
            _record: PhantomData,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> String {
        format!("json:{}", self.path.display())
    }

    fn decode(&self, text: &str) -> Result<Vec<R>, SourceError> {
        serde_json::from_str(text).map_err(|e| format_error(self.name(), e))
    }

    /// Missing file: create `[]` when allowed, otherwise `NotFound`.
    fn missing(&self) -> Result<Vec<R>, SourceError> {
        if !self.auto_create {
            return Err(SourceError::NotFound {
                source_name: self.name(),
            });
        }
        write_atomic(&self.path, b"[]").map_err(|e| io_error(self.name(), e))?;
        tracing::info!(path = %self.path.display(), "created empty data file");
        Ok(Vec::new())
    }

    fn persist(&self, items: &[R]) -> bool {
        let result = serde_json::to_vec_pretty(items)
            .map_err(|e| e.to_string())
            .and_then(|bytes| write_atomic(&self.path, &bytes).map_err(|e| e.to_string()));
        match result {
            Ok(()) => true,
            Err(message) => {
                tracing::warn!(path = %self.path.display(), error = %message, "json write failed");
                false
            }
        }
    }

    /// Merge `items` into the stored set by id.
    fn upsert(&self, items: &[R]) -> bool {
        let stored = match self.read_data() {
            Ok(stored) => stored,
            Err(SourceError::NotFound { .. }) => Vec::new(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "json upsert could not read");
                return false;
            }
        };
        let mut merged: BTreeMap<R::Id, R> = stored.into_iter().map(|r| (r.id(), r)).collect();
        for item in items {
            merged.insert(item.id(), item.clone());
        }
        let merged: Vec<R> = merged.into_values().collect();
        self.persist(&merged)
    }
}

#[async_trait]
impl<R> DataReader<R> for JsonFileStore<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    fn source_name(&self) -> String {
        self.name()
    }

    fn read_data(&self) -> Result<Vec<R>, SourceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => self.decode(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => self.missing(),
            Err(e) => Err(io_error(self.name(), e)),
        }
    }

    async fn read_data_async(&self, cancel: &CancellationToken) -> Result<Vec<R>, SourceError> {
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(SourceError::Cancelled { source_name: self.name() });
            }
            read = tokio::fs::read_to_string(&self.path) => read,
        };
        match read {
            Ok(text) => self.decode(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => self.missing(),
            Err(e) => Err(io_error(self.name(), e)),
        }
    }
}

impl<R> DataWriter<R> for JsonFileStore<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    fn source_name(&self) -> String {
        self.name()
    }

    fn write_one(&self, item: &R) -> bool {
        self.upsert(std::slice::from_ref(item))
    }

    fn write_many(&self, items: &[R]) -> bool {
        self.upsert(items)
    }

    fn write_snapshot(&self, items: &[R]) -> bool {
        self.persist(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Contact;

    fn contact(id: i64, name: &str) -> Contact {
        let mut contact = Contact::new(name, format!("{}@example.org", name.to_lowercase()));
        contact.id = id;
        contact
    }

    #[test]
    fn missing_file_respects_auto_create() {
        let dir = tempfile::tempdir().expect("tempdir");
        let strict = JsonFileStore::<Contact>::new(dir.path().join("strict.json"), false);
        assert!(matches!(
            strict.read_data(),
            Err(SourceError::NotFound { .. })
        ));

        let lenient = JsonFileStore::<Contact>::new(dir.path().join("lenient.json"), true);
        assert!(lenient.read_data().expect("read").is_empty());
        assert!(lenient.path().exists());
    }

    #[test]
    fn writes_upsert_and_snapshot_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("contact.json"), true);

        assert!(store.write_many(&[contact(1, "Ada"), contact(2, "Bob")]));
        assert!(store.write_one(&contact(2, "Bea")));
        let names: Vec<String> = store
            .read_data()
            .expect("read")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Ada", "Bea"]);

        assert!(store.write_snapshot(&[contact(1, "Ada")]));
        assert_eq!(store.read_data().expect("read").len(), 1);
    }

    #[test]
    fn corrupt_file_is_a_format_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("contact.json");
        std::fs::write(&path, "{not json").expect("write");
        let store = JsonFileStore::<Contact>::new(path, true);

        assert!(matches!(store.read_data(), Err(SourceError::Format { .. })));
        assert!(!store.write_one(&contact(1, "Ada")));
    }

    #[tokio::test]
    async fn async_read_honours_cancel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::<Contact>::new(dir.path().join("contact.json"), true);
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            store.read_data_async(&token).await,
            Err(SourceError::Cancelled { .. })
        ));
    }
}
