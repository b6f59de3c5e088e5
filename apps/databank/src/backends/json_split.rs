//! One JSON file per record inside a bank directory.

use super::{format_error, io_error, write_atomic};
use databank_core::{DataReader, DataWriter, Record, SourceError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

const EXTENSION: &str = "json";

/// File stem for a record id: its debug form with anything outside
/// `[A-Za-z0-9_-]` replaced by `_`.
fn file_stem<Id: fmt::Debug>(id: &Id) -> String {
    format!("{:?}", id)
        .trim_matches('"')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Directory of `<id>.json` files, one per record.
pub struct JsonSplitStore<R> {
    dir: PathBuf,
    auto_create: bool,
    _record: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for JsonSplitStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSplitStore")
            .field("dir", &self.dir)
            .field("auto_create", &self.auto_create)
            .finish()
    }
}

impl<R> JsonSplitStore<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, auto_create: bool) -> Self {
        Self {
            dir: dir.into(),
            auto_create,
            _record: PhantomData,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn name(&self) -> String {
        format!("json-split:{}", self.dir.display())
    }

    fn record_path(&self, id: &R::Id) -> PathBuf {
        self.dir.join(format!("{}.{}", file_stem(id), EXTENSION))
    }

    /// Record files in file-name order.
    fn record_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn write_record(&self, item: &R) -> Result<(), String> {
        let bytes = serde_json::to_vec_pretty(item).map_err(|e| e.to_string())?;
        write_atomic(&self.record_path(&item.id()), &bytes).map_err(|e| e.to_string())
    }

    fn write_all(&self, items: &[R]) -> Result<(), String> {
        items.iter().try_for_each(|item| self.write_record(item))
    }

    /// Remove record files whose name is not in `keep`.
    fn prune(&self, keep: &BTreeSet<PathBuf>) -> Result<usize, String> {
        if !self.dir.is_dir() {
            return Ok(0);
        }
        let mut removed = 0usize;
        for path in self.record_files().map_err(|e| e.to_string())? {
            if !keep.contains(&path) {
                fs::remove_file(&path).map_err(|e| e.to_string())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn report(&self, result: Result<(), String>) -> bool {
        match result {
            Ok(()) => true,
            Err(message) => {
                tracing::warn!(dir = %self.dir.display(), error = %message, "json-split write failed");
                false
            }
        }
    }
}

impl<R> DataReader<R> for JsonSplitStore<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    fn source_name(&self) -> String {
        self.name()
    }

    fn read_data(&self) -> Result<Vec<R>, SourceError> {
        if !self.dir.is_dir() {
            if !self.auto_create {
                return Err(SourceError::NotFound {
                    source_name: self.name(),
                });
            }
            fs::create_dir_all(&self.dir).map_err(|e| io_error(self.name(), e))?;
            tracing::info!(dir = %self.dir.display(), "created empty record directory");
            return Ok(Vec::new());
        }

        let files = self.record_files().map_err(|e| io_error(self.name(), e))?;
        let mut records = Vec::with_capacity(files.len());
        for path in files {
            let text = fs::read_to_string(&path).map_err(|e| io_error(self.name(), e))?;
            let record: R = serde_json::from_str(&text)
                .map_err(|e| format_error(self.name(), format!("{}: {}", path.display(), e)))?;
            records.push(record);
        }
        Ok(records)
    }
}

impl<R> DataWriter<R> for JsonSplitStore<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    fn source_name(&self) -> String {
        self.name()
    }

    fn write_one(&self, item: &R) -> bool {
        self.report(self.write_record(item))
    }

    fn write_many(&self, items: &[R]) -> bool {
        self.report(self.write_all(items))
    }

    fn write_snapshot(&self, items: &[R]) -> bool {
        let keep: BTreeSet<PathBuf> = items.iter().map(|r| self.record_path(&r.id())).collect();
        let result = self.write_all(items).and_then(|()| {
            let removed = self.prune(&keep)?;
            tracing::debug!(dir = %self.dir.display(), removed, "stale record files pruned");
            Ok(())
        });
        self.report(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Contact;

    fn contact(id: i64, name: &str) -> Contact {
        let mut contact = Contact::new(name, "someone@example.org");
        contact.id = id;
        contact
    }

    #[test]
    fn stems_are_filesystem_safe() {
        assert_eq!(file_stem(&42i64), "42");
        assert_eq!(file_stem(&"a/b c".to_string()), "a_b_c");
    }

    #[test]
    fn one_file_per_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonSplitStore::new(dir.path().join("contact"), true);
        assert!(store.read_data().expect("read").is_empty());

        assert!(store.write_many(&[contact(1, "Ada"), contact(2, "Bob")]));

        assert!(store.dir().join("1.json").exists());
        assert!(store.dir().join("2.json").exists());
        assert_eq!(store.read_data().expect("read").len(), 2);
    }

    #[test]
    fn snapshot_prunes_absent_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonSplitStore::new(dir.path().join("contact"), true);
        assert!(store.write_many(&[contact(1, "Ada"), contact(2, "Bob")]));

        assert!(store.write_snapshot(&[contact(2, "Bob")]));

        assert!(!store.dir().join("1.json").exists());
        let ids: Vec<i64> = store.read_data().expect("read").iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn missing_dir_without_auto_create() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonSplitStore::<Contact>::new(dir.path().join("absent"), false);
        assert!(matches!(
            store.read_data(),
            Err(SourceError::NotFound { .. })
        ));
    }
}
