//! In-memory reader/writer pair.
//!
//! Clones of a `MemoryStore` share the same state, so one handle can be given
//! to a bank while another inspects what was written.

use super::{DataReader, DataWriter};
use crate::{Record, SourceError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct MemoryState<R: Record> {
    records: BTreeMap<R::Id, R>,
    present: bool,
    reject_writes: bool,
    write_calls: usize,
    last_snapshot: Option<Vec<R>>,
}

/// Shared in-memory storage for one record type.
#[derive(Debug)]
pub struct MemoryStore<R: Record> {
    label: String,
    state: Arc<Mutex<MemoryState<R>>>,
}

impl<R: Record> Clone for MemoryStore<R> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: Record> MemoryStore<R> {
    /// Empty, present store.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_records(label, Vec::new())
    }

    /// Store pre-seeded with `records` (later duplicates win).
    #[must_use]
    pub fn with_records(label: impl Into<String>, records: Vec<R>) -> Self {
        let records = records.into_iter().map(|r| (r.id(), r)).collect();
        Self {
            label: label.into(),
            state: Arc::new(Mutex::new(MemoryState {
                records,
                present: true,
                reject_writes: false,
                write_calls: 0,
                last_snapshot: None,
            })),
        }
    }

    /// Store whose backing resource does not exist yet.
    ///
    /// Reads fail with `SourceError::NotFound` until the first successful write.
    #[must_use]
    pub fn missing(label: impl Into<String>) -> Self {
        let store = Self::new(label);
        store.lock().present = false;
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent write report failure.
    pub fn set_reject_writes(&self, reject: bool) {
        self.lock().reject_writes = reject;
    }

    /// Currently stored records in id order.
    #[must_use]
    pub fn stored(&self) -> Vec<R> {
        self.lock().records.values().cloned().collect()
    }

    /// Number of write calls received, successful or not.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    /// The set passed to the most recent successful `write_snapshot`.
    #[must_use]
    pub fn last_snapshot(&self) -> Option<Vec<R>> {
        self.lock().last_snapshot.clone()
    }

    fn write_with(&self, apply: impl FnOnce(&mut MemoryState<R>)) -> bool {
        let mut state = self.lock();
        state.write_calls = state.write_calls.saturating_add(1);
        if state.reject_writes {
            tracing::warn!(source = %self.label, "memory store rejected write");
            return false;
        }
        apply(&mut state);
        state.present = true;
        true
    }
}

impl<R: Record> DataReader<R> for MemoryStore<R> {
    fn source_name(&self) -> String {
        format!("memory:{}", self.label)
    }

    fn read_data(&self) -> Result<Vec<R>, SourceError> {
        let state = self.lock();
        if !state.present {
            return Err(SourceError::NotFound {
                source_name: format!("memory:{}", self.label),
            });
        }
        Ok(state.records.values().cloned().collect())
    }
}

impl<R: Record> DataWriter<R> for MemoryStore<R> {
    fn source_name(&self) -> String {
        format!("memory:{}", self.label)
    }

    fn write_one(&self, item: &R) -> bool {
        self.write_with(|state| {
            state.records.insert(item.id(), item.clone());
        })
    }

    fn write_many(&self, items: &[R]) -> bool {
        self.write_with(|state| {
            for item in items {
                state.records.insert(item.id(), item.clone());
            }
        })
    }

    fn write_snapshot(&self, items: &[R]) -> bool {
        self.write_with(|state| {
            state.records = items.iter().map(|r| (r.id(), r.clone())).collect();
            state.last_snapshot = Some(items.to_vec());
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
