//! # Bank
//!
//! The indexed record store: one bank per record type.
//!
//! A bank owns a `BTreeMap` from id to record and mediates every change
//! between memory and the persistence boundary:
//!
//! 1. The bank's write gate is taken. It orders every mutation and is held
//!    until the write has settled, so snapshots and undo journals never
//!    interleave with another caller's change.
//! 2. The in-memory change is staged under the map lock, with an undo journal.
//! 3. The map lock is released and the writer is called. Reads proceed.
//! 4. If the writer reports failure, the journal is replayed and the call
//!    fails with `BankError::WriteRejected` (or `Cancelled`).
//! 5. Otherwise the gate is released and events are raised.
//!
//! The gate is a `tokio::sync::Mutex`, so the async twins may hold it across
//! `.await`. Synchronous mutators take it with `blocking_lock` and must not be
//! called from inside an async runtime; use the `_async` twins there.
//!
//! ## Drop Strategies
//!
//! - `Disable`: records are flipped to disabled and rewritten individually.
//! - `Delete`: records leave the map and the full remaining set is written
//!   as a snapshot.

use crate::identity::IdentityPolicy;
use crate::io::{DataReader, DataWriter};
use crate::primitives::DEFAULT_DESCRIPTION;
use crate::{BankError, BankInfo, DropStrategy, IdData, Record};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

// =============================================================================
// EVENTS
// =============================================================================

/// Change notifications raised by a bank.
#[derive(Debug, Clone, PartialEq)]
pub enum BankEvent<R> {
    /// Name or description changed.
    InfoUpdated(BankInfo),
    /// Any mutation. `count` is the number of enabled records afterwards.
    DataUpdated { affected: usize, count: usize },
    /// Records saved (new or existing).
    DataAdded(Vec<R>),
    /// Records disabled or removed.
    DataDropped(Vec<R>),
}

/// Callback receiving bank events.
pub type BankListener<R> = Arc<dyn Fn(&BankEvent<R>) + Send + Sync>;

type Factory<R> = Arc<dyn Fn() -> R + Send + Sync>;

// =============================================================================
// STAGING
// =============================================================================

/// One reversible in-memory change.
enum Undo<R: Record> {
    /// Key was absent before; remove it.
    Inserted(R::Id),
    /// Key held this value before; put it back.
    Restore(R),
}

struct StagedUpdate<R: Record> {
    journal: Vec<Undo<R>>,
    /// Indices of caller records that received an id.
    assigned: Vec<usize>,
    inserted: usize,
}

struct StagedDrop<R: Record> {
    journal: Vec<Undo<R>>,
    affected: Vec<R>,
    /// Full remaining set, only under `DropStrategy::Delete`.
    snapshot: Option<Vec<R>>,
}

fn apply_undo<R: Record>(data: &mut BTreeMap<R::Id, R>, journal: Vec<Undo<R>>) {
    for undo in journal.into_iter().rev() {
        match undo {
            Undo::Inserted(id) => {
                data.remove(&id);
            }
            Undo::Restore(previous) => {
                data.insert(previous.id(), previous);
            }
        }
    }
}

/// Lower-cased type name without path or generics.
fn short_type_name<R>() -> String {
    let full = std::any::type_name::<R>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_lowercase()
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builder for a `Bank`.
///
/// Collaborators are optional here; a bank missing one fails with the
/// matching `BankError::Missing*` at the first call that needs it.
pub struct BankBuilder<R: Record> {
    name: String,
    description: Option<String>,
    drop_strategy: DropStrategy,
    reader: Option<Arc<dyn DataReader<R>>>,
    writer: Option<Arc<dyn DataWriter<R>>>,
    identity: Option<Arc<dyn IdentityPolicy<R>>>,
    factory: Option<Factory<R>>,
}

impl<R: Record> BankBuilder<R> {
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn drop_strategy(mut self, strategy: DropStrategy) -> Self {
        self.drop_strategy = strategy;
        self
    }

    #[must_use]
    pub fn reader(mut self, reader: impl DataReader<R> + 'static) -> Self {
        self.reader = Some(Arc::new(reader));
        self
    }

    #[must_use]
    pub fn writer(mut self, writer: impl DataWriter<R> + 'static) -> Self {
        self.writer = Some(Arc::new(writer));
        self
    }

    /// Use one backend as both reader and writer.
    #[must_use]
    pub fn store<S>(mut self, store: S) -> Self
    where
        S: DataReader<R> + DataWriter<R> + 'static,
    {
        let store = Arc::new(store);
        let reader: Arc<dyn DataReader<R>> = store.clone();
        let writer: Arc<dyn DataWriter<R>> = store;
        self.reader = Some(reader);
        self.writer = Some(writer);
        self
    }

    #[must_use]
    pub fn identity(mut self, policy: impl IdentityPolicy<R> + 'static) -> Self {
        self.identity = Some(Arc::new(policy));
        self
    }

    /// Factory used by `Bank::build_new_data`.
    #[must_use]
    pub fn factory(mut self, factory: impl Fn() -> R + Send + Sync + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    #[must_use]
    pub fn build(self) -> Bank<R> {
        Bank {
            meta: RwLock::new(BankMeta {
                name: self.name,
                description: Some(
                    self.description
                        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
                ),
            }),
            drop_strategy: self.drop_strategy,
            reader: self.reader,
            writer: self.writer,
            identity: self.identity,
            factory: self.factory,
            data: RwLock::new(BTreeMap::new()),
            gate: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

// =============================================================================
// BANK
// =============================================================================

struct BankMeta {
    name: String,
    description: Option<String>,
}

/// Indexed store for records of type `R`.
///
/// All methods take `&self`; share a bank across threads with `Arc<Bank<R>>`.
pub struct Bank<R: Record> {
    meta: RwLock<BankMeta>,
    drop_strategy: DropStrategy,
    reader: Option<Arc<dyn DataReader<R>>>,
    writer: Option<Arc<dyn DataWriter<R>>>,
    identity: Option<Arc<dyn IdentityPolicy<R>>>,
    factory: Option<Factory<R>>,
    data: RwLock<BTreeMap<R::Id, R>>,
    /// Serializes mutations from staging until the write settles.
    gate: Mutex<()>,
    listeners: RwLock<Vec<BankListener<R>>>,
}

impl<R: Record> fmt::Debug for Bank<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bank")
            .field("id", &self.id())
            .field("drop_strategy", &self.drop_strategy)
            .field("count_all", &self.count_all())
            .finish_non_exhaustive()
    }
}

impl<R: Record> Bank<R> {
    /// Start building a bank with the given display name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> BankBuilder<R> {
        BankBuilder {
            name: name.into(),
            description: None,
            drop_strategy: DropStrategy::default(),
            reader: None,
            writer: None,
            identity: None,
            factory: None,
        }
    }

    // =========================================================================
    // METADATA
    // =========================================================================

    /// Bank id: the lower-cased short type name of `R`.
    #[must_use]
    pub fn id(&self) -> String {
        short_type_name::<R>()
    }

    /// Full type name of the records held.
    #[must_use]
    pub fn record_type(&self) -> &'static str {
        std::any::type_name::<R>()
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.meta().name.clone()
    }

    #[must_use]
    pub fn description(&self) -> Option<String> {
        self.meta().description.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.meta_mut().name = name.into();
        self.emit(&BankEvent::InfoUpdated(self.info()));
    }

    pub fn set_description(&self, description: Option<String>) {
        self.meta_mut().description = description;
        self.emit(&BankEvent::InfoUpdated(self.info()));
    }

    #[must_use]
    pub fn drop_strategy(&self) -> DropStrategy {
        self.drop_strategy
    }

    /// Current summary of the bank.
    #[must_use]
    pub fn info(&self) -> BankInfo {
        let meta = self.meta();
        BankInfo {
            count: self.count(),
            record_type: self.record_type().to_string(),
            name: meta.name.clone(),
            description: meta.description.clone(),
        }
    }

    /// Source name of the configured reader, if any.
    #[must_use]
    pub fn reader_source(&self) -> Option<String> {
        self.reader.as_ref().map(|r| r.source_name())
    }

    /// Source name of the configured writer, if any.
    #[must_use]
    pub fn writer_source(&self) -> Option<String> {
        self.writer.as_ref().map(|w| w.source_name())
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Register a listener. Listeners run after the write attempt, outside
    /// the map lock, in registration order.
    pub fn subscribe(&self, listener: impl Fn(&BankEvent<R>) + Send + Sync + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    fn emit(&self, event: &BankEvent<R>) {
        let listeners: Vec<BankListener<R>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            listener(event);
        }
    }

    /// Raise `DataUpdated` followed by `follow_up`.
    fn emit_data(&self, affected: usize, follow_up: BankEvent<R>) {
        self.emit(&BankEvent::DataUpdated {
            affected,
            count: self.count(),
        });
        self.emit(&follow_up);
    }

    // =========================================================================
    // LOCKS & COLLABORATORS
    // =========================================================================

    fn meta(&self) -> RwLockReadGuard<'_, BankMeta> {
        self.meta.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn meta_mut(&self) -> RwLockWriteGuard<'_, BankMeta> {
        self.meta.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn map(&self) -> RwLockReadGuard<'_, BTreeMap<R::Id, R>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn map_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<R::Id, R>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.blocking_lock()
    }

    async fn write_gate_async(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    fn reader(&self) -> Result<Arc<dyn DataReader<R>>, BankError> {
        self.reader
            .clone()
            .ok_or_else(|| BankError::MissingReader { bank: self.id() })
    }

    fn writer(&self) -> Result<Arc<dyn DataWriter<R>>, BankError> {
        self.writer
            .clone()
            .ok_or_else(|| BankError::MissingWriter { bank: self.id() })
    }

    fn identity(&self) -> Result<Arc<dyn IdentityPolicy<R>>, BankError> {
        self.identity
            .clone()
            .ok_or_else(|| BankError::MissingIdentityPolicy { bank: self.id() })
    }

    fn not_found(&self) -> BankError {
        BankError::NotFound { bank: self.id() }
    }

    /// Map a writer verdict to a result.
    ///
    /// With a token: a token cancelled by the caller yields `Cancelled`; a
    /// plain rejection cancels the token and yields `WriteRejected`.
    fn write_outcome(
        &self,
        accepted: bool,
        writer: &dyn DataWriter<R>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), BankError> {
        if accepted {
            return Ok(());
        }
        match cancel {
            Some(token) if token.is_cancelled() => {
                tracing::warn!(bank = %self.id(), "write cancelled, in-memory change rolled back");
                Err(BankError::Cancelled { bank: self.id() })
            }
            Some(token) => {
                token.cancel();
                Err(self.rejected(writer))
            }
            None => Err(self.rejected(writer)),
        }
    }

    fn rejected(&self, writer: &dyn DataWriter<R>) -> BankError {
        let source = writer.source_name();
        tracing::warn!(
            bank = %self.id(),
            writer = %source,
            "write rejected, in-memory change rolled back"
        );
        BankError::WriteRejected {
            bank: self.id(),
            writer: source,
        }
    }

    fn undo(&self, journal: Vec<Undo<R>>) {
        apply_undo(&mut self.map_mut(), journal);
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Load every record through the reader, then write the loaded set back.
    ///
    /// The write-back lets load-time migrations reach storage. Returns the
    /// number of records loaded.
    pub fn initialize(&self) -> Result<usize, BankError> {
        let reader = self.reader()?;
        let writer = self.writer()?;
        let gate = self.write_gate();
        let loaded = reader.read_data()?;
        let journal = self.stage_load(&loaded)?;

        if !loaded.is_empty() {
            let accepted = writer.write_many(&loaded);
            if let Err(err) = self.write_outcome(accepted, writer.as_ref(), None) {
                self.undo(journal);
                return Err(err);
            }
        }
        drop(gate);
        Ok(self.finish_load(reader.as_ref(), loaded))
    }

    /// Asynchronous `initialize`.
    pub async fn initialize_async(&self, cancel: &CancellationToken) -> Result<usize, BankError> {
        let reader = self.reader()?;
        let writer = self.writer()?;
        let gate = self.write_gate_async().await;
        let loaded = reader.read_data_async(cancel).await?;
        let journal = self.stage_load(&loaded)?;

        if !loaded.is_empty() {
            let accepted =
                !cancel.is_cancelled() && writer.write_many_async(&loaded, cancel).await;
            if let Err(err) = self.write_outcome(accepted, writer.as_ref(), Some(cancel)) {
                self.undo(journal);
                return Err(err);
            }
        }
        drop(gate);
        Ok(self.finish_load(reader.as_ref(), loaded))
    }

    /// Insert loaded records; refuses the whole set on any duplicate id.
    fn stage_load(&self, loaded: &[R]) -> Result<Vec<Undo<R>>, BankError> {
        let mut data = self.map_mut();
        let mut seen = BTreeSet::new();
        for record in loaded {
            let id = record.id();
            if data.contains_key(&id) || !seen.insert(id.clone()) {
                return Err(BankError::DuplicateId {
                    bank: self.id(),
                    id: format!("{:?}", id),
                });
            }
        }

        let mut journal = Vec::with_capacity(loaded.len());
        for record in loaded {
            data.insert(record.id(), record.clone());
            journal.push(Undo::Inserted(record.id()));
        }
        Ok(journal)
    }

    fn finish_load(&self, reader: &dyn DataReader<R>, loaded: Vec<R>) -> usize {
        let total = loaded.len();
        tracing::info!(
            bank = %self.id(),
            source = %reader.source_name(),
            loaded = total,
            "bank initialized"
        );
        if total > 0 {
            self.emit_data(total, BankEvent::DataAdded(loaded));
        }
        total
    }

    // =========================================================================
    // NEW RECORDS
    // =========================================================================

    /// Build a fresh record stamped with the sentinel id. It is not inserted.
    pub fn build_new_data(&self) -> Result<R, BankError> {
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| BankError::MissingFactory { bank: self.id() })?;
        let policy = self.identity()?;
        let mut record = factory();
        record.set_id(policy.default_id());
        Ok(record)
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    /// Save one record.
    ///
    /// A record holding the sentinel id receives an id from the identity
    /// policy (visible in `record` afterwards). Returns whether the record
    /// entered the map.
    pub fn update_save(&self, record: &mut R) -> Result<bool, BankError> {
        let writer = self.writer()?;
        let policy = self.identity()?;
        let gate = self.write_gate();
        let staged = self.stage_update(policy.as_ref(), std::slice::from_mut(record))?;
        let inserted = staged.inserted > 0;

        let accepted = writer.write_one(record);
        if let Err(err) = self.write_outcome(accepted, writer.as_ref(), None) {
            self.revert_update(staged, std::slice::from_mut(record), policy.as_ref());
            return Err(err);
        }
        drop(gate);

        tracing::debug!(bank = %self.id(), id = ?record.id(), inserted, "record saved");
        self.emit_data(1, BankEvent::DataAdded(vec![record.clone()]));
        Ok(inserted)
    }

    /// Save several records with a single batched write.
    ///
    /// Returns the number of records that entered the map.
    pub fn update_save_many(&self, records: &mut [R]) -> Result<usize, BankError> {
        if records.is_empty() {
            return Ok(0);
        }
        let writer = self.writer()?;
        let policy = self.identity()?;
        let gate = self.write_gate();
        let staged = self.stage_update(policy.as_ref(), records)?;
        let inserted = staged.inserted;

        let accepted = writer.write_many(records);
        if let Err(err) = self.write_outcome(accepted, writer.as_ref(), None) {
            self.revert_update(staged, records, policy.as_ref());
            return Err(err);
        }
        drop(gate);

        tracing::debug!(bank = %self.id(), saved = records.len(), inserted, "records saved");
        self.emit_data(records.len(), BankEvent::DataAdded(records.to_vec()));
        Ok(inserted)
    }

    /// Asynchronous `update_save`.
    pub async fn update_save_async(
        &self,
        record: &mut R,
        cancel: &CancellationToken,
    ) -> Result<bool, BankError> {
        let writer = self.writer()?;
        let policy = self.identity()?;
        let gate = self.write_gate_async().await;
        let staged = self.stage_update(policy.as_ref(), std::slice::from_mut(record))?;
        let inserted = staged.inserted > 0;

        let accepted = !cancel.is_cancelled() && writer.write_one_async(record, cancel).await;
        if let Err(err) = self.write_outcome(accepted, writer.as_ref(), Some(cancel)) {
            self.revert_update(staged, std::slice::from_mut(record), policy.as_ref());
            return Err(err);
        }
        drop(gate);

        tracing::debug!(bank = %self.id(), id = ?record.id(), inserted, "record saved");
        self.emit_data(1, BankEvent::DataAdded(vec![record.clone()]));
        Ok(inserted)
    }

    /// Asynchronous `update_save_many`.
    pub async fn update_save_many_async(
        &self,
        records: &mut [R],
        cancel: &CancellationToken,
    ) -> Result<usize, BankError> {
        if records.is_empty() {
            return Ok(0);
        }
        let writer = self.writer()?;
        let policy = self.identity()?;
        let gate = self.write_gate_async().await;
        let staged = self.stage_update(policy.as_ref(), records)?;
        let inserted = staged.inserted;

        let accepted = !cancel.is_cancelled() && writer.write_many_async(records, cancel).await;
        if let Err(err) = self.write_outcome(accepted, writer.as_ref(), Some(cancel)) {
            self.revert_update(staged, records, policy.as_ref());
            return Err(err);
        }
        drop(gate);

        tracing::debug!(bank = %self.id(), saved = records.len(), inserted, "records saved");
        self.emit_data(records.len(), BankEvent::DataAdded(records.to_vec()));
        Ok(inserted)
    }

    /// Assign ids to sentinel records and put every record into the map.
    fn stage_update(
        &self,
        policy: &dyn IdentityPolicy<R>,
        records: &mut [R],
    ) -> Result<StagedUpdate<R>, BankError> {
        let mut data = self.map_mut();
        let mut staged = StagedUpdate {
            journal: Vec::with_capacity(records.len()),
            assigned: Vec::new(),
            inserted: 0,
        };
        let mut failure = None;

        for (index, record) in records.iter_mut().enumerate() {
            if policy.is_default_id(&record.id()) {
                let id = match policy.generate_id_for(&*data, record) {
                    Ok(id) => id,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                };
                record.set_id(id.clone());
                data.insert(id.clone(), record.clone());
                staged.journal.push(Undo::Inserted(id));
                staged.assigned.push(index);
                staged.inserted += 1;
            } else {
                match data.insert(record.id(), record.clone()) {
                    Some(previous) => staged.journal.push(Undo::Restore(previous)),
                    None => {
                        staged.journal.push(Undo::Inserted(record.id()));
                        staged.inserted += 1;
                    }
                }
            }
        }

        if let Some(err) = failure {
            apply_undo(&mut data, staged.journal);
            drop(data);
            for index in staged.assigned {
                if let Some(record) = records.get_mut(index) {
                    record.set_id(policy.default_id());
                }
            }
            return Err(err.into());
        }
        Ok(staged)
    }

    fn revert_update(
        &self,
        staged: StagedUpdate<R>,
        records: &mut [R],
        policy: &dyn IdentityPolicy<R>,
    ) {
        self.undo(staged.journal);
        for index in staged.assigned {
            if let Some(record) = records.get_mut(index) {
                record.set_id(policy.default_id());
            }
        }
    }

    // =========================================================================
    // SELF-REQUESTED SAVE
    // =========================================================================

    /// Persist a record that asked to be saved on its own.
    ///
    /// Only records the bank already holds are honoured. The stored copy is
    /// replaced by `record` and written; no bank events are raised.
    pub fn request_save(&self, record: &R) -> Result<(), BankError> {
        let writer = self.writer()?;
        let _gate = self.write_gate();
        let previous = self.stage_replace(record)?;
        let accepted = writer.write_one(record);
        if let Err(err) = self.write_outcome(accepted, writer.as_ref(), None) {
            self.undo(vec![Undo::Restore(previous)]);
            return Err(err);
        }
        tracing::debug!(bank = %self.id(), id = ?record.id(), "requested save written");
        Ok(())
    }

    /// Asynchronous `request_save`.
    pub async fn request_save_async(
        &self,
        record: &R,
        cancel: &CancellationToken,
    ) -> Result<(), BankError> {
        let writer = self.writer()?;
        let _gate = self.write_gate_async().await;
        let previous = self.stage_replace(record)?;
        let accepted = !cancel.is_cancelled() && writer.write_one_async(record, cancel).await;
        if let Err(err) = self.write_outcome(accepted, writer.as_ref(), Some(cancel)) {
            self.undo(vec![Undo::Restore(previous)]);
            return Err(err);
        }
        tracing::debug!(bank = %self.id(), id = ?record.id(), "requested save written");
        Ok(())
    }

    fn stage_replace(&self, record: &R) -> Result<R, BankError> {
        let mut data = self.map_mut();
        match data.get_mut(&record.id()) {
            Some(stored) => Ok(std::mem::replace(stored, record.clone())),
            None => Err(self.not_found()),
        }
    }

    // =========================================================================
    // DROP
    // =========================================================================

    /// Drop one record according to the bank's drop strategy.
    ///
    /// Returns `Ok(false)` without writing when the record is not held or is
    /// already disabled. Under `Disable`, `record` is disabled as well.
    pub fn drop_save(&self, record: &mut R) -> Result<bool, BankError> {
        let dropped = self.drop_save_many(std::slice::from_mut(record))?;
        Ok(dropped > 0)
    }

    /// Drop several records. Records that are not held or already disabled
    /// are skipped; returns the number actually dropped.
    pub fn drop_save_many(&self, records: &mut [R]) -> Result<usize, BankError> {
        let writer = self.writer()?;
        let ids: Vec<R::Id> = records.iter().map(|r| r.id()).collect();
        let gate = self.write_gate();
        let staged = self.stage_drop(|_| ids);
        if staged.affected.is_empty() {
            return Ok(0);
        }

        let accepted = self.write_drop(writer.as_ref(), &staged);
        let dropped = self.settle_drop(accepted, writer.as_ref(), None, staged, records)?;
        drop(gate);
        Ok(self.announce_drop(dropped))
    }

    /// Drop every enabled record matching `predicate`.
    pub fn drop_save_where(&self, predicate: impl Fn(&R) -> bool) -> Result<usize, BankError> {
        let writer = self.writer()?;
        let gate = self.write_gate();
        let staged = self.stage_drop(|data| Self::select_enabled(data, &predicate));
        if staged.affected.is_empty() {
            return Ok(0);
        }

        let accepted = self.write_drop(writer.as_ref(), &staged);
        let dropped = self.settle_drop(accepted, writer.as_ref(), None, staged, &mut [])?;
        drop(gate);
        Ok(self.announce_drop(dropped))
    }

    /// Asynchronous `drop_save`.
    pub async fn drop_save_async(
        &self,
        record: &mut R,
        cancel: &CancellationToken,
    ) -> Result<bool, BankError> {
        let dropped = self
            .drop_save_many_async(std::slice::from_mut(record), cancel)
            .await?;
        Ok(dropped > 0)
    }

    /// Asynchronous `drop_save_many`.
    pub async fn drop_save_many_async(
        &self,
        records: &mut [R],
        cancel: &CancellationToken,
    ) -> Result<usize, BankError> {
        let writer = self.writer()?;
        let ids: Vec<R::Id> = records.iter().map(|r| r.id()).collect();
        let gate = self.write_gate_async().await;
        let staged = self.stage_drop(|_| ids);
        if staged.affected.is_empty() {
            return Ok(0);
        }

        let accepted =
            !cancel.is_cancelled() && self.write_drop_async(writer.as_ref(), &staged, cancel).await;
        let dropped = self.settle_drop(accepted, writer.as_ref(), Some(cancel), staged, records)?;
        drop(gate);
        Ok(self.announce_drop(dropped))
    }

    /// Asynchronous `drop_save_where`.
    pub async fn drop_save_where_async(
        &self,
        predicate: impl Fn(&R) -> bool + Send + Sync,
        cancel: &CancellationToken,
    ) -> Result<usize, BankError> {
        let writer = self.writer()?;
        let gate = self.write_gate_async().await;
        let staged = self.stage_drop(|data| Self::select_enabled(data, &predicate));
        if staged.affected.is_empty() {
            return Ok(0);
        }

        let accepted =
            !cancel.is_cancelled() && self.write_drop_async(writer.as_ref(), &staged, cancel).await;
        let dropped = self.settle_drop(accepted, writer.as_ref(), Some(cancel), staged, &mut [])?;
        drop(gate);
        Ok(self.announce_drop(dropped))
    }

    fn select_enabled(data: &BTreeMap<R::Id, R>, predicate: &impl Fn(&R) -> bool) -> Vec<R::Id> {
        data.values()
            .filter(|r| r.is_enabled() && predicate(r))
            .map(|r| r.id())
            .collect()
    }

    /// Apply the drop strategy to the selected ids.
    fn stage_drop(
        &self,
        select: impl FnOnce(&BTreeMap<R::Id, R>) -> Vec<R::Id>,
    ) -> StagedDrop<R> {
        let mut data = self.map_mut();
        let ids = select(&data);
        let mut staged = StagedDrop {
            journal: Vec::with_capacity(ids.len()),
            affected: Vec::with_capacity(ids.len()),
            snapshot: None,
        };

        for id in ids {
            match self.drop_strategy {
                DropStrategy::Disable => match data.get_mut(&id) {
                    Some(stored) if stored.is_enabled() => {
                        staged.journal.push(Undo::Restore(stored.clone()));
                        stored.disable();
                        staged.affected.push(stored.clone());
                    }
                    Some(_) => {
                        tracing::debug!(bank = %self.id(), id = ?id, "already disabled, skipped");
                    }
                    None => {
                        tracing::warn!(bank = %self.id(), id = ?id, "drop of unknown record skipped");
                    }
                },
                DropStrategy::Delete => match data.remove(&id) {
                    Some(previous) => {
                        staged.affected.push(previous.clone());
                        staged.journal.push(Undo::Restore(previous));
                    }
                    None => {
                        tracing::warn!(bank = %self.id(), id = ?id, "drop of unknown record skipped");
                    }
                },
            }
        }

        if self.drop_strategy == DropStrategy::Delete && !staged.affected.is_empty() {
            staged.snapshot = Some(data.values().cloned().collect());
        }
        staged
    }

    fn write_drop(&self, writer: &dyn DataWriter<R>, staged: &StagedDrop<R>) -> bool {
        match (&staged.snapshot, staged.affected.as_slice()) {
            (Some(snapshot), _) => writer.write_snapshot(snapshot),
            (None, [one]) => writer.write_one(one),
            (None, many) => writer.write_many(many),
        }
    }

    async fn write_drop_async(
        &self,
        writer: &dyn DataWriter<R>,
        staged: &StagedDrop<R>,
        cancel: &CancellationToken,
    ) -> bool {
        match (&staged.snapshot, staged.affected.as_slice()) {
            (Some(snapshot), _) => writer.write_snapshot_async(snapshot, cancel).await,
            (None, [one]) => writer.write_one_async(one, cancel).await,
            (None, many) => writer.write_many_async(many, cancel).await,
        }
    }

    /// Roll back on failure; otherwise mirror the drop into the caller's
    /// records. Returns the dropped records.
    fn settle_drop(
        &self,
        accepted: bool,
        writer: &dyn DataWriter<R>,
        cancel: Option<&CancellationToken>,
        staged: StagedDrop<R>,
        records: &mut [R],
    ) -> Result<Vec<R>, BankError> {
        if let Err(err) = self.write_outcome(accepted, writer, cancel) {
            self.undo(staged.journal);
            return Err(err);
        }

        if self.drop_strategy == DropStrategy::Disable {
            let dropped: BTreeSet<R::Id> = staged.affected.iter().map(|r| r.id()).collect();
            for record in records.iter_mut() {
                if dropped.contains(&record.id()) {
                    record.disable();
                }
            }
        }

        tracing::debug!(
            bank = %self.id(),
            strategy = %self.drop_strategy,
            dropped = staged.affected.len(),
            "records dropped"
        );
        Ok(staged.affected)
    }

    fn announce_drop(&self, dropped: Vec<R>) -> usize {
        let total = dropped.len();
        self.emit_data(total, BankEvent::DataDropped(dropped));
        total
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Enabled records in key order.
    #[must_use]
    pub fn readonly_data(&self) -> Vec<R> {
        self.map().values().filter(|r| r.is_enabled()).cloned().collect()
    }

    /// Every record, disabled ones included, in key order.
    #[must_use]
    pub fn all_readonly_data(&self) -> Vec<R> {
        self.map().values().cloned().collect()
    }

    /// Every record wrapped with its id, in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<IdData<R>> {
        self.map().values().cloned().map(IdData::new).collect()
    }

    /// Number of enabled records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.map().values().filter(|r| r.is_enabled()).count()
    }

    /// Number of records, disabled ones included.
    #[must_use]
    pub fn count_all(&self) -> usize {
        self.map().len()
    }

    #[must_use]
    pub fn contains(&self, id: &R::Id) -> bool {
        self.map().contains_key(id)
    }

    #[must_use]
    pub fn try_get(&self, id: &R::Id) -> Option<R> {
        self.map().get(id).cloned()
    }

    /// First record in key order matching `predicate` (disabled included).
    #[must_use]
    pub fn try_find(&self, predicate: impl Fn(&R) -> bool) -> Option<R> {
        self.map().values().find(|r| predicate(r)).cloned()
    }

    pub fn get(&self, id: &R::Id) -> Result<R, BankError> {
        self.try_get(id).ok_or_else(|| self.not_found())
    }

    pub fn find(&self, predicate: impl Fn(&R) -> bool) -> Result<R, BankError> {
        self.try_find(predicate).ok_or_else(|| self.not_found())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceError;
    use crate::identity::SmallestAvailable;
    use crate::io::MemoryStore;
    use std::sync::{Mutex, mpsc};
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Task {
        id: i64,
        title: String,
        enabled: bool,
    }

    impl Record for Task {
        type Id = i64;

        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
    }

    fn task(title: &str) -> Task {
        Task {
            id: -1,
            title: title.to_string(),
            enabled: true,
        }
    }

    fn bank_with(store: &MemoryStore<Task>, strategy: DropStrategy) -> Bank<Task> {
        Bank::builder("tasks")
            .store(store.clone())
            .identity(SmallestAvailable::new())
            .drop_strategy(strategy)
            .factory(|| task("untitled"))
            .build()
    }

    fn recorded_events(bank: &Bank<Task>) -> Arc<Mutex<Vec<BankEvent<Task>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bank.subscribe(move |event| sink.lock().expect("events").push(event.clone()));
        events
    }

    #[test]
    fn id_is_short_lowercase_type_name() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        assert_eq!(bank.id(), "task");
        assert!(bank.record_type().ends_with("Task"));
        assert_eq!(bank.description().as_deref(), Some(DEFAULT_DESCRIPTION));
    }

    #[test]
    fn missing_collaborators_fail_fast() {
        let bank: Bank<Task> = Bank::builder("bare").build();
        let mut record = task("a");

        assert!(matches!(
            bank.initialize(),
            Err(BankError::MissingReader { .. })
        ));
        assert!(matches!(
            bank.update_save(&mut record),
            Err(BankError::MissingWriter { .. })
        ));
        assert!(matches!(
            bank.build_new_data(),
            Err(BankError::MissingFactory { .. })
        ));

        let bank: Bank<Task> = Bank::builder("no-ids")
            .writer(MemoryStore::new("tasks"))
            .build();
        assert!(matches!(
            bank.update_save(&mut record),
            Err(BankError::MissingIdentityPolicy { .. })
        ));
        assert_eq!(bank.count_all(), 0);
    }

    #[test]
    fn build_new_data_is_stamped_but_not_inserted() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let record = bank.build_new_data().expect("new");
        assert_eq!(record.id, -1);
        assert_eq!(bank.count_all(), 0);
    }

    #[test]
    fn update_save_assigns_id_and_writes() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let mut record = task("a");

        assert!(bank.update_save(&mut record).expect("save"));
        assert_eq!(record.id, 1);
        assert_eq!(store.stored(), vec![record.clone()]);

        record.title = "renamed".to_string();
        assert!(!bank.update_save(&mut record).expect("resave"));
        assert_eq!(bank.get(&1).expect("get").title, "renamed");
        assert_eq!(bank.count(), 1);
    }

    #[test]
    fn events_fire_updated_then_added() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let events = recorded_events(&bank);
        let mut record = task("a");

        bank.update_save(&mut record).expect("save");

        let events = events.lock().expect("events");
        assert_eq!(
            *events,
            vec![
                BankEvent::DataUpdated {
                    affected: 1,
                    count: 1
                },
                BankEvent::DataAdded(vec![record.clone()]),
            ]
        );
    }

    #[test]
    fn rejected_write_rolls_back_new_record() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let events = recorded_events(&bank);
        store.set_reject_writes(true);
        let mut record = task("a");

        let result = bank.update_save(&mut record);

        assert!(matches!(result, Err(BankError::WriteRejected { .. })));
        assert_eq!(record.id, -1);
        assert_eq!(bank.count_all(), 0);
        assert!(events.lock().expect("events").is_empty());
    }

    #[test]
    fn rejected_write_restores_replaced_value() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let mut record = task("a");
        bank.update_save(&mut record).expect("save");

        store.set_reject_writes(true);
        let mut edited = record.clone();
        edited.title = "edited".to_string();
        assert!(bank.update_save(&mut edited).is_err());

        assert_eq!(bank.get(&1).expect("get").title, "a");
    }

    #[test]
    fn batch_update_writes_once() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let events = recorded_events(&bank);
        let mut records = vec![task("a"), task("b"), task("c")];

        assert_eq!(bank.update_save_many(&mut records).expect("save"), 3);

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(store.write_calls(), 1);
        assert_eq!(events.lock().expect("events").len(), 2);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        assert_eq!(bank.update_save_many(&mut []).expect("save"), 0);
        assert_eq!(store.write_calls(), 0);
    }

    #[test]
    fn identity_failure_mid_batch_rolls_back() {
        let store = MemoryStore::new("tasks");
        let bank = Bank::builder("tasks")
            .store(store.clone())
            .identity(SmallestAvailable::new().with_upper_bound(2))
            .build();
        let mut records = vec![task("a"), task("b"), task("c")];

        let result = bank.update_save_many(&mut records);

        assert!(matches!(result, Err(BankError::Identity(_))));
        assert_eq!(bank.count_all(), 0);
        assert!(records.iter().all(|r| r.id == -1));
        assert_eq!(store.write_calls(), 0);
    }

    #[test]
    fn disable_drop_is_idempotent() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let mut record = task("a");
        bank.update_save(&mut record).expect("save");
        let events = recorded_events(&bank);

        assert!(bank.drop_save(&mut record).expect("drop"));
        assert!(!record.enabled);
        assert!(!bank.drop_save(&mut record).expect("drop again"));

        assert_eq!(bank.count(), 0);
        assert_eq!(bank.count_all(), 1);
        let updates = events
            .lock()
            .expect("events")
            .iter()
            .filter(|e| matches!(e, BankEvent::DataUpdated { .. }))
            .count();
        assert_eq!(updates, 1);
    }

    #[test]
    fn delete_drop_writes_remaining_snapshot() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Delete);
        let mut records = vec![task("a"), task("b")];
        bank.update_save_many(&mut records).expect("save");

        assert!(bank.drop_save(&mut records[0]).expect("drop"));

        assert!(!bank.contains(&1));
        let snapshot = store.last_snapshot().expect("snapshot");
        assert_eq!(snapshot, vec![records[1].clone()]);
        assert!(records[0].enabled);
    }

    #[test]
    fn rejected_delete_restores_record() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Delete);
        let mut record = task("a");
        bank.update_save(&mut record).expect("save");
        store.set_reject_writes(true);

        assert!(bank.drop_save(&mut record).is_err());
        assert!(bank.contains(&1));
    }

    #[test]
    fn drop_of_unknown_record_is_skipped() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Delete);
        let mut known = task("a");
        bank.update_save(&mut known).expect("save");
        let mut stranger = task("ghost");
        stranger.id = 99;

        let dropped = bank
            .drop_save_many(&mut [known.clone(), stranger])
            .expect("drop");

        assert_eq!(dropped, 1);
        assert_eq!(bank.count_all(), 0);
    }

    #[test]
    fn request_save_requires_held_record() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let events = recorded_events(&bank);

        let mut record = task("a");
        assert!(matches!(
            bank.request_save(&record),
            Err(BankError::NotFound { .. })
        ));

        bank.update_save(&mut record).expect("save");
        let before = events.lock().expect("events").len();
        record.title = "self-saved".to_string();
        bank.request_save(&record).expect("request");

        assert_eq!(store.stored()[0].title, "self-saved");
        assert_eq!(events.lock().expect("events").len(), before);
    }

    #[test]
    fn lookups() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let mut records = vec![task("a"), task("b")];
        bank.update_save_many(&mut records).expect("save");

        assert_eq!(bank.try_get(&2).map(|t| t.title), Some("b".to_string()));
        assert!(bank.try_get(&3).is_none());
        assert!(matches!(bank.get(&3), Err(BankError::NotFound { .. })));
        assert_eq!(bank.find(|t| t.title == "a").expect("find").id, 1);
        assert!(bank.find(|t| t.title == "z").is_err());
        assert_eq!(bank.entries().len(), 2);
    }

    #[test]
    fn info_updates_are_announced() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let events = recorded_events(&bank);

        bank.set_name("Chores");

        let events = events.lock().expect("events");
        assert!(matches!(
            events.first(),
            Some(BankEvent::InfoUpdated(info)) if info.name == "Chores"
        ));
    }

    #[tokio::test]
    async fn async_rejection_cancels_token() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        store.set_reject_writes(true);
        let token = CancellationToken::new();
        let mut record = task("a");

        let result = bank.update_save_async(&mut record, &token).await;

        assert!(matches!(result, Err(BankError::WriteRejected { .. })));
        assert!(token.is_cancelled());
        assert_eq!(bank.count_all(), 0);
    }

    #[tokio::test]
    async fn async_cancelled_before_write_rolls_back() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let token = CancellationToken::new();
        token.cancel();
        let mut record = task("a");

        let result = bank.update_save_async(&mut record, &token).await;

        assert!(matches!(result, Err(BankError::Cancelled { .. })));
        assert_eq!(store.write_calls(), 0);
        assert_eq!(record.id, -1);
    }

    fn saved_task(id: i64, title: &str) -> Task {
        Task {
            id,
            title: title.to_string(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn async_batch_rejection_unassigns_ids() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        store.set_reject_writes(true);
        let token = CancellationToken::new();
        let mut records = vec![task("a"), task("b")];

        let result = bank.update_save_many_async(&mut records, &token).await;

        assert!(matches!(result, Err(BankError::WriteRejected { .. })));
        assert!(token.is_cancelled());
        assert!(records.iter().all(|r| r.id == -1));
        assert_eq!(bank.count_all(), 0);
    }

    #[tokio::test]
    async fn async_batch_with_cancelled_token_never_writes() {
        let store = MemoryStore::new("tasks");
        let bank = bank_with(&store, DropStrategy::Disable);
        let token = CancellationToken::new();
        token.cancel();
        let mut records = vec![task("a"), task("b")];

        let result = bank.update_save_many_async(&mut records, &token).await;

        assert!(matches!(result, Err(BankError::Cancelled { .. })));
        assert_eq!(store.write_calls(), 0);
        assert!(records.iter().all(|r| r.id == -1));
        assert_eq!(bank.count_all(), 0);
    }

    #[tokio::test]
    async fn async_initialize_rejected_write_back_unloads() {
        let store = MemoryStore::with_records("tasks", vec![saved_task(1, "a"), saved_task(2, "b")]);
        let bank = bank_with(&store, DropStrategy::Disable);
        let events = recorded_events(&bank);
        store.set_reject_writes(true);
        let token = CancellationToken::new();

        let result = bank.initialize_async(&token).await;

        assert!(matches!(result, Err(BankError::WriteRejected { .. })));
        assert!(token.is_cancelled());
        assert_eq!(bank.count_all(), 0);
        assert!(events.lock().expect("events").is_empty());
    }

    #[tokio::test]
    async fn async_initialize_with_cancelled_token_loads_nothing() {
        let store = MemoryStore::with_records("tasks", vec![saved_task(1, "a")]);
        let bank = bank_with(&store, DropStrategy::Disable);
        let token = CancellationToken::new();
        token.cancel();

        let result = bank.initialize_async(&token).await;

        assert!(matches!(
            result,
            Err(BankError::Source(SourceError::Cancelled { .. }))
        ));
        assert_eq!(store.write_calls(), 0);
        assert_eq!(bank.count_all(), 0);
    }

    #[tokio::test]
    async fn async_drops_roll_back_on_rejection() {
        for strategy in [DropStrategy::Disable, DropStrategy::Delete] {
            let store = MemoryStore::new("tasks");
            let bank = bank_with(&store, strategy);
            let mut records = vec![task("a"), task("b"), task("c")];
            bank.update_save_many_async(&mut records, &CancellationToken::new())
                .await
                .expect("save");
            let before = bank.all_readonly_data();
            let events = recorded_events(&bank);
            store.set_reject_writes(true);

            let token = CancellationToken::new();
            let single = bank.drop_save_async(&mut records[0], &token).await;
            assert!(
                matches!(single, Err(BankError::WriteRejected { .. })),
                "{strategy}"
            );
            assert!(token.is_cancelled(), "{strategy}");

            let token = CancellationToken::new();
            let many = bank.drop_save_many_async(&mut records[1..], &token).await;
            assert!(
                matches!(many, Err(BankError::WriteRejected { .. })),
                "{strategy}"
            );
            assert!(token.is_cancelled(), "{strategy}");

            let token = CancellationToken::new();
            let matching = bank
                .drop_save_where_async(|t: &Task| t.title != "a", &token)
                .await;
            assert!(
                matches!(matching, Err(BankError::WriteRejected { .. })),
                "{strategy}"
            );
            assert!(token.is_cancelled(), "{strategy}");

            assert_eq!(bank.all_readonly_data(), before, "{strategy}");
            assert!(records.iter().all(|r| r.enabled), "{strategy}");
            assert!(events.lock().expect("events").is_empty(), "{strategy}");
        }
    }

    #[tokio::test]
    async fn async_drops_with_cancelled_token_never_write() {
        for strategy in [DropStrategy::Disable, DropStrategy::Delete] {
            let store = MemoryStore::new("tasks");
            let bank = bank_with(&store, strategy);
            let mut records = vec![task("a"), task("b"), task("c")];
            bank.update_save_many_async(&mut records, &CancellationToken::new())
                .await
                .expect("save");
            let before = bank.all_readonly_data();
            let writes = store.write_calls();
            let token = CancellationToken::new();
            token.cancel();

            let single = bank.drop_save_async(&mut records[0], &token).await;
            let many = bank.drop_save_many_async(&mut records[1..], &token).await;
            let matching = bank.drop_save_where_async(|_: &Task| true, &token).await;

            for result in [single.map(usize::from), many, matching] {
                assert!(
                    matches!(result, Err(BankError::Cancelled { .. })),
                    "{strategy}"
                );
            }
            assert_eq!(store.write_calls(), writes, "{strategy}");
            assert_eq!(bank.all_readonly_data(), before, "{strategy}");
            assert!(records.iter().all(|r| r.enabled), "{strategy}");
        }
    }

    /// Writer whose first snapshot waits for a verdict from the test thread.
    struct HeldSnapshot {
        inner: MemoryStore<Task>,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        verdict: Mutex<Option<mpsc::Receiver<bool>>>,
    }

    impl HeldSnapshot {
        fn new(inner: MemoryStore<Task>) -> (Self, mpsc::Receiver<()>, mpsc::Sender<bool>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (verdict_tx, verdict_rx) = mpsc::channel();
            let writer = Self {
                inner,
                entered: Mutex::new(Some(entered_tx)),
                verdict: Mutex::new(Some(verdict_rx)),
            };
            (writer, entered_rx, verdict_tx)
        }
    }

    impl DataWriter<Task> for HeldSnapshot {
        fn source_name(&self) -> String {
            DataWriter::source_name(&self.inner)
        }

        fn write_one(&self, item: &Task) -> bool {
            self.inner.write_one(item)
        }

        fn write_many(&self, items: &[Task]) -> bool {
            self.inner.write_many(items)
        }

        fn write_snapshot(&self, items: &[Task]) -> bool {
            let entered = self.entered.lock().expect("entered").take();
            let verdict = self.verdict.lock().expect("verdict").take();
            match (entered, verdict) {
                (Some(entered), Some(verdict)) => {
                    entered.send(()).expect("signal");
                    verdict.recv().expect("verdict") && self.inner.write_snapshot(items)
                }
                _ => self.inner.write_snapshot(items),
            }
        }
    }

    /// Under `Delete`, drop `a` on one thread while its snapshot write is
    /// held, and save a new record on another. `verdict` settles the snapshot.
    fn drop_while_saving(
        verdict: bool,
    ) -> (Bank<Task>, MemoryStore<Task>, Task, Result<bool, BankError>) {
        let store = MemoryStore::new("tasks");
        let (writer, entered, release) = HeldSnapshot::new(store.clone());
        let bank = Bank::builder("tasks")
            .reader(store.clone())
            .writer(writer)
            .identity(SmallestAvailable::new())
            .drop_strategy(DropStrategy::Delete)
            .build();
        let mut records = vec![task("a"), task("b")];
        bank.update_save_many(&mut records).expect("save");

        let mut fresh = task("c");
        let dropped = thread::scope(|scope| {
            let dropping = scope.spawn(|| bank.drop_save(&mut records[0]));
            entered.recv().expect("snapshot started");
            let saving = scope.spawn(|| bank.update_save(&mut fresh));
            thread::sleep(Duration::from_millis(50));
            release.send(verdict).expect("release");
            saving.join().expect("save thread").expect("save");
            dropping.join().expect("drop thread")
        });
        (bank, store, fresh, dropped)
    }

    #[test]
    fn snapshot_drop_is_ordered_before_concurrent_save() {
        let (bank, store, fresh, dropped) = drop_while_saving(true);

        assert!(dropped.expect("drop"));
        assert_eq!(fresh.id, 1);
        assert_eq!(store.stored(), bank.all_readonly_data());
        assert_eq!(store.stored()[0].title, "c");
    }

    #[test]
    fn rejected_snapshot_rollback_keeps_concurrent_save() {
        let (bank, store, fresh, dropped) = drop_while_saving(false);

        assert!(matches!(dropped, Err(BankError::WriteRejected { .. })));
        assert_eq!(bank.get(&1).expect("restored").title, "a");
        assert_eq!(fresh.id, 3);
        assert_eq!(bank.get(&3).expect("fresh").title, "c");
        assert_eq!(store.stored(), bank.all_readonly_data());
    }
}
