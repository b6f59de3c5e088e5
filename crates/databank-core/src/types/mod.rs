//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the Databank store:
//! - The record contract (`Record`)
//! - The id + value entry wrapper (`IdData`)
//! - Bank metadata (`BankInfo`, `DropStrategy`)
//! - Error types for every layer (`IdentityError`, `SourceError`,
//!   `FilterError`, `BankError`)
//!
//! ## Ordering Guarantees
//!
//! Record ids implement `Ord`. Banks keep records in a `BTreeMap` keyed by
//! id, so every read follows key order regardless of insertion order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

// =============================================================================
// RECORD CONTRACT
// =============================================================================

/// A domain record that can live in a bank.
///
/// Records carry their own id and a soft-delete flag. A record created by
/// application code holds the identity policy's sentinel id until its first
/// successful save assigns a real one.
///
/// Two records describe the same entity iff their ids are equal.
/// Implementors that provide `PartialEq` should compare ids only, so that
/// equality agrees with `same_identity`.
pub trait Record: Clone + Send + Sync + 'static {
    /// Totally ordered key type.
    type Id: Ord + Clone + fmt::Debug + Send + Sync + 'static;

    /// Current id of the record.
    fn id(&self) -> Self::Id;

    /// Overwrite the id of the record.
    fn set_id(&mut self, id: Self::Id);

    /// Whether the record is visible to enabled-only reads.
    fn is_enabled(&self) -> bool;

    /// Set the soft-delete flag.
    fn set_enabled(&mut self, enabled: bool);

    fn enable(&mut self) {
        self.set_enabled(true);
    }

    fn disable(&mut self) {
        self.set_enabled(false);
    }

    /// Identity comparison (ids only, field values are ignored).
    fn same_identity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

// =============================================================================
// ENTRY WRAPPER
// =============================================================================

/// Pairs a record with its id.
///
/// The active flag is the record's own `is_enabled()`: enabling or disabling
/// the wrapper writes through to the wrapped value, so the two can never
/// disagree.
#[derive(Debug, Clone)]
pub struct IdData<R: Record> {
    id: R::Id,
    value: R,
}

impl<R: Record> IdData<R> {
    /// Wrap a record, capturing its current id.
    #[must_use]
    pub fn new(value: R) -> Self {
        Self {
            id: value.id(),
            value,
        }
    }

    /// The id captured when the entry was built.
    #[must_use]
    pub fn id(&self) -> &R::Id {
        &self.id
    }

    /// The wrapped record.
    #[must_use]
    pub fn value(&self) -> &R {
        &self.value
    }

    /// Unwrap the record.
    #[must_use]
    pub fn into_value(self) -> R {
        self.value
    }

    /// Whether the wrapped record is enabled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.value.is_enabled()
    }

    pub fn enable(&mut self) {
        self.value.enable();
    }

    pub fn disable(&mut self) {
        self.value.disable();
    }
}

impl<R: Record> PartialEq for IdData<R> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<R: Record> Eq for IdData<R> {}

impl<R: Record> PartialOrd for IdData<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R: Record> Ord for IdData<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl<R: Record + fmt::Display> fmt::Display for IdData<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} - {}", self.id, self.value)
    }
}

// =============================================================================
// BANK METADATA
// =============================================================================

/// How a bank removes records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropStrategy {
    /// Flip `is_enabled` to false; the record stays in the map and in storage.
    #[default]
    Disable,
    /// Remove the record from the map and rewrite the remaining snapshot.
    Delete,
}

impl fmt::Display for DropStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disable => f.write_str("disable"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Summary of a bank, as mirrored by a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankInfo {
    /// Number of enabled records.
    pub count: usize,
    /// Full type name of the records held.
    pub record_type: String,
    pub name: String,
    pub description: Option<String>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by identity policies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The policy cannot produce ids that are not tied to a record.
    #[error("Identity policy '{policy}' does not generate free-standing ids")]
    Unsupported { policy: &'static str },

    /// Every slot between the bounds is taken.
    #[error("Id space exhausted between {start} and {upper}")]
    Exhausted { start: String, upper: String },

    /// Random draws kept colliding with held ids.
    #[error("No free id found after {attempts} attempts")]
    RetriesExhausted { attempts: usize },

    /// A derived id is already held by another record.
    #[error("Derived id {0} is already held")]
    Collision(String),

    /// A derived id equals the unassigned sentinel.
    #[error("Derived id equals the unassigned sentinel")]
    DerivedSentinel,
}

/// Errors raised by persistence readers.
///
/// Writers never raise: they report failure as `false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The backing resource does not exist.
    #[error("Source not found: {source_name}")]
    NotFound { source_name: String },

    /// The backing resource could not be read.
    #[error("I/O error in {source_name}: {message}")]
    Io {
        source_name: String,
        message: String,
    },

    /// The backing resource was read but could not be decoded.
    #[error("Format error in {source_name}: {message}")]
    Format {
        source_name: String,
        message: String,
    },

    /// The read was cancelled through its token.
    #[error("Read from {source_name} cancelled")]
    Cancelled { source_name: String },
}

/// Errors raised by the explorable view pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("State {state} is outside 0..{valid_states}")]
    InvalidState { state: u8, valid_states: u8 },

    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("Filter already registered: {0}")]
    DuplicateFilter(String),

    /// `source_obsolete` was called on a view built from a fixed snapshot.
    #[error("View has no data retriever")]
    NoRetriever,
}

/// Errors raised by banks and registries.
///
/// - Configuration errors (`Missing*`) fail fast before any state changes
/// - `NotFound` is surfaced, never retried
/// - `WriteRejected` and `Cancelled` are reported after the in-memory
///   change has been rolled back
#[derive(Debug, Error)]
pub enum BankError {
    #[error("Null reader in bank '{bank}'")]
    MissingReader { bank: String },

    #[error("Null writer in bank '{bank}'")]
    MissingWriter { bank: String },

    #[error("Null identity policy in bank '{bank}'")]
    MissingIdentityPolicy { bank: String },

    #[error("No record factory in bank '{bank}'")]
    MissingFactory { bank: String },

    #[error("Element not found in bank '{bank}'")]
    NotFound { bank: String },

    #[error("Duplicate id {id} while loading bank '{bank}'")]
    DuplicateId { bank: String, id: String },

    #[error("Writer '{writer}' rejected the write in bank '{bank}'")]
    WriteRejected { bank: String, writer: String },

    #[error("Operation cancelled in bank '{bank}'")]
    Cancelled { bank: String },

    #[error("No bank registered for record type '{0}'")]
    UnregisteredType(String),

    #[error("A bank for record type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

// =============================================================================
// TESTS
// =============================================================================
