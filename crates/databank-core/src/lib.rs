//! # databank-core
//!
//! The typed record store for Databank - THE STORE.
//!
//! This crate implements per-record-type banks: in-memory indexed
//! collections that assign ids, track soft deletion, and persist every
//! change through an abstract reader/writer boundary.
//!
//! ## Layout
//!
//! - `types` → record contract, entry wrapper, errors
//! - `identity` → id generation policies
//! - `io` → persistence boundary (`DataReader`, `DataWriter`) and `MemoryStore`
//! - `bank` → the indexed store and its events
//! - `registry` → explicit type → bank lookup
//! - `view` → filtered, ordered views over a sequence
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Never interprets a storage format; backends live in the application
//! - Never holds a map lock across a writer call or an `.await`
//! - Serializes mutations per bank, from staging until the write settles
//! - Rolls back in-memory changes when a write is rejected
//! - Has no global state: registries are passed explicitly

// =============================================================================
// MODULES
// =============================================================================

pub mod bank;
pub mod identity;
pub mod io;
pub mod primitives;
pub mod registry;
pub mod types;
pub mod view;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    BankError, BankInfo, DropStrategy, FilterError, IdData, IdentityError, Record, SourceError,
};

// =============================================================================
// RE-EXPORTS: Store
// =============================================================================

pub use bank::{Bank, BankBuilder, BankEvent, BankListener};
pub use identity::{IdSet, IdentityPolicy, PropertyDerived, SmallestAvailable, UuidPolicy};
pub use io::{DataReader, DataWriter, MemoryStore};
pub use registry::Registry;

// =============================================================================
// RE-EXPORTS: Views
// =============================================================================

pub use view::{
    DataFilter, Explorable, FilterChange, KeyOrdering, SelectingFilter, SwitchState,
};

// =============================================================================
// RE-EXPORTS: Async plumbing
// =============================================================================

pub use tokio_util::sync::CancellationToken;
