//! # Store Primitives
//!
//! Fixed constants for the Databank CORE.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Policies and filters accept overrides where a caller genuinely needs one.

/// Sentinel id carried by integer-keyed records that have not been saved yet.
pub const DEFAULT_SENTINEL_ID: i64 = -1;

/// First id handed out by the smallest-available integer policy.
pub const DEFAULT_START_ID: i64 = 1;

/// Upper bound on random draws when looking for a collision-free id.
///
/// A random policy that keeps colliding after this many attempts reports
/// exhaustion instead of spinning forever.
pub const MAX_GENERATION_ATTEMPTS: usize = 64;

/// Description used when a bank is built without one.
pub const DEFAULT_DESCRIPTION: &str = "No more info";

// =============================================================================
// FILTER STATES
// =============================================================================

/// State shared by every filter: switched off.
pub const STATE_DISABLED: u8 = 0;

/// Number of states of a predicate filter (off, on).
pub const SELECTING_STATES: u8 = 2;

/// Number of states of an ordering filter (unordered, ascending, descending).
pub const ORDERING_STATES: u8 = 3;

/// Ordering state: ascending by key.
pub const ORDER_ASCENDING: u8 = 1;

/// Ordering state: descending by key.
pub const ORDER_DESCENDING: u8 = 2;
