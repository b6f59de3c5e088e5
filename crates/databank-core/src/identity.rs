//! # Identity Policies
//!
//! Pluggable id assignment for banks.
//!
//! A policy knows the sentinel ("unassigned") id of its key type, can draw a
//! fresh id on its own, and can resolve an id for a new record against the
//! set of ids a bank already holds (enabled and disabled alike).
//!
//! ## Policies
//!
//! - `UuidPolicy`: random 128-bit ids, retried on collision
//! - `SmallestAvailable`: smallest free integer at or above a start bound,
//!   reusing gaps left by hard deletes
//! - `PropertyDerived`: id computed from the record itself (natural key)
//!
//! Every search is bounded. Exhaustion is reported as an error.

use crate::primitives::{DEFAULT_SENTINEL_ID, DEFAULT_START_ID, MAX_GENERATION_ATTEMPTS};
use crate::{IdentityError, Record};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

// =============================================================================
// HELD ID VIEW
// =============================================================================

/// Read-only view of the ids held by a bank.
///
/// `held_ids` yields ids in ascending order.
pub trait IdSet<Id> {
    fn contains_id(&self, id: &Id) -> bool;

    fn held_ids(&self) -> Box<dyn Iterator<Item = &Id> + '_>;
}

impl<Id: Ord, V> IdSet<Id> for BTreeMap<Id, V> {
    fn contains_id(&self, id: &Id) -> bool {
        self.contains_key(id)
    }

    fn held_ids(&self) -> Box<dyn Iterator<Item = &Id> + '_> {
        Box::new(self.keys())
    }
}

impl<Id: Ord> IdSet<Id> for BTreeSet<Id> {
    fn contains_id(&self, id: &Id) -> bool {
        self.contains(id)
    }

    fn held_ids(&self) -> Box<dyn Iterator<Item = &Id> + '_> {
        Box::new(self.iter())
    }
}

// =============================================================================
// IDENTITYPOLICY TRAIT
// =============================================================================

/// Produces and validates ids for records of type `R`.
pub trait IdentityPolicy<R: Record>: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// The sentinel id carried by records that were never saved.
    fn default_id(&self) -> R::Id;

    fn is_default_id(&self, id: &R::Id) -> bool {
        *id == self.default_id()
    }

    /// Draw a fresh id that is not tied to any bank.
    fn generate_id(&self) -> Result<R::Id, IdentityError>;

    /// Resolve an id for `record` that collides with nothing in `held`.
    fn generate_id_for(
        &self,
        held: &dyn IdSet<R::Id>,
        record: &R,
    ) -> Result<R::Id, IdentityError>;
}

/// Draw candidates until one is free and not the sentinel.
///
/// Gives up after `attempts` draws.
fn first_unheld<Id: PartialEq>(
    held: &dyn IdSet<Id>,
    sentinel: &Id,
    attempts: usize,
    mut draw: impl FnMut() -> Id,
) -> Result<Id, IdentityError> {
    for _ in 0..attempts {
        let candidate = draw();
        if candidate != *sentinel && !held.contains_id(&candidate) {
            return Ok(candidate);
        }
    }
    Err(IdentityError::RetriesExhausted { attempts })
}

// =============================================================================
// UUID POLICY
// =============================================================================

/// Random 128-bit ids. The sentinel is the nil UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidPolicy;

impl UuidPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<R: Record<Id = Uuid>> IdentityPolicy<R> for UuidPolicy {
    fn name(&self) -> &'static str {
        "uuid"
    }

    fn default_id(&self) -> Uuid {
        Uuid::nil()
    }

    fn generate_id(&self) -> Result<Uuid, IdentityError> {
        Ok(Uuid::new_v4())
    }

    fn generate_id_for(&self, held: &dyn IdSet<Uuid>, _record: &R) -> Result<Uuid, IdentityError> {
        first_unheld(held, &Uuid::nil(), MAX_GENERATION_ATTEMPTS, Uuid::new_v4)
    }
}

// =============================================================================
// SMALLEST AVAILABLE INTEGER
// =============================================================================

/// Smallest free integer at or above `start`.
///
/// This is not a counter: ids freed by hard deletes are handed out again.
/// The search never goes past `upper`.
#[derive(Debug)]
pub struct SmallestAvailable {
    default_id: i64,
    start: i64,
    upper: i64,
    rng: Mutex<StdRng>,
}

impl SmallestAvailable {
    /// Sentinel `-1`, first id `1`, no upper bound.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(DEFAULT_START_ID)
    }

    #[must_use]
    pub fn starting_at(start: i64) -> Self {
        Self {
            default_id: DEFAULT_SENTINEL_ID,
            start,
            upper: i64::MAX,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    #[must_use]
    pub fn with_default_id(mut self, default_id: i64) -> Self {
        self.default_id = default_id;
        self
    }

    /// Inclusive upper bound of the id space.
    #[must_use]
    pub fn with_upper_bound(mut self, upper: i64) -> Self {
        self.upper = upper;
        self
    }

    /// Make `generate_id` reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    #[must_use]
    pub fn start(&self) -> i64 {
        self.start
    }

    #[must_use]
    pub fn upper(&self) -> i64 {
        self.upper
    }

    fn exhausted(&self) -> IdentityError {
        IdentityError::Exhausted {
            start: self.start.to_string(),
            upper: self.upper.to_string(),
        }
    }

    /// First gap at or above `start` among `held`, skipping the sentinel.
    fn first_gap(&self, held: &dyn IdSet<i64>) -> Result<i64, IdentityError> {
        let mut taken = held.held_ids().filter(|id| **id >= self.start).peekable();
        let mut candidate = self.start;

        loop {
            if candidate > self.upper {
                return Err(self.exhausted());
            }
            while taken.next_if(|id| **id < candidate).is_some() {}

            let occupied =
                candidate == self.default_id || taken.peek().is_some_and(|id| **id == candidate);
            if !occupied {
                return Ok(candidate);
            }
            candidate = candidate.checked_add(1).ok_or_else(|| self.exhausted())?;
        }
    }
}

impl Default for SmallestAvailable {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record<Id = i64>> IdentityPolicy<R> for SmallestAvailable {
    fn name(&self) -> &'static str {
        "smallest-available"
    }

    fn default_id(&self) -> i64 {
        self.default_id
    }

    fn generate_id(&self) -> Result<i64, IdentityError> {
        if self.start > self.upper {
            return Err(self.exhausted());
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let sentinel = self.default_id;
        let empty: BTreeSet<i64> = BTreeSet::new();
        first_unheld(&empty, &sentinel, MAX_GENERATION_ATTEMPTS, || {
            rng.gen_range(self.start..=self.upper)
        })
    }

    fn generate_id_for(&self, held: &dyn IdSet<i64>, _record: &R) -> Result<i64, IdentityError> {
        self.first_gap(held)
    }
}

// =============================================================================
// PROPERTY-DERIVED
// =============================================================================

/// Derives the id from a field of the record being saved.
///
/// There is nothing to draw from without a record, so `generate_id` is
/// unsupported.
pub struct PropertyDerived<R: Record, F> {
    default_id: R::Id,
    derive: F,
    _record: PhantomData<fn(&R)>,
}

impl<R, F> PropertyDerived<R, F>
where
    R: Record,
    F: Fn(&R) -> R::Id + Send + Sync,
{
    #[must_use]
    pub fn new(default_id: R::Id, derive: F) -> Self {
        Self {
            default_id,
            derive,
            _record: PhantomData,
        }
    }
}

impl<R, F> IdentityPolicy<R> for PropertyDerived<R, F>
where
    R: Record,
    F: Fn(&R) -> R::Id + Send + Sync,
{
    fn name(&self) -> &'static str {
        "property-derived"
    }

    fn default_id(&self) -> R::Id {
        self.default_id.clone()
    }

    fn generate_id(&self) -> Result<R::Id, IdentityError> {
        Err(IdentityError::Unsupported {
            policy: "property-derived",
        })
    }

    fn generate_id_for(
        &self,
        held: &dyn IdSet<R::Id>,
        record: &R,
    ) -> Result<R::Id, IdentityError> {
        let id = (self.derive)(record);
        if id == self.default_id {
            return Err(IdentityError::DerivedSentinel);
        }
        if held.contains_id(&id) {
            return Err(IdentityError::Collision(format!("{:?}", id)));
        }
        Ok(id)
    }
}

// =============================================================================
// TESTS
// =============================================================================
