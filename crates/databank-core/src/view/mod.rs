//! # Explorable Views
//!
//! Derived, read-only views over a backing sequence.
//!
//! A view composes independent predicate filters with at most one active
//! ordering:
//!
//! - Enabled predicate filters run in registration order; their output is
//!   cached until any filter changes state or the source is refreshed.
//! - The active ordering, if any, always runs last, on every `explore`.
//! - Switching an ordering on silently switches every other ordering off.

mod filters;

pub use filters::{DataFilter, KeyOrdering, SelectingFilter, SwitchState};

use crate::bank::Bank;
use crate::{FilterError, Record};
use std::fmt;
use std::sync::Arc;

/// Notification sent to `on_filters_changed` listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChange {
    pub filter: String,
    pub state: u8,
    pub enabled: bool,
}

type Retriever<T> = Box<dyn Fn() -> Vec<T> + Send + Sync>;
type ChangeListener = Box<dyn Fn(&FilterChange) + Send + Sync>;

/// A filtered, optionally ordered view over a sequence of `T`.
pub struct Explorable<T> {
    values: Vec<T>,
    retriever: Option<Retriever<T>>,
    filters: Vec<Box<dyn DataFilter<T>>>,
    orderings: Vec<Box<dyn DataFilter<T>>>,
    filtered: Option<Vec<T>>,
    listeners: Vec<ChangeListener>,
}

impl<T> fmt::Debug for Explorable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Explorable")
            .field("values", &self.values.len())
            .field("filters", &self.filters.len())
            .field("orderings", &self.orderings.len())
            .field("cached", &self.filtered.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Clone> Explorable<T> {
    /// View over a fixed snapshot.
    #[must_use]
    pub fn from_values(values: Vec<T>) -> Self {
        Self {
            values,
            retriever: None,
            filters: Vec::new(),
            orderings: Vec::new(),
            filtered: None,
            listeners: Vec::new(),
        }
    }

    /// View over a retriever, invoked now and on every `source_obsolete`.
    pub fn from_retriever(retriever: impl Fn() -> Vec<T> + Send + Sync + 'static) -> Self {
        let mut view = Self::from_values(retriever());
        view.retriever = Some(Box::new(retriever));
        view
    }

    /// Reload the backing sequence from the retriever.
    pub fn source_obsolete(&mut self) -> Result<(), FilterError> {
        let retriever = self.retriever.as_ref().ok_or(FilterError::NoRetriever)?;
        self.values = retriever();
        self.filtered = None;
        Ok(())
    }

    /// Register a predicate filter.
    pub fn add_filter(&mut self, filter: impl DataFilter<T> + 'static) -> Result<(), FilterError> {
        self.ensure_unique(filter.id())?;
        self.filters.push(Box::new(filter));
        self.filtered = None;
        Ok(())
    }

    /// Register an ordering. Registering an already-enabled ordering
    /// switches the others off.
    pub fn add_ordering(&mut self, ordering: impl DataFilter<T> + 'static) -> Result<(), FilterError> {
        self.ensure_unique(ordering.id())?;
        let id = ordering.id().to_string();
        let enabled = ordering.is_enabled();
        self.orderings.push(Box::new(ordering));
        if enabled {
            self.disable_other_orderings(&id);
        }
        self.filtered = None;
        Ok(())
    }

    fn ensure_unique(&self, id: &str) -> Result<(), FilterError> {
        if self.filters.iter().chain(&self.orderings).any(|f| f.id() == id) {
            return Err(FilterError::DuplicateFilter(id.to_string()));
        }
        Ok(())
    }

    /// Switch a filter and notify listeners. Returns the new state.
    pub fn switch(&mut self, id: &str, value: Option<u8>) -> Result<u8, FilterError> {
        let change = self.apply_switch(id, value)?;
        let state = change.state;
        tracing::debug!(filter = %change.filter, state, "filter switched");
        for listener in &self.listeners {
            listener(&change);
        }
        Ok(state)
    }

    /// Switch a filter without notifying listeners. The cache is still
    /// invalidated.
    pub fn switch_silent(&mut self, id: &str, value: Option<u8>) -> Result<u8, FilterError> {
        self.apply_switch(id, value).map(|change| change.state)
    }

    fn apply_switch(&mut self, id: &str, value: Option<u8>) -> Result<FilterChange, FilterError> {
        let (is_ordering, filter) = match self.filters.iter_mut().find(|f| f.id() == id) {
            Some(filter) => (false, filter),
            None => match self.orderings.iter_mut().find(|f| f.id() == id) {
                Some(ordering) => (true, ordering),
                None => return Err(FilterError::UnknownFilter(id.to_string())),
            },
        };

        let state = filter.switch_state_mut().switch(value)?;
        let enabled = filter.is_enabled();
        if is_ordering && enabled {
            self.disable_other_orderings(id);
        }
        self.filtered = None;
        Ok(FilterChange {
            filter: id.to_string(),
            state,
            enabled,
        })
    }

    fn disable_other_orderings(&mut self, active: &str) {
        for other in self.orderings.iter_mut().filter(|o| o.id() != active) {
            other.switch_state_mut().reset();
        }
    }

    /// Listen for `switch` calls (not `switch_silent`).
    pub fn on_filters_changed(&mut self, listener: impl Fn(&FilterChange) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Current state of a filter or ordering.
    pub fn filter_state(&self, id: &str) -> Result<u8, FilterError> {
        self.filters
            .iter()
            .chain(&self.orderings)
            .find(|f| f.id() == id)
            .map(|f| f.switch_state().state())
            .ok_or_else(|| FilterError::UnknownFilter(id.to_string()))
    }

    /// Id of the active ordering, if any.
    #[must_use]
    pub fn current_ordering(&self) -> Option<&str> {
        self.orderings
            .iter()
            .find(|o| o.is_enabled())
            .map(|o| o.id())
    }

    /// The backing sequence, unfiltered.
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Filtered and ordered view. The backing sequence is left untouched.
    pub fn explore(&mut self) -> Vec<T> {
        let filters = &self.filters;
        let values = &self.values;
        let filtered = self.filtered.get_or_insert_with(|| {
            filters
                .iter()
                .filter(|f| f.is_enabled())
                .fold(values.clone(), |view, f| f.apply(view))
        });

        match self.orderings.iter().find(|o| o.is_enabled()) {
            Some(ordering) => ordering.apply(filtered.clone()),
            None => filtered.clone(),
        }
    }
}

impl<R: Record> Explorable<R> {
    /// View over the enabled records of a bank; `source_obsolete` re-reads
    /// the bank.
    pub fn from_bank(bank: Arc<Bank<R>>) -> Self {
        Self::from_retriever(move || bank.readonly_data())
    }
}
