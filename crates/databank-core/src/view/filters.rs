//! Filter building blocks for `Explorable` views.

use crate::FilterError;
use crate::primitives::{
    ORDER_ASCENDING, ORDER_DESCENDING, ORDERING_STATES, SELECTING_STATES, STATE_DISABLED,
};
use std::cmp::Reverse;

// =============================================================================
// SWITCH STATE
// =============================================================================

/// Cyclic state of a filter. State `0` means off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchState {
    state: u8,
    valid_states: u8,
}

impl SwitchState {
    /// Switched off, with `valid_states` states (at least two).
    #[must_use]
    pub fn new(valid_states: u8) -> Self {
        Self {
            state: STATE_DISABLED,
            valid_states: valid_states.max(SELECTING_STATES),
        }
    }

    #[must_use]
    pub fn state(&self) -> u8 {
        self.state
    }

    #[must_use]
    pub fn valid_states(&self) -> u8 {
        self.valid_states
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state != STATE_DISABLED
    }

    /// Switch off. State `0` is always valid.
    pub fn reset(&mut self) {
        self.state = STATE_DISABLED;
    }

    /// Move to `value`, or to the next state (wrapping) when `None`.
    ///
    /// Returns the new state.
    pub fn switch(&mut self, value: Option<u8>) -> Result<u8, FilterError> {
        self.state = match value {
            Some(state) if state < self.valid_states => state,
            Some(state) => {
                return Err(FilterError::InvalidState {
                    state,
                    valid_states: self.valid_states,
                });
            }
            None => self.state.saturating_add(1) % self.valid_states,
        };
        Ok(self.state)
    }
}

// =============================================================================
// FILTER CONTRACT
// =============================================================================

/// A switchable pass over a sequence of `T`.
pub trait DataFilter<T>: Send + Sync {
    /// Unique id within one view.
    fn id(&self) -> &str;

    fn switch_state(&self) -> &SwitchState;

    fn switch_state_mut(&mut self) -> &mut SwitchState;

    /// Transform `items`. Only called while the filter is enabled.
    fn apply(&self, items: Vec<T>) -> Vec<T>;

    fn is_enabled(&self) -> bool {
        self.switch_state().is_enabled()
    }
}

// =============================================================================
// SELECTING FILTER
// =============================================================================

/// Keeps the items matching a predicate while switched on.
pub struct SelectingFilter<T> {
    id: String,
    state: SwitchState,
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> SelectingFilter<T> {
    /// A switched-off filter.
    pub fn new(id: impl Into<String>, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            id: id.into(),
            state: SwitchState::new(SELECTING_STATES),
            predicate: Box::new(predicate),
        }
    }

    /// Start switched on.
    #[must_use]
    pub fn enabled(mut self) -> Self {
        self.state.state = SELECTING_STATES - 1;
        self
    }
}

impl<T> DataFilter<T> for SelectingFilter<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn switch_state(&self) -> &SwitchState {
        &self.state
    }

    fn switch_state_mut(&mut self) -> &mut SwitchState {
        &mut self.state
    }

    fn apply(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().filter(|item| (self.predicate)(item)).collect()
    }
}

// =============================================================================
// KEY ORDERING
// =============================================================================

/// Sorts by an extracted key: unordered, ascending, then descending.
///
/// Sorting is stable, so items with equal keys keep their relative order.
pub struct KeyOrdering<T, K> {
    id: String,
    state: SwitchState,
    key: Box<dyn Fn(&T) -> K + Send + Sync>,
}

impl<T, K: Ord> KeyOrdering<T, K> {
    pub fn new(id: impl Into<String>, key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self {
            id: id.into(),
            state: SwitchState::new(ORDERING_STATES),
            key: Box::new(key),
        }
    }
}

impl<T, K: Ord> DataFilter<T> for KeyOrdering<T, K> {
    fn id(&self) -> &str {
        &self.id
    }

    fn switch_state(&self) -> &SwitchState {
        &self.state
    }

    fn switch_state_mut(&mut self) -> &mut SwitchState {
        &mut self.state
    }

    fn apply(&self, mut items: Vec<T>) -> Vec<T> {
        match self.state.state() {
            ORDER_ASCENDING => items.sort_by_key(|item| (self.key)(item)),
            ORDER_DESCENDING => items.sort_by_key(|item| Reverse((self.key)(item))),
            _ => {}
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_cycles_and_wraps() {
        let mut state = SwitchState::new(ORDERING_STATES);
        assert_eq!(state.switch(None), Ok(1));
        assert_eq!(state.switch(None), Ok(2));
        assert_eq!(state.switch(None), Ok(0));
        assert!(!state.is_enabled());
    }

    #[test]
    fn explicit_state_must_be_valid() {
        let mut state = SwitchState::new(SELECTING_STATES);
        assert_eq!(state.switch(Some(1)), Ok(1));
        assert_eq!(
            state.switch(Some(2)),
            Err(FilterError::InvalidState {
                state: 2,
                valid_states: 2
            })
        );
        assert_eq!(state.state(), 1);
    }

    #[test]
    fn reset_switches_off_from_any_state() {
        let mut state = SwitchState::new(ORDERING_STATES);
        state.switch(Some(ORDER_DESCENDING)).expect("desc");
        state.reset();
        assert_eq!(state.state(), STATE_DISABLED);
        assert!(!state.is_enabled());
    }

    #[test]
    fn selecting_filter_keeps_matches() {
        let filter = SelectingFilter::new("even", |n: &i32| n % 2 == 0).enabled();
        assert!(filter.is_enabled());
        assert_eq!(filter.apply(vec![1, 2, 3, 4]), vec![2, 4]);
    }

    #[test]
    fn key_ordering_is_stable_in_both_directions() {
        let mut ordering = KeyOrdering::new("len", |s: &&str| s.len());
        let words = vec!["bb", "a", "cc", "ddd"];

        assert_eq!(ordering.apply(words.clone()), words);

        ordering.switch_state_mut().switch(Some(ORDER_ASCENDING)).expect("asc");
        assert_eq!(ordering.apply(words.clone()), vec!["a", "bb", "cc", "ddd"]);

        ordering.switch_state_mut().switch(Some(ORDER_DESCENDING)).expect("desc");
        assert_eq!(ordering.apply(words), vec!["ddd", "bb", "cc", "a"]);
    }
}
