//! Distinct / trailing-debounce / distinct filter
//!
//! Raw values are dropped while they equal the previous raw value. A new raw value
//! (re)starts the quiet-period timer. When the timer fires the pending value is
//! emitted, unless it equals the last emitted value.
//!
//! The second distinct check matters: a flip away and back inside the window leaves
//! the original value pending, and re-emitting it would cause a spurious switch.
//!
//! The filter owns no timer. The event loop sleeps until [`Debounced::deadline`] and
//! then calls [`Debounced::poll`].

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct Debounced<T> {
    window: Duration,
    last_raw: Option<T>,
    pending: Option<(T, Instant)>,
    last_emitted: Option<T>,
}

impl<T: Clone + PartialEq> Debounced<T> {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_raw: None,
            pending: None,
            last_emitted: None,
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Change the quiet period. An already pending value keeps its deadline.
    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    /// Feed a raw value observed at `now`
    ///
    /// Returns whether the value was accepted (differs from the previous raw value).
    pub fn push(&mut self, value: T, now: Instant) -> bool {
        if self.last_raw.as_ref() == Some(&value) {
            return false;
        }
        self.last_raw = Some(value.clone());
        self.pending = Some((value, now + self.window));
        true
    }

    /// When the pending value is due, if any
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    /// Emit the pending value if its deadline has passed and it differs from the last emission
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, at)) if *at <= now => {}
            _ => return None,
        }
        let (value, _) = self.pending.take()?;

        if self.last_emitted.as_ref() == Some(&value) {
            return None;
        }
        self.last_emitted = Some(value.clone());
        Some(value)
    }

    /// The last value emitted by [`Debounced::poll`]
    #[must_use]
    pub fn last_emitted(&self) -> Option<&T> {
        self.last_emitted.as_ref()
    }
}
