//! Progress value shared by every acquisition stream.

use serde::{Deserialize, Serialize};

/// A `{current, total}` progress snapshot, optionally carrying a payload.
///
/// Within one download attempt `current` never decreases and never exceeds
/// `total` once `total` is known. `diff` is the amount `current` moved on the
/// tick that produced this value, which lets aggregators sum deltas instead of
/// absolutes when several producers report concurrently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progression<T = ()> {
    /// Units completed so far (bytes, files, ...).
    pub current: u64,
    /// Units expected in total; `0` while still unknown.
    pub total: u64,
    /// Delta applied by the tick that produced this snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<u64>,
    /// Optional payload (e.g. the file this tick belongs to).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Progression<T> {
    /// Create a progression with no payload.
    pub const fn new(current: u64, total: u64) -> Self {
        Self {
            current,
            total,
            diff: None,
            data: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }

    /// Advance `current` by `diff`, saturating at `total` when `total` is known.
    ///
    /// Returns the amount actually applied, which is also stored in `self.diff`.
    pub fn advance(&mut self, diff: u64) -> u64 {
        let next = self.current.saturating_add(diff);
        let next = if self.total > 0 {
            next.min(self.total)
        } else {
            next
        };
        let applied = next - self.current;
        self.current = next;
        self.diff = Some(applied);
        applied
    }

    /// Completion percentage in `0.0..=100.0` (`0.0` while total is unknown).
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f64 / self.total as f64) * 100.0
    }

    /// Whether `current` has reached a known `total`.
    pub const fn is_complete(&self) -> bool {
        self.total > 0 && self.current >= self.total
    }

    /// Replace the payload type, keeping the counters.
    pub fn map_data<U>(self, f: impl FnOnce(Option<T>) -> Option<U>) -> Progression<U> {
        Progression {
            current: self.current,
            total: self.total,
            diff: self.diff,
            data: f(self.data),
        }
    }
}
