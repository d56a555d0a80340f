use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CategoryId, GroupId};
use crate::error::{TreeError, TreeResult};

/// Inclusive time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// Build a window, rejecting one whose end precedes its start.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidWindow`] when `end < start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> TreeResult<Self> {
        if end < start {
            return Err(TreeError::InvalidWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    pub(crate) fn start_us(&self) -> i64 {
        self.start.timestamp_micros()
    }

    pub(crate) fn end_us(&self) -> i64 {
        self.end.timestamp_micros()
    }

    pub(crate) fn from_us(start_us: i64, end_us: i64) -> Option<Self> {
        let start = DateTime::from_timestamp_micros(start_us)?;
        let end = DateTime::from_timestamp_micros(end_us)?;
        Some(Self { start, end })
    }
}

/// Milestone marker bound to one category of a group's tree.
///
/// `order_index` is dense and 1-based across the whole group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub category_id: CategoryId,
    pub group_id: GroupId,
    pub window: Window,
    pub order_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0)
            .single()
            .expect("valid date")
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let window = Window::new(at(1), at(10)).expect("window");
        assert!(window.contains(at(1)));
        assert!(window.contains(at(10)));
        assert!(!window.contains(at(11)));
    }

    #[test]
    fn reversed_window_is_rejected() {
        let err = Window::new(at(10), at(1)).expect_err("must fail");
        assert!(matches!(err, TreeError::InvalidWindow { .. }));
    }

    #[test]
    fn micros_round_trip_through_storage() {
        let window = Window::new(at(2), at(3)).expect("window");
        let back = Window::from_us(window.start_us(), window.end_us()).expect("decode");
        assert_eq!(back, window);
    }
}
