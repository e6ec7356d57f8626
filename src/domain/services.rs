//! External services injected into the router.
//!
//! Services provide external dependencies (like time) without coupling the
//! routing logic to specific implementations.

use crate::domain::types::TimestampUtc;

/// Clock service for event timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    fixed: Option<TimestampUtc>,
}

impl Clock {
    /// A clock frozen at `instant`.
    pub fn fixed(instant: TimestampUtc) -> Self {
        Self {
            fixed: Some(instant),
        }
    }

    /// Returns the current UTC timestamp.
    pub fn now(&self) -> TimestampUtc {
        self.fixed.unwrap_or_else(TimestampUtc::now)
    }
}
