//! Runtime environment abstractions.
//!
//! Time is injected so token expiry and cache eviction can be tested
//! deterministically.

use chrono::{DateTime, Utc};

/// Clock abstraction.
///
/// # Example
///
/// ```
/// use identity_bridge::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// assert!(clock.now() <= chrono::Utc::now());
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
