//! Clock port

use chrono::{DateTime, NaiveTime, Utc};

/// Source of wall-clock time for timestamps and quiet hours.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Local time of day, used for quiet-hours checks.
    fn local_time(&self) -> NaiveTime;
}
