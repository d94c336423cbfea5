//! System clock adapter.

use chrono::{DateTime, Local, NaiveTime, Utc};
use relay_application::Clock;

/// Wall clock; quiet hours are evaluated in the host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_time(&self) -> NaiveTime {
        Local::now().time()
    }
}
