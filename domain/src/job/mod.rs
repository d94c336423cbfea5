//! Job domain: entities, state machine, events and admission policy.

pub mod entities;
pub mod event;
pub mod schedule;
pub mod spec;

pub use entities::{Job, JobState};
pub use event::{JobEvent, JobEventKind};
pub use schedule::{AdmissionDecision, ConcurrencyLimits, QuietHours, SchedulePolicy, parse_time_of_day};
pub use spec::{ContinuationOverrides, JobSpec, TRANSPLANT_SUMMARY_CHARS, build_transplant_summary};
