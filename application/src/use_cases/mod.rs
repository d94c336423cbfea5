//! Use cases
//!
//! Application-level operations that orchestrate domain logic.
//!
//! - [`run_continuation`]: drive one authoring session turn by turn
//! - [`schedule_jobs`]: admission gate for job starts
//! - [`supervise_jobs`]: durable job lifecycle, retries and operator controls

pub mod run_continuation;
pub mod schedule_jobs;
pub mod supervise_jobs;
