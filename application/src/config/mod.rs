//! Application-level configuration.
//!
//! - [`SupervisorParams`]: job run loop control (watchdog, retries, backoff)
//!
//! Continuation tunables live in the domain as
//! [`ContinuationPolicy`](relay_domain::ContinuationPolicy).

pub mod supervisor_params;

pub use supervisor_params::SupervisorParams;
