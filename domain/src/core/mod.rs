//! Core domain concepts shared across all subdomains.
//!
//! - [`error::DomainError`]: domain-level errors
//! - [`validation`]: configuration issue reporting

pub mod error;
pub mod validation;
