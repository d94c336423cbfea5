//! Presentation layer for arena-relay
//!
//! This crate contains the CLI definitions and the HTTP/WebSocket server:
//! the OpenAI-compatible endpoints, the browser peer socket, internal admin
//! endpoints and the job API.

pub mod cli;
pub mod server;

// Re-export commonly used types
pub use cli::commands::{Cli, Command, JobsCommand};
pub use server::{ApiError, AppState, ConfigSource, router};
