//! Calcgate server - HTTP front door for calculation clusters.

pub mod config;
pub mod server;

pub use config::{BlobSource, RuntimeConfig, Settings};
pub use server::{ApiError, ServerState, router, run_server};
