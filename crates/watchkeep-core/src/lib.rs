#![forbid(unsafe_code)]
//! watchkeep-core library.
//!
//! # Conventions
//!
//! - **Errors**: Domain crates define `thiserror` enums that map onto
//!   [`error::ErrorCode`]; plumbing uses `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod error;
