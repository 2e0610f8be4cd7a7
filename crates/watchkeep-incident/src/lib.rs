#![forbid(unsafe_code)]
//! watchkeep-incident: the incident propagation graph.
//!
//! # Overview
//!
//! - [`model`]: the stored snapshot document.
//! - [`snapshot`]: [`IncidentSnapshot`], built and validated in one step,
//!   with edge and adjacency maintenance.
//! - [`traversal`]: upstream/downstream closure, per-rank buckets,
//!   sub-graph extraction and cycle diagnostics.
//! - [`layering`]: type depths and `(rank, depth)` display rows.
//! - [`aggregate`]: collapsing structurally equivalent entities.
//! - [`handlers`]: assignee summary over the incident's alerts.
//!
//! A built snapshot is `Send + Sync` and safe to query concurrently;
//! aggregation takes `&mut self`.

pub mod aggregate;
pub mod error;
pub mod handlers;
pub mod layering;
pub mod model;
pub mod snapshot;
pub mod traversal;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::{AggregateConfig, AggregateSummary, TopologyMenuEntry};
pub use error::IncidentError;
pub use handlers::{AlertLookup, AlertRecord, HandlerSummary, incident_handlers};
pub use layering::RankGroup;
pub use snapshot::IncidentSnapshot;
pub use traversal::{Direction, RankBucket};
