#![forbid(unsafe_code)]
//! watchkeep-duty: on-call rotation planning.
//!
//! # Overview
//!
//! - [`calendar`]: handover arithmetic in a configured UTC offset.
//! - [`model`]: stored rule shape and its validated, typed form.
//! - [`dates`] / [`worktime`] / [`groups`]: the building blocks of plan
//!   generation (valid days and periods, on-duty windows, who is up next).
//! - [`manager`]: [`manager::DutyRuleManager`] generates shifts for one rule.
//! - [`store`] / [`reconcile`]: snapshot bookkeeping and rolling plan
//!   materialization through the [`store::DutyStore`] seam.
//! - [`coverage`]: gaps and overlaps in a set of shifts.
//!
//! All computation is synchronous and free of I/O; independent groups can
//! be reconciled in parallel by the caller.

pub mod calendar;
pub mod coverage;
pub mod dates;
pub mod error;
pub mod groups;
pub mod hash;
pub mod manager;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod worktime;

pub use error::DutyError;
pub use manager::{DutyRuleManager, DutyShift, ManagerOptions, PlanOutcome};
pub use model::{DutyRule, DutyRuleConfig};
pub use reconcile::{GroupDutyRuleManager, ReconcileReport};
pub use store::{DutyPlan, DutyRuleSnapshot, DutyStore, InMemoryDutyStore};
