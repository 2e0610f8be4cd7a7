//! Who is handling an incident's alerts.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::snapshot::IncidentSnapshot;

/// The slice of an alert record the handler summary needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: u64,
    #[serde(default)]
    pub assignee: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: String,
}

/// Resolves alert ids to full records, typically from an alert index.
pub trait AlertLookup {
    /// Records for `ids`. Unknown ids are omitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing index cannot be queried.
    fn alerts(&self, ids: &[u64]) -> Result<Vec<AlertRecord>>;
}

impl AlertLookup for [AlertRecord] {
    fn alerts(&self, ids: &[u64]) -> Result<Vec<AlertRecord>> {
        Ok(self
            .iter()
            .filter(|record| ids.contains(&record.id))
            .cloned()
            .collect())
    }
}

impl AlertLookup for Vec<AlertRecord> {
    fn alerts(&self, ids: &[u64]) -> Result<Vec<AlertRecord>> {
        self.as_slice().alerts(ids)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerCount {
    pub id: String,
    pub name: String,
    pub alert_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerSummary {
    pub all: HandlerCount,
    pub not_dispatch: HandlerCount,
    pub mine: HandlerCount,
    /// Every other assignee, busiest first.
    pub other: Vec<HandlerCount>,
}

fn count(id: &str, name: &str, alert_count: usize) -> HandlerCount {
    HandlerCount {
        id: id.to_string(),
        name: name.to_string(),
        alert_count,
    }
}

/// Summarize alert assignees for the incident.
///
/// An alert with several assignees counts once for each of them.
///
/// # Errors
///
/// Returns an error if the lookup fails.
pub fn incident_handlers<L: AlertLookup + ?Sized>(
    snapshot: &IncidentSnapshot,
    lookup: &L,
    current_user: &str,
) -> Result<HandlerSummary> {
    let ids = snapshot.get_related_alert_ids();
    let alerts = lookup
        .alerts(&ids)
        .with_context(|| format!("looking up {} incident alerts", ids.len()))?;

    let mut per_user: BTreeMap<&str, usize> = BTreeMap::new();
    let mut not_dispatched = 0;
    for alert in &alerts {
        if alert.assignee.is_empty() {
            not_dispatched += 1;
        }
        for user in &alert.assignee {
            *per_user.entry(user.as_str()).or_default() += 1;
        }
    }

    let mine = per_user.get(current_user).copied().unwrap_or_default();
    let mut other: Vec<HandlerCount> = per_user
        .iter()
        .filter(|(user, _)| **user != current_user)
        .map(|(user, alerts)| count(user, user, *alerts))
        .collect();
    other.sort_by(|a, b| b.alert_count.cmp(&a.alert_count).then_with(|| a.id.cmp(&b.id)));

    Ok(HandlerSummary {
        all: count("all", "All", alerts.len()),
        not_dispatch: count("not_dispatch", "Not dispatched", not_dispatched),
        mine: count(current_user, "Mine", mine),
        other,
    })
}
