//! Stored shape of an incident snapshot.
//!
//! These types mirror the JSON document a root-cause analysis run
//! produces. Cross references are by key (`rank_category` names a category,
//! `rank_name` names a rank); [`crate::snapshot::IncidentSnapshot`] resolves
//! and validates them.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Top-level snapshot document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bk_biz_id: Option<i64>,
    /// Categories keyed by category name.
    #[serde(default)]
    pub product_hierarchy_category: BTreeMap<String, Category>,
    /// Ranks keyed by rank name.
    #[serde(default)]
    pub product_hierarchy_rank: BTreeMap<String, Rank>,
    #[serde(default)]
    pub incident_propagation_graph: GraphContent,
    #[serde(default)]
    pub incident_alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphContent {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub edges: Vec<EdgeContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: i64,
    pub category_name: String,
    #[serde(default)]
    pub category_alias: String,
}

/// A topology layer (host, pod, service module...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    pub rank_id: i64,
    pub rank_name: String,
    #[serde(default)]
    pub rank_alias: String,
    /// Name of the owning category.
    pub rank_category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    #[serde(default)]
    pub entity_name: String,
    pub entity_type: String,
    #[serde(default)]
    pub is_anomaly: bool,
    #[serde(default)]
    pub anomaly_score: f64,
    #[serde(default)]
    pub anomaly_type: String,
    #[serde(default)]
    pub is_root: bool,
    /// Name of the owning rank.
    pub rank_name: String,
    /// Entities collapsed into this one by aggregation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregated_entities: Vec<Entity>,
}

impl Entity {
    /// This entity plus everything aggregated into it.
    #[must_use]
    pub fn weight(&self) -> usize {
        1 + self.aggregated_entities.len()
    }

    /// Anomalous members among this entity and its aggregated entities.
    #[must_use]
    pub fn anomaly_weight(&self) -> usize {
        usize::from(self.is_anomaly)
            + self
                .aggregated_entities
                .iter()
                .filter(|entity| entity.is_anomaly)
                .count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    #[default]
    Dependency,
    Invoke,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeContent {
    pub source_id: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(default)]
    pub edge_type: EdgeType,
    #[serde(default = "default_edge_count")]
    pub count: u32,
}

const fn default_edge_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: u64,
    #[serde(default, deserialize_with = "id_from_string_or_number")]
    pub strategy_id: u64,
    /// Entity the alert fired on; empty strings read as none.
    #[serde(default, deserialize_with = "non_empty_string")]
    pub entity_id: Option<String>,
}

/// Producers emit numeric ids either as JSON numbers or as strings.
fn id_from_string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn non_empty_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|value| !value.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_ids_accept_strings_and_numbers() {
        let alerts: Vec<Alert> = serde_json::from_str(
            r#"[
                {"id": "170191709725733", "strategy_id": "25", "entity_id": "pod-1"},
                {"id": 7, "strategy_id": 3, "entity_id": ""},
                {"id": 8}
            ]"#,
        )
        .expect("valid alerts");
        assert_eq!(alerts[0].id, 170_191_709_725_733);
        assert_eq!(alerts[0].strategy_id, 25);
        assert_eq!(alerts[1].entity_id, None);
        assert_eq!(alerts[2].strategy_id, 0);
    }

    #[test]
    fn non_numeric_alert_id_is_rejected() {
        assert!(serde_json::from_str::<Alert>(r#"{"id": "abc"}"#).is_err());
    }

    #[test]
    fn edges_default_to_single_dependency() {
        let edge: EdgeContent =
            serde_json::from_str(r#"{"source_id": "a", "target_id": "b"}"#).expect("valid edge");
        assert_eq!(edge.edge_type, EdgeType::Dependency);
        assert_eq!(edge.count, 1);
    }

    #[test]
    fn weight_counts_aggregated_members() {
        let member = |id: &str, is_anomaly: bool| Entity {
            entity_id: id.to_string(),
            entity_name: id.to_string(),
            entity_type: "BcsPod".to_string(),
            is_anomaly,
            anomaly_score: 0.0,
            anomaly_type: String::new(),
            is_root: false,
            rank_name: "rank_0".to_string(),
            aggregated_entities: vec![],
        };
        let mut main = member("a", false);
        main.aggregated_entities = vec![member("b", true), member("c", false)];
        assert_eq!(main.weight(), 3);
        assert_eq!(main.anomaly_weight(), 1);
    }
}
