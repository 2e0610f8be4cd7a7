//! Fixture builders shared by unit tests.

use std::collections::BTreeMap;

use crate::model::{Category, EdgeContent, EdgeType, Entity, GraphContent, Rank, SnapshotContent};
use crate::snapshot::IncidentSnapshot;

pub fn entity(id: &str, entity_type: &str, rank_name: &str) -> Entity {
    Entity {
        entity_id: id.to_string(),
        entity_name: id.to_string(),
        entity_type: entity_type.to_string(),
        is_anomaly: false,
        anomaly_score: 0.0,
        anomaly_type: String::new(),
        is_root: false,
        rank_name: rank_name.to_string(),
        aggregated_entities: vec![],
    }
}

pub fn edge(source: &str, target: &str) -> EdgeContent {
    EdgeContent {
        source_id: source.to_string(),
        target_id: target.to_string(),
        source_type: None,
        target_type: None,
        edge_type: EdgeType::Dependency,
        count: 1,
    }
}

/// Three ranks (host, pod, service) in two categories.
pub fn hierarchy() -> (BTreeMap<String, Category>, BTreeMap<String, Rank>) {
    let categories = BTreeMap::from([
        (
            "data_center".to_string(),
            Category {
                category_id: 2,
                category_name: "data_center".to_string(),
                category_alias: "Data center".to_string(),
            },
        ),
        (
            "service".to_string(),
            Category {
                category_id: 1,
                category_name: "service".to_string(),
                category_alias: "Service".to_string(),
            },
        ),
    ]);
    let rank = |id: i64, alias: &str, category: &str| Rank {
        rank_id: id,
        rank_name: format!("rank_{id}"),
        rank_alias: alias.to_string(),
        rank_category: category.to_string(),
    };
    let ranks = BTreeMap::from([
        ("rank_0".to_string(), rank(0, "Host", "data_center")),
        ("rank_1".to_string(), rank(1, "Pod", "data_center")),
        ("rank_2".to_string(), rank(2, "Service module", "service")),
    ]);
    (categories, ranks)
}

pub fn snapshot_with(entities: Vec<Entity>, edges: Vec<EdgeContent>) -> IncidentSnapshot {
    let (categories, ranks) = hierarchy();
    IncidentSnapshot::from_content(SnapshotContent {
        bk_biz_id: Some(2),
        product_hierarchy_category: categories,
        product_hierarchy_rank: ranks,
        incident_propagation_graph: GraphContent { entities, edges },
        incident_alerts: vec![],
    })
    .expect("fixture snapshot must build")
}

/// host -> pod -> svc, with the pod anomalous.
pub fn chain_snapshot() -> IncidentSnapshot {
    let mut pod = entity("pod", "BcsPod", "rank_1");
    pod.is_anomaly = true;
    snapshot_with(
        vec![
            entity("host", "BkNodeHost", "rank_0"),
            pod,
            entity("svc", "APMService", "rank_2"),
        ],
        vec![edge("host", "pod"), edge("pod", "svc")],
    )
}
