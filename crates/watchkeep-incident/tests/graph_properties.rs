//! Construction round-trip, merge bookkeeping and traversal properties.

use std::collections::BTreeSet;

use proptest::prelude::*;
use watchkeep_incident::model::{
    Category, EdgeContent, EdgeType, Entity, GraphContent, Rank, SnapshotContent,
};
use watchkeep_incident::{AggregateConfig, IncidentSnapshot};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const INCIDENT: &str = r#"{
    "bk_biz_id": 2,
    "product_hierarchy_category": {
        "data_center": {"category_id": 2, "category_name": "data_center", "category_alias": "Data center"},
        "service": {"category_id": 1, "category_name": "service", "category_alias": "Service"}
    },
    "product_hierarchy_rank": {
        "rank_0": {"rank_id": 0, "rank_name": "rank_0", "rank_alias": "Host", "rank_category": "data_center"},
        "rank_1": {"rank_id": 1, "rank_name": "rank_1", "rank_alias": "Pod", "rank_category": "data_center"},
        "rank_2": {"rank_id": 2, "rank_name": "rank_2", "rank_alias": "Service module", "rank_category": "service"}
    },
    "incident_propagation_graph": {
        "entities": [
            {"entity_id": "0#10.0.0.1", "entity_name": "10.0.0.1", "entity_type": "BkNodeHost", "is_anomaly": true,
             "anomaly_score": 0.9, "anomaly_type": "disk full", "is_root": true, "rank_name": "rank_0"},
            {"entity_id": "k8s#pod-0", "entity_name": "pod-0", "entity_type": "BcsPod", "anomaly_score": 0.1, "rank_name": "rank_1"},
            {"entity_id": "k8s#pod-1", "entity_name": "pod-1", "entity_type": "BcsPod", "anomaly_score": 0.1, "rank_name": "rank_1"},
            {"entity_id": "k8s#pod-2", "entity_name": "pod-2", "entity_type": "BcsPod", "anomaly_score": 0.1, "rank_name": "rank_1"},
            {"entity_id": "svc#checkout", "entity_name": "checkout", "entity_type": "APMService", "is_anomaly": true,
             "anomaly_score": 0.7, "anomaly_type": "error rate", "rank_name": "rank_2"},
            {"entity_id": "svc#audit", "entity_name": "audit", "entity_type": "APMService", "rank_name": "rank_2"}
        ],
        "edges": [
            {"source_id": "0#10.0.0.1", "target_id": "k8s#pod-0", "source_type": "BkNodeHost", "target_type": "BcsPod"},
            {"source_id": "0#10.0.0.1", "target_id": "k8s#pod-1", "source_type": "BkNodeHost", "target_type": "BcsPod"},
            {"source_id": "0#10.0.0.1", "target_id": "k8s#pod-2", "source_type": "BkNodeHost", "target_type": "BcsPod", "count": 2},
            {"source_id": "k8s#pod-0", "target_id": "svc#checkout", "edge_type": "invoke"},
            {"source_id": "k8s#pod-1", "target_id": "svc#checkout", "edge_type": "invoke"},
            {"source_id": "k8s#pod-2", "target_id": "svc#checkout", "edge_type": "invoke"}
        ]
    },
    "incident_alerts": [
        {"id": "170191709725733", "strategy_id": "25", "entity_id": "0#10.0.0.1"},
        {"id": "170191709725734", "strategy_id": "25", "entity_id": "k8s#pod-2"},
        {"id": "170191709725735", "strategy_id": "31", "entity_id": ""}
    ]
}"#;

fn incident() -> IncidentSnapshot {
    IncidentSnapshot::from_json(INCIDENT).expect("fixture builds")
}

fn topology(snapshot: &IncidentSnapshot) -> (Vec<String>, Vec<(String, String, EdgeType, u32)>) {
    let ids = snapshot.entities().map(|e| e.entity_id.clone()).collect();
    let edges = snapshot
        .edges()
        .map(|((s, t), edge)| (s.clone(), t.clone(), edge.edge_type, edge.count))
        .collect();
    (ids, edges)
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn rebuilding_from_content_is_isomorphic() {
    let original = incident();
    let json = serde_json::to_string(&original.to_content()).expect("serialize");
    let rebuilt = IncidentSnapshot::from_json(&json).expect("rebuild");

    assert_eq!(topology(&original), topology(&rebuilt));
    assert_eq!(original.get_related_alert_ids(), rebuilt.get_related_alert_ids());
    assert_eq!(original.bk_biz_id(), rebuilt.bk_biz_id());
}

#[test]
fn aggregated_snapshot_round_trips_too() {
    let mut original = incident();
    original.aggregate_graph(&AggregateConfig::default());
    let rebuilt = IncidentSnapshot::from_content(original.to_content()).expect("rebuild");

    assert_eq!(topology(&original), topology(&rebuilt));
    assert_eq!(
        rebuilt.alert_entity_mapping().get(&170_191_709_725_734),
        Some(&"k8s#pod-0")
    );
}

// ---------------------------------------------------------------------------
// Aggregation on a realistic incident
// ---------------------------------------------------------------------------

#[test]
fn equivalent_pods_collapse_and_keep_multiplicity() {
    let mut snapshot = incident();
    let summary = snapshot.aggregate_graph(&AggregateConfig::default());

    assert_eq!(summary.groups.len(), 1);
    assert_eq!(summary.entities_after, 4);
    let host_to_pods = snapshot.edge("0#10.0.0.1", "k8s#pod-0").expect("rewired edge");
    assert_eq!(host_to_pods.count, 4);
    let pods_to_svc = snapshot.edge("k8s#pod-0", "svc#checkout").expect("rewired edge");
    assert_eq!((pods_to_svc.count, pods_to_svc.edge_type), (3, EdgeType::Invoke));

    let rows = snapshot.group_by_rank();
    let pod_row = rows.iter().find(|row| row.rank_id == 1).expect("pod row");
    assert_eq!(pod_row.entities.len(), 1);
    assert_eq!(pod_row.total, 3);
}

#[test]
fn sub_graph_of_the_root_keeps_its_alerts() {
    let snapshot = incident();
    let sub = snapshot
        .generate_entity_sub_graph("k8s#pod-1")
        .expect("known entity");
    let ids: BTreeSet<&str> = sub.entities().map(|e| e.entity_id.as_str()).collect();
    assert_eq!(
        ids,
        BTreeSet::from(["0#10.0.0.1", "k8s#pod-1", "svc#checkout"])
    );
    assert_eq!(sub.get_related_alert_ids(), vec![170_191_709_725_733]);
    assert!(sub.rank("rank_2").is_some());
}

#[test]
fn isolated_audit_service_is_alone_in_its_buckets() {
    let snapshot = incident();
    let buckets = snapshot
        .upstreams_group_by_rank("svc#audit")
        .expect("known entity");
    let members: Vec<&str> = buckets
        .iter()
        .flat_map(|bucket| bucket.entities.iter().map(|e| e.entity_id.as_str()))
        .collect();
    assert_eq!(members, ["svc#audit"]);
}

// ---------------------------------------------------------------------------
// Merge invariant over random graphs
// ---------------------------------------------------------------------------

fn random_content(n: usize, edges: &[(usize, usize, u32)]) -> SnapshotContent {
    let category = Category {
        category_id: 1,
        category_name: "service".to_string(),
        category_alias: String::new(),
    };
    let rank = Rank {
        rank_id: 0,
        rank_name: "rank_0".to_string(),
        rank_alias: String::new(),
        rank_category: "service".to_string(),
    };
    let entities = (0..n)
        .map(|i| Entity {
            entity_id: format!("e{i}"),
            entity_name: format!("e{i}"),
            entity_type: "Node".to_string(),
            is_anomaly: false,
            anomaly_score: 0.0,
            anomaly_type: String::new(),
            is_root: false,
            rank_name: "rank_0".to_string(),
            aggregated_entities: vec![],
        })
        .collect();
    let edges = edges
        .iter()
        .map(|(s, t, count)| EdgeContent {
            source_id: format!("e{}", s % n),
            target_id: format!("e{}", t % n),
            source_type: None,
            target_type: None,
            edge_type: EdgeType::Dependency,
            count: *count,
        })
        .collect();
    SnapshotContent {
        bk_biz_id: None,
        product_hierarchy_category: [("service".to_string(), category)].into(),
        product_hierarchy_rank: [("rank_0".to_string(), rank)].into(),
        incident_propagation_graph: GraphContent { entities, edges },
        incident_alerts: vec![],
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn merging_preserves_adjacency_and_outside_multiplicity(
        n in 3_usize..12,
        edges in proptest::collection::vec((0_usize..12, 0_usize..12, 1_u32..4), 0..40),
        group_size in 2_usize..4,
    ) {
        let mut snapshot = IncidentSnapshot::from_content(random_content(n, &edges))
            .expect("random graph builds");
        let group: Vec<String> = (0..group_size.min(n)).map(|i| format!("e{i}")).collect();
        let members: BTreeSet<&str> = group.iter().map(String::as_str).collect();

        // Multiplicity between the group and each outside neighbour.
        let mut before_out = std::collections::BTreeMap::<String, u32>::new();
        let mut before_in = std::collections::BTreeMap::<String, u32>::new();
        for ((s, t), edge) in snapshot.edges() {
            match (members.contains(s.as_str()), members.contains(t.as_str())) {
                (true, false) => *before_out.entry(t.clone()).or_default() += edge.count,
                (false, true) => *before_in.entry(s.clone()).or_default() += edge.count,
                _ => {}
            }
        }

        snapshot.merge_entities(&group).expect("members exist");
        snapshot.assert_adjacency_consistent();

        for ((s, t), _) in snapshot.edges() {
            prop_assert!(snapshot.targets(s).contains(t));
            prop_assert!(snapshot.sources(t).contains(s));
        }
        for (target, count) in &before_out {
            prop_assert_eq!(snapshot.edge("e0", target).map(|e| e.count), Some(*count));
        }
        for (source, count) in &before_in {
            prop_assert_eq!(snapshot.edge(source, "e0").map(|e| e.count), Some(*count));
        }
        prop_assert_eq!(snapshot.entity_count(), n - group.len() + 1);
    }
}
