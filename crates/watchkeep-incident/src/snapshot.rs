//! The in-memory incident graph.
//!
//! # Overview
//!
//! [`IncidentSnapshot`] is built in one step from a [`SnapshotContent`]
//! document. Building validates every cross reference and derives two
//! adjacency indexes from the edge map:
//!
//! - `entity_sources[v]`: every `u` with an edge `u -> v`
//! - `entity_targets[u]`: every `v` with an edge `u -> v`
//!
//! Edges only change through [`IncidentSnapshot::insert_edge`] and
//! [`IncidentSnapshot::remove_edge`], which update the edge map and both
//! indexes together. Aggregation (see [`crate::aggregate`]) is the only
//! operation that changes topology after construction.

#![allow(clippy::module_name_repetitions)]

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::IncidentError;
use crate::model::{
    Alert, Category, EdgeContent, EdgeType, Entity, GraphContent, Rank, SnapshotContent,
};

/// Edges are keyed by `(source_id, target_id)`.
pub type EdgeKey = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub edge_type: EdgeType,
    /// How many original edges this one stands for.
    pub count: u32,
}

static EMPTY: BTreeSet<String> = BTreeSet::new();

#[derive(Debug, Clone)]
pub struct IncidentSnapshot {
    bk_biz_id: Option<i64>,
    pub(crate) categories: BTreeMap<String, Category>,
    pub(crate) ranks: BTreeMap<String, Rank>,
    pub(crate) entities: BTreeMap<String, Entity>,
    /// Entity ids in document order; drives deterministic output.
    pub(crate) entity_order: Vec<String>,
    pub(crate) edges: BTreeMap<EdgeKey, Edge>,
    pub(crate) entity_sources: BTreeMap<String, BTreeSet<String>>,
    pub(crate) entity_targets: BTreeMap<String, BTreeSet<String>>,
    pub(crate) alerts: Vec<Alert>,
    /// Aggregated entity id -> id of the entity it was merged into.
    pub(crate) aggregated_into: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl IncidentSnapshot {
    /// Parse and build a snapshot from its JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentError::Parse`] for malformed JSON and any error of
    /// [`IncidentSnapshot::from_content`].
    pub fn from_json(raw: &str) -> Result<Self, IncidentError> {
        let content: SnapshotContent = serde_json::from_str(raw)?;
        Self::from_content(content)
    }

    /// Build a snapshot, validating every reference.
    ///
    /// Duplicate edges are folded into one edge whose count is the sum.
    /// Alerts naming an unknown entity keep no entity.
    ///
    /// # Errors
    ///
    /// Returns an error if a rank names an unknown category, an entity an
    /// unknown rank, an edge an unknown entity, or an entity id repeats.
    pub fn from_content(content: SnapshotContent) -> Result<Self, IncidentError> {
        let SnapshotContent {
            bk_biz_id,
            product_hierarchy_category: categories,
            product_hierarchy_rank: ranks,
            incident_propagation_graph: GraphContent { entities, edges },
            incident_alerts,
        } = content;

        for (rank_name, rank) in &ranks {
            if !categories.contains_key(&rank.rank_category) {
                return Err(IncidentError::UnknownCategory {
                    rank_name: rank_name.clone(),
                    category: rank.rank_category.clone(),
                });
            }
        }

        let mut snapshot = Self {
            bk_biz_id,
            categories,
            ranks,
            entities: BTreeMap::new(),
            entity_order: Vec::with_capacity(entities.len()),
            edges: BTreeMap::new(),
            entity_sources: BTreeMap::new(),
            entity_targets: BTreeMap::new(),
            alerts: Vec::new(),
            aggregated_into: BTreeMap::new(),
        };

        for entity in entities {
            snapshot.add_entity(entity)?;
        }

        for edge in edges {
            for endpoint in [&edge.source_id, &edge.target_id] {
                if !snapshot.entities.contains_key(endpoint) {
                    return Err(IncidentError::UnknownEdgeEndpoint {
                        source_id: edge.source_id.clone(),
                        target_id: edge.target_id.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
            snapshot.insert_edge(edge.source_id, edge.target_id, edge.edge_type, edge.count);
        }

        snapshot.alerts = incident_alerts
            .into_iter()
            .map(|mut alert| {
                let known = alert
                    .entity_id
                    .as_deref()
                    .is_none_or(|entity_id| snapshot.resolve_entity_id(entity_id).is_some());
                if !known {
                    debug!(
                        alert_id = alert.id,
                        entity_id = ?alert.entity_id,
                        "alert references unknown entity"
                    );
                    alert.entity_id = None;
                }
                alert
            })
            .collect();

        debug!(
            entities = snapshot.entities.len(),
            edges = snapshot.edges.len(),
            alerts = snapshot.alerts.len(),
            "built incident snapshot"
        );
        Ok(snapshot)
    }

    fn add_entity(&mut self, entity: Entity) -> Result<(), IncidentError> {
        if !self.ranks.contains_key(&entity.rank_name) {
            return Err(IncidentError::UnknownRank {
                entity_id: entity.entity_id,
                rank_name: entity.rank_name,
            });
        }

        let ids = std::iter::once(&entity.entity_id)
            .chain(entity.aggregated_entities.iter().map(|member| &member.entity_id));
        for id in ids {
            if self.entities.contains_key(id) || self.aggregated_into.contains_key(id) {
                return Err(IncidentError::DuplicateEntity {
                    entity_id: id.clone(),
                });
            }
        }
        for member in &entity.aggregated_entities {
            self.aggregated_into
                .insert(member.entity_id.clone(), entity.entity_id.clone());
        }

        let id = entity.entity_id.clone();
        self.entity_sources.entry(id.clone()).or_default();
        self.entity_targets.entry(id.clone()).or_default();
        self.entity_order.push(id.clone());
        self.entities.insert(id, entity);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Edge maintenance
// ---------------------------------------------------------------------------

impl IncidentSnapshot {
    /// Add `count` to the edge `source -> target`, creating it if needed.
    /// An existing edge keeps its type.
    pub(crate) fn insert_edge(
        &mut self,
        source: String,
        target: String,
        edge_type: EdgeType,
        count: u32,
    ) {
        self.entity_targets
            .entry(source.clone())
            .or_default()
            .insert(target.clone());
        self.entity_sources
            .entry(target.clone())
            .or_default()
            .insert(source.clone());
        self.edges
            .entry((source, target))
            .and_modify(|edge| edge.count += count)
            .or_insert(Edge { edge_type, count });
    }

    /// Remove the edge `source -> target` from the edge map and both indexes.
    pub(crate) fn remove_edge(&mut self, source: &str, target: &str) -> Option<Edge> {
        let edge = self.edges.remove(&(source.to_string(), target.to_string()))?;
        if let Some(targets) = self.entity_targets.get_mut(source) {
            targets.remove(target);
        }
        if let Some(sources) = self.entity_sources.get_mut(target) {
            sources.remove(source);
        }
        Some(edge)
    }

    /// Panic if the adjacency indexes and the edge map disagree.
    ///
    /// Divergence means a bug in graph maintenance, never bad input.
    pub fn assert_adjacency_consistent(&self) {
        for (source, target) in self.edges.keys() {
            assert!(
                self.targets(source).contains(target),
                "edge {source} -> {target} missing from entity_targets"
            );
            assert!(
                self.sources(target).contains(source),
                "edge {source} -> {target} missing from entity_sources"
            );
        }
        let indexed: usize = self.entity_targets.values().map(BTreeSet::len).sum();
        let reverse: usize = self.entity_sources.values().map(BTreeSet::len).sum();
        assert_eq!(indexed, self.edges.len(), "entity_targets holds stale edges");
        assert_eq!(reverse, self.edges.len(), "entity_sources holds stale edges");
        for id in self.entity_targets.keys().chain(self.entity_sources.keys()) {
            assert!(self.entities.contains_key(id), "adjacency entry for removed entity {id}");
        }
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl IncidentSnapshot {
    #[must_use]
    pub const fn bk_biz_id(&self) -> Option<i64> {
        self.bk_biz_id
    }

    #[must_use]
    pub fn entity(&self, entity_id: &str) -> Option<&Entity> {
        self.entities.get(entity_id)
    }

    /// Entities in document order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entity_order.iter().filter_map(|id| self.entities.get(id))
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn edge(&self, source: &str, target: &str) -> Option<&Edge> {
        self.edges.get(&(source.to_string(), target.to_string()))
    }

    pub fn edges(&self) -> impl Iterator<Item = (&EdgeKey, &Edge)> + '_ {
        self.edges.iter()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Ids with an edge into `entity_id`.
    #[must_use]
    pub fn sources(&self, entity_id: &str) -> &BTreeSet<String> {
        self.entity_sources.get(entity_id).unwrap_or(&EMPTY)
    }

    /// Ids `entity_id` has an edge to.
    #[must_use]
    pub fn targets(&self, entity_id: &str) -> &BTreeSet<String> {
        self.entity_targets.get(entity_id).unwrap_or(&EMPTY)
    }

    #[must_use]
    pub fn rank(&self, rank_name: &str) -> Option<&Rank> {
        self.ranks.get(rank_name)
    }

    #[must_use]
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// Raw ids of every alert attached to the incident.
    #[must_use]
    pub fn get_related_alert_ids(&self) -> Vec<u64> {
        self.alerts.iter().map(|alert| alert.id).collect()
    }

    /// The live entity standing for `entity_id`: itself, or the entity it
    /// was aggregated into.
    #[must_use]
    pub fn resolve_entity_id<'a>(&'a self, entity_id: &'a str) -> Option<&'a str> {
        if self.entities.contains_key(entity_id) {
            return Some(entity_id);
        }
        self.aggregated_into.get(entity_id).map(String::as_str)
    }

    /// Alert id -> live entity id, for alerts whose entity is known.
    #[must_use]
    pub fn alert_entity_mapping(&self) -> BTreeMap<u64, &str> {
        self.alerts
            .iter()
            .filter_map(|alert| {
                let entity_id = alert.entity_id.as_deref()?;
                Some((alert.id, self.resolve_entity_id(entity_id)?))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

impl IncidentSnapshot {
    /// Serialize back into the stored document shape.
    #[must_use]
    pub fn to_content(&self) -> SnapshotContent {
        let edges = self
            .edges
            .iter()
            .map(|((source, target), edge)| EdgeContent {
                source_id: source.clone(),
                target_id: target.clone(),
                source_type: self.entities.get(source).map(|e| e.entity_type.clone()),
                target_type: self.entities.get(target).map(|e| e.entity_type.clone()),
                edge_type: edge.edge_type,
                count: edge.count,
            })
            .collect();

        SnapshotContent {
            bk_biz_id: self.bk_biz_id,
            product_hierarchy_category: self.categories.clone(),
            product_hierarchy_rank: self.ranks.clone(),
            incident_propagation_graph: GraphContent {
                entities: self.entities().cloned().collect(),
                edges,
            },
            incident_alerts: self.alerts.clone(),
        }
    }
}
