//! Lossy aggregation of structurally equivalent entities.
//!
//! # Overview
//!
//! Entities with identical source sets, identical target sets and the same
//! discriminator are interchangeable in a topology view. Groups of at least
//! [`AggregateConfig::min_group_size`] such entities collapse into their
//! first member (in document order); the rest become its
//! `aggregated_entities` and disappear from the graph.
//!
//! The discriminator keeps root causes and anomalies visible: a root entity
//! never merges, and an anomalous one only merges with anomalous peers of
//! its type when that type opts in with `aggregate_anomaly`.
//!
//! Merging is irreversible. Every edge touching a merged entity is moved
//! onto the survivor and its `count` is added to the survivor's edge, so
//! the total multiplicity between the group and each neighbour is kept.

#![allow(clippy::module_name_repetitions)]

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};
use watchkeep_core::config::{EntityTypeAggregation, IncidentConfig};

use crate::error::IncidentError;
use crate::model::Entity;
use crate::snapshot::IncidentSnapshot;

pub const DEFAULT_MIN_GROUP_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateConfig {
    /// Smallest group that is collapsed.
    pub min_group_size: usize,
    /// Entity types that may aggregate. Empty means every type.
    pub entity_types: BTreeMap<String, EntityTypeAggregation>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            min_group_size: DEFAULT_MIN_GROUP_SIZE,
            entity_types: BTreeMap::new(),
        }
    }
}

impl From<&IncidentConfig> for AggregateConfig {
    fn from(config: &IncidentConfig) -> Self {
        Self {
            min_group_size: config.aggregate_min_group,
            entity_types: config.entity_types.clone(),
        }
    }
}

impl AggregateConfig {
    fn setting(&self, entity_type: &str) -> Option<EntityTypeAggregation> {
        if self.entity_types.is_empty() {
            return Some(EntityTypeAggregation::default());
        }
        self.entity_types.get(entity_type).copied()
    }

    fn discriminator(&self, entity: &Entity) -> Discriminator {
        let Some(setting) = self.setting(&entity.entity_type) else {
            return Discriminator::Unique(entity.entity_id.clone());
        };
        match (entity.is_root, entity.is_anomaly) {
            (true, _) => Discriminator::Unique(entity.entity_id.clone()),
            (false, true) if setting.aggregate_anomaly => {
                Discriminator::Anomaly(entity.entity_type.clone())
            }
            (false, true) => Discriminator::Unique(entity.entity_id.clone()),
            (false, false) => Discriminator::Normal,
        }
    }
}

/// Third component of the grouping key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Discriminator {
    Normal,
    Anomaly(String),
    Unique(String),
}

type GroupKey = (BTreeSet<String>, BTreeSet<String>, Discriminator);

/// What one aggregation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateSummary {
    /// Survivor id -> ids merged into it.
    pub groups: BTreeMap<String, Vec<String>>,
    pub entities_before: usize,
    pub entities_after: usize,
    pub edges_before: usize,
    pub edges_after: usize,
}

/// Aggregation candidates for one entity type, as offered in a menu.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopologyMenuEntry {
    pub entity_type: String,
    pub total: usize,
    pub anomaly_count: usize,
    /// Groups of normal entities large enough to collapse.
    pub aggregate_groups: usize,
    pub aggregate_entities: usize,
    /// Groups of anomalous, non-root entities large enough to collapse.
    pub anomaly_groups: usize,
    pub anomaly_entities: usize,
}

impl IncidentSnapshot {
    /// Candidate groups in document order of their first member.
    fn equivalence_groups(&self, config: &AggregateConfig) -> Vec<Vec<String>> {
        let mut groups: BTreeMap<GroupKey, Vec<String>> = BTreeMap::new();
        let mut first_seen: Vec<GroupKey> = Vec::new();

        for entity in self.entities() {
            let key = (
                self.sources(&entity.entity_id).clone(),
                self.targets(&entity.entity_id).clone(),
                config.discriminator(entity),
            );
            let members = groups.entry(key.clone()).or_default();
            if members.is_empty() {
                first_seen.push(key);
            }
            members.push(entity.entity_id.clone());
        }

        first_seen
            .into_iter()
            .filter_map(|key| groups.remove(&key))
            .collect()
    }

    /// Collapse every equivalence group of at least
    /// `config.min_group_size` entities.
    pub fn aggregate_graph(&mut self, config: &AggregateConfig) -> AggregateSummary {
        let mut summary = AggregateSummary {
            entities_before: self.entities.len(),
            edges_before: self.edges.len(),
            ..AggregateSummary::default()
        };
        let min = config.min_group_size.max(2);

        for group in self.equivalence_groups(config) {
            if group.len() < min {
                continue;
            }
            // Groups are disjoint, so every member is still present.
            if let Err(err) = self.merge_entities(&group) {
                debug!(error = %err, "skipping stale aggregation group");
                continue;
            }
            summary.groups.insert(group[0].clone(), group[1..].to_vec());
        }

        summary.entities_after = self.entities.len();
        summary.edges_after = self.edges.len();
        info!(
            groups = summary.groups.len(),
            entities_before = summary.entities_before,
            entities_after = summary.entities_after,
            "aggregated incident graph"
        );
        summary
    }

    /// Merge `group[1..]` into `group[0]`.
    ///
    /// Edges are rewired onto the survivor with their counts added; edges
    /// between two members of the group are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentError::EntityNotFound`] if any member is absent;
    /// the graph is left untouched in that case.
    ///
    /// # Panics
    ///
    /// Panics if the adjacency indexes diverge from the edge map afterwards.
    pub fn merge_entities(&mut self, group: &[String]) -> Result<(), IncidentError> {
        let Some((main_id, others)) = group.split_first() else {
            return Ok(());
        };
        for id in group {
            if !self.entities.contains_key(id) {
                return Err(IncidentError::not_found(id));
            }
        }
        let members: BTreeSet<&str> = group.iter().map(String::as_str).collect();
        let survivor = |id: &str| -> String {
            if members.contains(id) {
                main_id.clone()
            } else {
                id.to_string()
            }
        };

        let mut absorbed = Vec::with_capacity(others.len());
        for other in others.iter().filter(|id| *id != main_id) {
            for (source, target) in self.incident_edges(other) {
                let Some(edge) = self.remove_edge(&source, &target) else {
                    continue;
                };
                let (source, target) = (survivor(&source), survivor(&target));
                if source == target {
                    debug!(%source, "dropping edge inside aggregation group");
                    continue;
                }
                self.insert_edge(source, target, edge.edge_type, edge.count);
            }

            self.entity_sources.remove(other.as_str());
            self.entity_targets.remove(other.as_str());
            if let Some(mut entity) = self.entities.remove(other.as_str()) {
                let nested = std::mem::take(&mut entity.aggregated_entities);
                absorbed.push(entity);
                absorbed.extend(nested);
            }
        }

        self.entity_order.retain(|id| id == main_id || !members.contains(id.as_str()));
        for entity in &absorbed {
            self.aggregated_into.insert(entity.entity_id.clone(), main_id.clone());
        }
        // Anything previously folded into a merged entity now resolves to
        // the survivor as well.
        for owner in self.aggregated_into.values_mut() {
            if members.contains(owner.as_str()) {
                owner.clone_from(main_id);
            }
        }
        if let Some(main) = self.entities.get_mut(main_id) {
            main.aggregated_entities.extend(absorbed);
        }

        self.assert_adjacency_consistent();
        Ok(())
    }

    /// Per entity type: totals and what aggregation could collapse.
    #[must_use]
    pub fn topology_menu(&self, min_group_size: usize) -> Vec<TopologyMenuEntry> {
        let mut menu: BTreeMap<String, TopologyMenuEntry> = BTreeMap::new();
        for entity in self.entities() {
            let entry = menu
                .entry(entity.entity_type.clone())
                .or_insert_with(|| TopologyMenuEntry {
                    entity_type: entity.entity_type.clone(),
                    ..TopologyMenuEntry::default()
                });
            entry.total += entity.weight();
            entry.anomaly_count += entity.anomaly_weight();
        }

        // Every type opted in, anomalies included, shows the full potential.
        let everything = AggregateConfig {
            min_group_size,
            entity_types: menu
                .keys()
                .map(|entity_type| {
                    (
                        entity_type.clone(),
                        EntityTypeAggregation {
                            aggregate_anomaly: true,
                        },
                    )
                })
                .collect(),
        };
        let min = min_group_size.max(2);
        for group in self.equivalence_groups(&everything) {
            if group.len() < min {
                continue;
            }
            let Some(first) = self.entities.get(&group[0]) else {
                continue;
            };
            let Some(entry) = menu.get_mut(&first.entity_type) else {
                continue;
            };
            if first.is_anomaly {
                entry.anomaly_groups += 1;
                entry.anomaly_entities += group.len();
            } else {
                entry.aggregate_groups += 1;
                entry.aggregate_entities += group.len();
            }
        }

        menu.into_values().collect()
    }
}
