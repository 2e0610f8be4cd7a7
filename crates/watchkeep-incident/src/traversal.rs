//! Reachability queries over the incident graph.
//!
//! Walks are iterative breadth-first searches with a visited set, so cyclic
//! producer output terminates and deep chains do not grow the stack.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::error::IncidentError;
use crate::model::{Entity, GraphContent, SnapshotContent};
use crate::snapshot::{EdgeKey, IncidentSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow edges backwards, towards causes.
    Upstream,
    /// Follow edges forwards, towards effects.
    Downstream,
}

/// One rank's share of an entity's propagation chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankBucket<'a> {
    pub rank_id: i64,
    pub rank_name: &'a str,
    pub rank_alias: &'a str,
    pub rank_category: &'a str,
    pub entities: Vec<&'a Entity>,
    pub total: usize,
    pub anomaly_count: usize,
}

impl IncidentSnapshot {
    /// Every entity reachable from `start` in `direction`, `start` first,
    /// together with the edges walked.
    fn walk<'a>(
        &'a self,
        start: &'a str,
        direction: Direction,
    ) -> (Vec<&'a str>, Vec<(&'a str, &'a str)>) {
        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut order = vec![start];
        let mut walked = Vec::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            let neighbours = match direction {
                Direction::Upstream => self.sources(current),
                Direction::Downstream => self.targets(current),
            };
            for next in neighbours {
                let next = next.as_str();
                walked.push(match direction {
                    Direction::Upstream => (next, current),
                    Direction::Downstream => (current, next),
                });
                if visited.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }
        (order, walked)
    }

    /// Ids reachable from `entity_id` in one direction, excluding itself.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentError::EntityNotFound`] if the id is absent.
    pub fn reachable(
        &self,
        entity_id: &str,
        direction: Direction,
    ) -> Result<Vec<&str>, IncidentError> {
        let Some((start, _)) = self.entities.get_key_value(entity_id) else {
            return Err(IncidentError::not_found(entity_id));
        };
        let (mut order, _) = self.walk(start, direction);
        order.remove(0);
        Ok(order)
    }

    /// The entity's full upstream and downstream chain, bucketed by rank.
    ///
    /// Every rank of the snapshot gets a bucket, ordered by rank id, even
    /// when empty. Each reachable entity is counted once.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentError::EntityNotFound`] if the id is absent.
    pub fn upstreams_group_by_rank(
        &self,
        entity_id: &str,
    ) -> Result<Vec<RankBucket<'_>>, IncidentError> {
        let Some((start, _)) = self.entities.get_key_value(entity_id) else {
            return Err(IncidentError::not_found(entity_id));
        };

        let mut buckets: BTreeMap<i64, RankBucket<'_>> = self
            .ranks
            .values()
            .map(|rank| {
                (
                    rank.rank_id,
                    RankBucket {
                        rank_id: rank.rank_id,
                        rank_name: &rank.rank_name,
                        rank_alias: &rank.rank_alias,
                        rank_category: &rank.rank_category,
                        entities: Vec::new(),
                        total: 0,
                        anomaly_count: 0,
                    },
                )
            })
            .collect();

        let (upstream, _) = self.walk(start, Direction::Upstream);
        let (downstream, _) = self.walk(start, Direction::Downstream);
        let mut seen = HashSet::new();
        for id in upstream.into_iter().chain(downstream) {
            if !seen.insert(id) {
                continue;
            }
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            let Some(bucket) = self
                .ranks
                .get(&entity.rank_name)
                .and_then(|rank| buckets.get_mut(&rank.rank_id))
            else {
                continue;
            };
            bucket.entities.push(entity);
            bucket.total += 1;
            bucket.anomaly_count += usize::from(entity.is_anomaly);
        }

        Ok(buckets.into_values().collect())
    }

    /// A new snapshot holding only the entity's upstream and downstream
    /// closure: the walked edges, the alerts on those entities and the
    /// ranks and categories needed to describe them.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentError::EntityNotFound`] if the id is absent.
    pub fn generate_entity_sub_graph(&self, entity_id: &str) -> Result<Self, IncidentError> {
        let Some((start, _)) = self.entities.get_key_value(entity_id) else {
            return Err(IncidentError::not_found(entity_id));
        };

        let (upstream, up_edges) = self.walk(start, Direction::Upstream);
        let (downstream, down_edges) = self.walk(start, Direction::Downstream);
        let members: BTreeSet<&str> = upstream.into_iter().chain(downstream).collect();
        let walked: BTreeSet<(&str, &str)> = up_edges.into_iter().chain(down_edges).collect();

        let entities: Vec<Entity> = self
            .entities()
            .filter(|entity| members.contains(entity.entity_id.as_str()))
            .cloned()
            .collect();

        let product_hierarchy_rank: BTreeMap<_, _> = self
            .ranks
            .iter()
            .filter(|(name, _)| entities.iter().any(|entity| &entity.rank_name == *name))
            .map(|(name, rank)| (name.clone(), rank.clone()))
            .collect();
        let product_hierarchy_category = self
            .categories
            .iter()
            .filter(|(name, _)| {
                product_hierarchy_rank
                    .values()
                    .any(|rank| &rank.rank_category == *name)
            })
            .map(|(name, category)| (name.clone(), category.clone()))
            .collect();

        let full = self.to_content();
        let edges = full
            .incident_propagation_graph
            .edges
            .into_iter()
            .filter(|edge| walked.contains(&(edge.source_id.as_str(), edge.target_id.as_str())))
            .collect();
        let incident_alerts = self
            .alerts
            .iter()
            .filter(|alert| {
                alert
                    .entity_id
                    .as_deref()
                    .and_then(|id| self.resolve_entity_id(id))
                    .is_some_and(|id| members.contains(id))
            })
            .cloned()
            .collect();

        Self::from_content(SnapshotContent {
            bk_biz_id: self.bk_biz_id(),
            product_hierarchy_category,
            product_hierarchy_rank,
            incident_propagation_graph: GraphContent { entities, edges },
            incident_alerts,
        })
    }

    fn to_digraph(&self) -> DiGraph<String, u32> {
        let mut graph = DiGraph::with_capacity(self.entities.len(), self.edges.len());
        let mut index: HashMap<&str, NodeIndex> = HashMap::with_capacity(self.entities.len());
        for id in &self.entity_order {
            index.insert(id, graph.add_node(id.clone()));
        }
        for ((source, target), edge) in &self.edges {
            if let (Some(&from), Some(&to)) =
                (index.get(source.as_str()), index.get(target.as_str()))
            {
                graph.add_edge(from, to, edge.count);
            }
        }
        graph
    }

    /// Whether the producer emitted a cyclic graph (self-loops included).
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.to_digraph())
    }

    /// Every strongly connected component that forms a cycle, as sorted id
    /// lists.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let graph = self.to_digraph();
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|node| graph.find_edge(*node, *node).is_some())
            })
            .map(|component| {
                let mut ids: Vec<String> = component
                    .into_iter()
                    .filter_map(|node| graph.node_weight(node).cloned())
                    .collect();
                ids.sort_unstable();
                ids
            })
            .collect();
        cycles.sort_unstable();
        cycles
    }

    /// Edge keys touching `entity_id`, outgoing first.
    #[must_use]
    pub fn incident_edges(&self, entity_id: &str) -> Vec<EdgeKey> {
        let outgoing = self
            .targets(entity_id)
            .iter()
            .map(|target| (entity_id.to_string(), target.clone()));
        let incoming = self
            .sources(entity_id)
            .iter()
            .map(|source| (source.clone(), entity_id.to_string()));
        outgoing.chain(incoming).collect()
    }
}
