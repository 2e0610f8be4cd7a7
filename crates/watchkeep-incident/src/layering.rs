//! Rank layering for topology display.
//!
//! Entities are placed in their rank, and a rank whose entities sit at
//! different depths of the type graph is split into sub-ranks. Depth is a
//! property of the entity *type*: every entity of one type shares a depth,
//! even when individual entities sit deeper or shallower in the graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use crate::model::Entity;
use crate::snapshot::IncidentSnapshot;

/// One row of the layered topology view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankGroup<'a> {
    pub rank_id: i64,
    pub rank_name: &'a str,
    pub rank_alias: &'a str,
    pub rank_category: &'a str,
    /// Type depth shared by every entity in this group.
    pub depth: u32,
    /// Set on every group of a rank after the first.
    pub is_sub_rank: bool,
    pub entities: Vec<&'a Entity>,
    /// Includes aggregated entities.
    pub total: usize,
    pub anomaly_count: usize,
}

impl IncidentSnapshot {
    /// Depth of each entity type in the type graph.
    ///
    /// Types with no incoming edge from another type are roots at depth 0;
    /// other types take the shortest distance from any root. Types only
    /// reachable through a cycle of types stay at depth 0.
    #[must_use]
    pub fn find_entity_type_depths(&self) -> BTreeMap<&str, u32> {
        let mut children: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut has_parent: BTreeSet<&str> = BTreeSet::new();
        let mut depths: BTreeMap<&str, u32> = BTreeMap::new();

        for entity in self.entities.values() {
            depths.insert(entity.entity_type.as_str(), 0);
        }
        for (source, target) in self.edges.keys() {
            let (Some(source), Some(target)) =
                (self.entities.get(source), self.entities.get(target))
            else {
                continue;
            };
            let (from, to) = (source.entity_type.as_str(), target.entity_type.as_str());
            if from != to {
                children.entry(from).or_default().insert(to);
                has_parent.insert(to);
            }
        }

        let mut queue: VecDeque<&str> = depths
            .keys()
            .copied()
            .filter(|entity_type| !has_parent.contains(entity_type))
            .collect();
        let mut reached: BTreeSet<&str> = queue.iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            let depth = depths.get(current).copied().unwrap_or_default();
            for &child in children.get(current).into_iter().flatten() {
                if reached.insert(child) {
                    depths.insert(child, depth + 1);
                    queue.push_back(child);
                }
            }
        }
        depths
    }

    /// Entities grouped into `(rank, depth)` rows, ordered by rank id and
    /// then deepest first.
    #[must_use]
    pub fn group_by_rank(&self) -> Vec<RankGroup<'_>> {
        let depths = self.find_entity_type_depths();

        let mut rows: BTreeMap<(i64, i64), RankGroup<'_>> = BTreeMap::new();
        for entity in self.entities() {
            let Some(rank) = self.ranks.get(&entity.rank_name) else {
                continue;
            };
            let depth = depths
                .get(entity.entity_type.as_str())
                .copied()
                .unwrap_or_default();
            let row = rows
                .entry((rank.rank_id, -i64::from(depth)))
                .or_insert_with(|| RankGroup {
                    rank_id: rank.rank_id,
                    rank_name: &rank.rank_name,
                    rank_alias: &rank.rank_alias,
                    rank_category: &rank.rank_category,
                    depth,
                    is_sub_rank: false,
                    entities: Vec::new(),
                    total: 0,
                    anomaly_count: 0,
                });
            row.entities.push(entity);
            row.total += entity.weight();
            row.anomaly_count += entity.anomaly_weight();
        }

        let mut previous_rank = None;
        rows.into_values()
            .map(|mut row| {
                row.is_sub_rank = previous_rank == Some(row.rank_id);
                previous_rank = Some(row.rank_id);
                row
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{chain_snapshot, edge, entity, snapshot_with};

    #[test]
    fn chain_types_get_increasing_depths() {
        let snapshot = chain_snapshot();
        let depths = snapshot.find_entity_type_depths();
        assert_eq!(depths["BkNodeHost"], 0);
        assert_eq!(depths["BcsPod"], 1);
        assert_eq!(depths["APMService"], 2);
    }

    #[test]
    fn one_row_per_rank_for_a_simple_chain() {
        let snapshot = chain_snapshot();
        let rows = snapshot.group_by_rank();
        let ranks: Vec<i64> = rows.iter().map(|row| row.rank_id).collect();
        assert_eq!(ranks, [0, 1, 2]);
        assert!(rows.iter().all(|row| !row.is_sub_rank));
    }

    #[test]
    fn mixed_depths_split_a_rank_into_sub_ranks() {
        // Pods and containers share rank_1 but sit at different type depths.
        let snapshot = snapshot_with(
            vec![
                entity("host", "BkNodeHost", "rank_0"),
                entity("pod", "BcsPod", "rank_1"),
                entity("ctr", "BcsContainer", "rank_1"),
            ],
            vec![edge("host", "pod"), edge("pod", "ctr")],
        );
        let rows = snapshot.group_by_rank();
        let layout: Vec<(i64, u32, bool)> = rows
            .iter()
            .map(|row| (row.rank_id, row.depth, row.is_sub_rank))
            .collect();
        assert_eq!(layout, [(0, 0, false), (1, 2, false), (1, 1, true)]);
    }

    #[test]
    fn type_cycles_terminate() {
        let snapshot = snapshot_with(
            vec![
                entity("a", "TypeA", "rank_0"),
                entity("b", "TypeB", "rank_0"),
            ],
            vec![edge("a", "b"), edge("b", "a")],
        );
        let depths = snapshot.find_entity_type_depths();
        assert_eq!(depths["TypeA"], 0);
        assert_eq!(depths["TypeB"], 0);
        assert_eq!(snapshot.group_by_rank().len(), 1);
    }

    #[test]
    fn aggregated_members_are_counted_not_listed() {
        let mut main = entity("pod-0", "BcsPod", "rank_1");
        let mut member = entity("pod-1", "BcsPod", "rank_1");
        member.is_anomaly = true;
        main.aggregated_entities = vec![member, entity("pod-2", "BcsPod", "rank_1")];
        let snapshot = snapshot_with(vec![main], vec![]);

        let rows = snapshot.group_by_rank();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entities.len(), 1);
        assert_eq!(rows[0].total, 3);
        assert_eq!(rows[0].anomaly_count, 1);
    }
}
