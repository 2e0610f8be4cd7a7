//! `wk incident`: queries over an incident snapshot document.

use crate::output::{
    CliError, OutputMode, pretty_kv, pretty_section, render, render_error, render_mode,
};
use anyhow::Context;
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use watchkeep_core::config::ProjectConfig;
use watchkeep_incident::handlers::HandlerCount;
use watchkeep_incident::model::{Entity, SnapshotContent};
use watchkeep_incident::{
    AggregateConfig, AggregateSummary, AlertRecord, Direction, IncidentError, IncidentSnapshot,
    incident_handlers,
};

#[derive(Args, Debug)]
pub struct IncidentArgs {
    #[command(subcommand)]
    pub command: IncidentCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WalkDirection {
    Up,
    Down,
}

#[derive(Subcommand, Debug)]
pub enum IncidentCommand {
    /// Upstream entities of one entity, bucketed by rank.
    Upstreams {
        /// Snapshot document (JSON).
        snapshot: PathBuf,
        entity_id: String,
    },

    /// Every entity reachable from one entity.
    Reach {
        snapshot: PathBuf,
        entity_id: String,
        #[arg(long, value_enum, default_value_t = WalkDirection::Up)]
        direction: WalkDirection,
    },

    /// Closure of one entity as a standalone snapshot document.
    Subgraph {
        snapshot: PathBuf,
        entity_id: String,
    },

    /// Rank rows of the layered topology view.
    Layers {
        snapshot: PathBuf,
        /// Aggregate before layering.
        #[arg(long)]
        aggregate: bool,
    },

    /// Collapse structurally equivalent entities.
    Aggregate {
        snapshot: PathBuf,
        /// Smallest group to collapse (overrides the project config).
        #[arg(long)]
        min_group: Option<usize>,
        /// Write the aggregated snapshot document here.
        #[arg(long)]
        write: Option<PathBuf>,
    },

    /// Aggregation candidates per entity type.
    Menu {
        snapshot: PathBuf,
        #[arg(long)]
        min_group: Option<usize>,
    },

    /// Report dependency cycles.
    Cycles { snapshot: PathBuf },

    /// Alert ids and the entity each one resolves to.
    Alerts { snapshot: PathBuf },

    /// Who is handling the incident's alerts.
    Handlers {
        snapshot: PathBuf,
        /// JSON list of alert records (`id`, `assignee`, `category`, `status`).
        #[arg(long)]
        alerts: PathBuf,
        /// Current user, counted under "mine".
        #[arg(long)]
        user: String,
    },
}

fn load_snapshot(path: &Path, output: OutputMode) -> anyhow::Result<IncidentSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    query(output, IncidentSnapshot::from_json(&raw))
}

/// Run a fallible snapshot query, rendering a coded error on failure.
fn query<T>(output: OutputMode, result: Result<T, IncidentError>) -> anyhow::Result<T> {
    result.or_else(|err| {
        render_error(output, &CliError::from(&err))?;
        Err(anyhow::anyhow!("{err}"))
    })
}

fn entity_line(w: &mut dyn Write, entity: &Entity) -> std::io::Result<()> {
    let mut flags = Vec::new();
    if entity.is_root {
        flags.push("root");
    }
    if entity.is_anomaly {
        flags.push("anomaly");
    }
    let merged = if entity.aggregated_entities.is_empty() {
        String::new()
    } else {
        format!(" (+{} merged)", entity.aggregated_entities.len())
    };
    writeln!(
        w,
        "    {} [{}] {}{merged}",
        entity.entity_id,
        entity.entity_type,
        flags.join(",")
    )
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ReachOutput<'a> {
    entity_id: &'a str,
    direction: &'static str,
    entities: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct AggregateOutput {
    summary: AggregateSummary,
    snapshot: SnapshotContent,
}

#[derive(Debug, Serialize)]
struct CycleOutput {
    has_cycles: bool,
    cycles: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct AlertRow<'a> {
    id: u64,
    strategy_id: u64,
    entity_id: Option<&'a str>,
}

fn handler_line(w: &mut dyn Write, handler: &HandlerCount) -> std::io::Result<()> {
    writeln!(w, "{}\t{}\t{}", handler.id, handler.name, handler.alert_count)
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Execute `wk incident <query>`.
///
/// # Errors
///
/// Returns an error if a file cannot be read, the snapshot fails
/// validation, or the query names an unknown entity.
#[allow(clippy::too_many_lines)]
pub fn run_incident(
    args: &IncidentArgs,
    output: OutputMode,
    config: &ProjectConfig,
) -> anyhow::Result<()> {
    match &args.command {
        IncidentCommand::Upstreams {
            snapshot,
            entity_id,
        } => {
            let snapshot = load_snapshot(snapshot, output)?;
            let buckets = query(output, snapshot.upstreams_group_by_rank(entity_id))?;
            render(output, &buckets, |buckets, w| {
                for bucket in buckets {
                    writeln!(
                        w,
                        "{} {} ({}/{} anomalous)",
                        bucket.rank_name, bucket.rank_alias, bucket.anomaly_count, bucket.total
                    )?;
                    for entity in &bucket.entities {
                        entity_line(w, entity)?;
                    }
                }
                Ok(())
            })
        }

        IncidentCommand::Reach {
            snapshot,
            entity_id,
            direction,
        } => {
            let snapshot = load_snapshot(snapshot, output)?;
            let (direction, label) = match direction {
                WalkDirection::Up => (Direction::Upstream, "upstream"),
                WalkDirection::Down => (Direction::Downstream, "downstream"),
            };
            let entities = query(output, snapshot.reachable(entity_id, direction))?;
            let payload = ReachOutput {
                entity_id: entity_id.as_str(),
                direction: label,
                entities,
            };
            render(output, &payload, |p, w| {
                for id in &p.entities {
                    writeln!(w, "{id}")?;
                }
                Ok(())
            })
        }

        IncidentCommand::Subgraph {
            snapshot,
            entity_id,
        } => {
            let snapshot = load_snapshot(snapshot, output)?;
            let sub = query(output, snapshot.generate_entity_sub_graph(entity_id))?;
            info!(
                entity_id = %entity_id,
                entities = sub.entity_count(),
                edges = sub.edge_count(),
                "extracted sub-graph"
            );
            // A document either way: pretty and text print it as JSON too.
            let content = sub.to_content();
            render(output, &content, |content, w| {
                serde_json::to_writer_pretty(&mut *w, content)?;
                writeln!(w)
            })
        }

        IncidentCommand::Layers {
            snapshot,
            aggregate,
        } => {
            let mut snapshot = load_snapshot(snapshot, output)?;
            if *aggregate {
                snapshot.aggregate_graph(&AggregateConfig::from(&config.incident));
            }
            let rows = snapshot.group_by_rank();
            render_mode(
                output,
                &rows,
                |rows, w| {
                    for row in rows {
                        let ids: Vec<&str> =
                            row.entities.iter().map(|e| e.entity_id.as_str()).collect();
                        writeln!(
                            w,
                            "{}\t{}\t{}\t{}\t{}",
                            row.rank_id,
                            row.depth,
                            row.total,
                            row.anomaly_count,
                            ids.join(",")
                        )?;
                    }
                    Ok(())
                },
                |rows, w| {
                    for row in rows {
                        let indent = if row.is_sub_rank { "  " } else { "" };
                        writeln!(
                            w,
                            "{indent}{} [{}] depth {}  {} entities, {} anomalous",
                            row.rank_alias,
                            row.rank_category,
                            row.depth,
                            row.total,
                            row.anomaly_count
                        )?;
                        for entity in &row.entities {
                            entity_line(w, entity)?;
                        }
                    }
                    Ok(())
                },
            )
        }

        IncidentCommand::Aggregate {
            snapshot,
            min_group,
            write,
        } => {
            let mut snapshot = load_snapshot(snapshot, output)?;
            let mut aggregate = AggregateConfig::from(&config.incident);
            if let Some(min) = min_group {
                aggregate.min_group_size = *min;
            }
            let summary = snapshot.aggregate_graph(&aggregate);
            let content = snapshot.to_content();
            if let Some(path) = write {
                let body = serde_json::to_vec_pretty(&content)?;
                std::fs::write(path, body)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            let payload = AggregateOutput {
                summary,
                snapshot: content,
            };
            render(output, &payload, |p, w| {
                let s = &p.summary;
                pretty_section(w, "Aggregation")?;
                pretty_kv(
                    w,
                    "entities",
                    format!("{} -> {}", s.entities_before, s.entities_after),
                )?;
                pretty_kv(w, "edges", format!("{} -> {}", s.edges_before, s.edges_after))?;
                for (survivor, merged) in &s.groups {
                    writeln!(w, "  {survivor} <- {}", merged.join(", "))?;
                }
                Ok(())
            })
        }

        IncidentCommand::Menu {
            snapshot,
            min_group,
        } => {
            let snapshot = load_snapshot(snapshot, output)?;
            let min = min_group.unwrap_or(config.incident.aggregate_min_group);
            let menu = snapshot.topology_menu(min);
            render(output, &menu, |menu, w| {
                for entry in menu {
                    writeln!(
                        w,
                        "{}\ttotal={}\tanomalous={}\tgroups={}/{}\tanomaly_groups={}/{}",
                        entry.entity_type,
                        entry.total,
                        entry.anomaly_count,
                        entry.aggregate_groups,
                        entry.aggregate_entities,
                        entry.anomaly_groups,
                        entry.anomaly_entities
                    )?;
                }
                Ok(())
            })
        }

        IncidentCommand::Cycles { snapshot } => {
            let snapshot = load_snapshot(snapshot, output)?;
            let payload = CycleOutput {
                has_cycles: snapshot.has_cycles(),
                cycles: snapshot.find_cycles(),
            };
            render(output, &payload, |p, w| {
                if p.cycles.is_empty() {
                    return writeln!(w, "no cycles");
                }
                for cycle in &p.cycles {
                    writeln!(w, "{}", cycle.join(" -> "))?;
                }
                Ok(())
            })
        }

        IncidentCommand::Alerts { snapshot } => {
            let snapshot = load_snapshot(snapshot, output)?;
            let mapping = snapshot.alert_entity_mapping();
            let rows: Vec<AlertRow<'_>> = snapshot
                .alerts()
                .iter()
                .map(|alert| AlertRow {
                    id: alert.id,
                    strategy_id: alert.strategy_id,
                    entity_id: mapping.get(&alert.id).copied(),
                })
                .collect();
            render(output, &rows, |rows, w| {
                for row in rows {
                    let entity = row.entity_id.unwrap_or("-");
                    writeln!(w, "{}\t{}\t{entity}", row.id, row.strategy_id)?;
                }
                Ok(())
            })
        }

        IncidentCommand::Handlers {
            snapshot,
            alerts,
            user,
        } => {
            let snapshot = load_snapshot(snapshot, output)?;
            let raw = std::fs::read_to_string(alerts)
                .with_context(|| format!("Failed to read {}", alerts.display()))?;
            let records: Vec<AlertRecord> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", alerts.display()))?;
            let summary = incident_handlers(&snapshot, &records, user)?;
            render(output, &summary, |s, w| {
                handler_line(w, &s.all)?;
                handler_line(w, &s.not_dispatch)?;
                handler_line(w, &s.mine)?;
                for other in &s.other {
                    handler_line(w, other)?;
                }
                Ok(())
            })
        }
    }
}
