use anyhow::{Context, Result, bail};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::io::IsTerminal;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub duty: DutyConfig,
    #[serde(default)]
    pub incident: IncidentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutyConfig {
    /// Local offset used for handoff arithmetic, e.g. `"+08:00"`.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    /// Preview window used when a rule has neither an end date nor an
    /// explicit window.
    #[serde(default = "default_preview_days")]
    pub preview_days: u32,
    /// Snapshots whose next plan time falls inside this horizon are planned
    /// during reconciliation.
    #[serde(default = "default_plan_ahead_days")]
    pub plan_ahead_days: u32,
}

impl Default for DutyConfig {
    fn default() -> Self {
        Self {
            utc_offset: default_utc_offset(),
            preview_days: default_preview_days(),
            plan_ahead_days: default_plan_ahead_days(),
        }
    }
}

impl DutyConfig {
    /// Parse [`DutyConfig::utc_offset`] into a chrono offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is not `Z` or `±HH:MM`.
    pub fn offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.utc_offset)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentConfig {
    /// Minimum number of structurally-equivalent entities before they are
    /// collapsed into one node.
    #[serde(default = "default_aggregate_min_group")]
    pub aggregate_min_group: usize,
    /// Entity types eligible for aggregation. Empty means every type.
    #[serde(default)]
    pub entity_types: BTreeMap<String, EntityTypeAggregation>,
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            aggregate_min_group: default_aggregate_min_group(),
            entity_types: BTreeMap::new(),
        }
    }
}

/// Per-entity-type aggregation switch, as offered by the topology menu.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeAggregation {
    /// Let anomalous, non-root entities of this type merge among themselves.
    #[serde(default)]
    pub aggregate_anomaly: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Load `.watchkeep/config.toml` under `project_root`, falling back to
/// defaults when the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(".watchkeep/config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .duty
        .offset()
        .with_context(|| format!("Invalid duty.utc_offset in {}", path.display()))?;
    debug!(path = %path.display(), "loaded project config");
    Ok(config)
}

/// Load the per-user config from the platform config directory.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("watchkeep/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve project, user and output settings into one view.
///
/// # Errors
///
/// Returns an error if either config file is malformed.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

/// Parse `Z`, `+HH:MM` or `-HH:MM` into a [`FixedOffset`].
///
/// # Errors
///
/// Returns an error for any other shape or an out-of-range offset.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).context("zero offset");
    }

    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => bail!("utc offset must start with + or -: {raw:?}"),
    };
    let Some((hours, minutes)) = rest.split_once(':') else {
        bail!("utc offset must look like +HH:MM: {raw:?}");
    };
    let hours: i32 = hours
        .parse()
        .with_context(|| format!("invalid offset hours in {raw:?}"))?;
    let minutes: i32 = minutes
        .parse()
        .with_context(|| format!("invalid offset minutes in {raw:?}"))?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        bail!("utc offset out of range: {raw:?}");
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("utc offset out of range: {raw:?}"))
}

fn default_utc_offset() -> String {
    "+08:00".to_string()
}

const fn default_preview_days() -> u32 {
    30
}

const fn default_plan_ahead_days() -> u32 {
    7
}

const fn default_aggregate_min_group() -> usize {
    3
}
