//! Loading duty rule documents from disk.
//!
//! A rule file holds one rule, a list of rules, or a table with a `rules`
//! list. The format follows the extension: `.json`, `.yaml`/`.yml` or
//! `.toml` (TOML only supports the table shape).

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;
use watchkeep_duty::DutyRuleConfig;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuleDocument {
    Wrapped { rules: Vec<DutyRuleConfig> },
    Many(Vec<DutyRuleConfig>),
    One(Box<DutyRuleConfig>),
}

impl RuleDocument {
    fn into_rules(self) -> Vec<DutyRuleConfig> {
        match self {
            Self::Wrapped { rules } | Self::Many(rules) => rules,
            Self::One(rule) => vec![*rule],
        }
    }
}

fn parse_rules(raw: &str, extension: &str) -> Result<Vec<DutyRuleConfig>> {
    let document: RuleDocument = match extension {
        "json" => serde_json::from_str(raw).context("parsing JSON rule document")?,
        "yaml" | "yml" => serde_yaml::from_str(raw).context("parsing YAML rule document")?,
        "toml" => toml::from_str(raw).context("parsing TOML rule document")?,
        other => bail!("unsupported rule file extension {other:?}; use json, yaml or toml"),
    };
    Ok(document.into_rules())
}

/// Read every rule in `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, has an unknown extension,
/// or does not hold rule documents.
pub fn load_rules(path: &Path) -> Result<Vec<DutyRuleConfig>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("json")
        .to_ascii_lowercase();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let rules =
        parse_rules(&raw, &extension).with_context(|| format!("in {}", path.display()))?;
    debug!(path = %path.display(), rules = rules.len(), "loaded duty rules");
    Ok(rules)
}

/// Read exactly one rule from `path`, or the one matching `rule_id` when the
/// file holds several.
///
/// # Errors
///
/// Returns an error if loading fails, the file is empty, or the choice is
/// ambiguous or unmatched.
pub fn load_rule(path: &Path, rule_id: Option<u64>) -> Result<DutyRuleConfig> {
    let mut rules = load_rules(path)?;
    match rule_id {
        Some(id) => rules
            .into_iter()
            .find(|rule| rule.id == id)
            .with_context(|| format!("rule {id} not found in {}", path.display())),
        None if rules.len() == 1 => Ok(rules.remove(0)),
        None if rules.is_empty() => bail!("{} holds no duty rules", path.display()),
        None => bail!(
            "{} holds {} rules; pick one with --rule-id",
            path.display(),
            rules.len()
        ),
    }
}
