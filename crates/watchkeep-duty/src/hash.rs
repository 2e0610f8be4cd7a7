//! Content hashes for frozen rule snapshots.
//!
//! The hash covers the rule definition only: resume cursors written back by
//! planning passes are cleared first, so advancing a snapshot never looks
//! like a rule edit. Format: `blake3:<lowercase hex>`.

use crate::model::DutyRuleConfig;

/// Hash the canonical JSON encoding of `rule` without its cursors.
///
/// # Errors
///
/// Returns an error if the rule cannot be serialized.
pub fn rule_hash(rule: &DutyRuleConfig) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(&rule.without_cursors())?;
    Ok(format!("blake3:{}", blake3::hash(&canonical).to_hex()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SpecCursor, parse_datetime};

    fn rule() -> DutyRuleConfig {
        serde_json::from_str(
            r#"{
                "id": 1,
                "effective_time": "2024-01-01 00:00:00",
                "duty_arranges": [{
                    "duty_users": [[{"id": "a"}]],
                    "duty_time": [{"work_type": "daily", "work_time": ["09:00--18:00"]}]
                }]
            }"#,
        )
        .expect("valid json")
    }

    #[test]
    fn hash_has_prefix_and_full_digest() {
        let hash = rule_hash(&rule()).expect("hashable");
        assert!(hash.starts_with("blake3:"));
        assert_eq!(hash.len(), "blake3:".len() + 64);
    }

    #[test]
    fn cursors_do_not_change_the_hash() {
        let base = rule();
        let advanced = base.with_cursors(&[SpecCursor {
            arrange_index: 0,
            spec_index: 0,
            begin_time: parse_datetime("2024-03-01").expect("valid"),
        }]);
        assert_eq!(
            rule_hash(&base).expect("hashable"),
            rule_hash(&advanced).expect("hashable")
        );
    }

    #[test]
    fn definition_changes_do() {
        let base = rule();
        let mut edited = base.clone();
        edited.duty_arranges[0].duty_time[0].work_time = vec!["10:00--18:00".to_string()];
        assert_ne!(
            rule_hash(&base).expect("hashable"),
            rule_hash(&edited).expect("hashable")
        );
    }
}
