//! Typed failures raised while building or querying an incident snapshot.

use watchkeep_core::error::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum IncidentError {
    /// A query named an entity the snapshot does not hold.
    #[error("entity not found: {entity_id}")]
    EntityNotFound { entity_id: String },

    /// A rank points at a category missing from the hierarchy table.
    #[error("rank {rank_name} references unknown category {category}")]
    UnknownCategory { rank_name: String, category: String },

    /// An entity points at a rank missing from the hierarchy table.
    #[error("entity {entity_id} references unknown rank {rank_name}")]
    UnknownRank { entity_id: String, rank_name: String },

    /// An edge names an entity that was never declared.
    #[error("edge {source_id} -> {target_id} references unknown entity {missing}")]
    UnknownEdgeEndpoint {
        source_id: String,
        target_id: String,
        missing: String,
    },

    /// The same entity id appears twice (top-level or aggregated).
    #[error("duplicate entity id: {entity_id}")]
    DuplicateEntity { entity_id: String },

    /// The document is not valid snapshot JSON.
    #[error("failed to parse incident snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

impl IncidentError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EntityNotFound { .. } => ErrorCode::EntityNotFound,
            Self::UnknownCategory { .. } => ErrorCode::UnknownCategory,
            Self::UnknownRank { .. } => ErrorCode::UnknownRank,
            Self::UnknownEdgeEndpoint { .. } => ErrorCode::UnknownEdgeEndpoint,
            Self::DuplicateEntity { .. } => ErrorCode::DuplicateEntity,
            Self::Parse(_) => ErrorCode::SnapshotParseError,
        }
    }

    pub(crate) fn not_found(entity_id: &str) -> Self {
        Self::EntityNotFound {
            entity_id: entity_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_the_id() {
        let err = IncidentError::not_found("pod-1");
        assert_eq!(err.to_string(), "entity not found: pod-1");
        assert_eq!(err.code().code(), "E3001");
    }

    #[test]
    fn parse_errors_map_to_snapshot_code() {
        let err: IncidentError = serde_json::from_str::<u32>("{").expect_err("invalid").into();
        assert_eq!(err.code(), ErrorCode::SnapshotParseError);
    }
}
