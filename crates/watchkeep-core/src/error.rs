use std::fmt;

/// Machine-readable error codes shared by the duty and incident crates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidTimeFormat,
    InvalidWorkDay,
    InvalidDateRange,
    InvalidDutyGroup,
    RuleNotFound,
    EntityNotFound,
    UnknownRank,
    UnknownCategory,
    UnknownEdgeEndpoint,
    DuplicateEntity,
    SnapshotParseError,
    StoreFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidTimeFormat => "E2001",
            Self::InvalidWorkDay => "E2002",
            Self::InvalidDateRange => "E2003",
            Self::InvalidDutyGroup => "E2004",
            Self::RuleNotFound => "E2005",
            Self::EntityNotFound => "E3001",
            Self::UnknownRank => "E3002",
            Self::UnknownCategory => "E3003",
            Self::UnknownEdgeEndpoint => "E3004",
            Self::DuplicateEntity => "E3005",
            Self::SnapshotParseError => "E3006",
            Self::StoreFailure => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidTimeFormat => "Invalid time format",
            Self::InvalidWorkDay => "Invalid work day",
            Self::InvalidDateRange => "Invalid date range",
            Self::InvalidDutyGroup => "Invalid duty group",
            Self::RuleNotFound => "Duty rule not found",
            Self::EntityNotFound => "Incident entity not found",
            Self::UnknownRank => "Unknown topology rank",
            Self::UnknownCategory => "Unknown topology category",
            Self::UnknownEdgeEndpoint => "Edge references unknown entity",
            Self::DuplicateEntity => "Duplicate entity id",
            Self::SnapshotParseError => "Incident snapshot parse error",
            Self::StoreFailure => "Duty store operation failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .watchkeep/config.toml and retry."),
            Self::InvalidTimeFormat => Some("Use HH:MM, or DD HH:MM for datetime ranges."),
            Self::InvalidWorkDay => {
                Some("Weekly days are 1 (Monday) to 7 (Sunday); monthly days are 1 to 31.")
            }
            Self::InvalidDateRange => Some("Use YYYY-MM-DD--YYYY-MM-DD with begin <= end."),
            Self::InvalidDutyGroup => {
                Some("Auto groups need one user pool and a group_number of at least 1.")
            }
            Self::RuleNotFound => None,
            Self::EntityNotFound => Some("Check the entity id against the current snapshot."),
            Self::UnknownRank | Self::UnknownCategory => {
                Some("Regenerate the snapshot; its hierarchy tables are incomplete.")
            }
            Self::UnknownEdgeEndpoint | Self::DuplicateEntity | Self::SnapshotParseError => {
                Some("The snapshot producer emitted an inconsistent graph.")
            }
            Self::StoreFailure => Some("Check the state file and retry."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 13] = [
        ErrorCode::ConfigParseError,
        ErrorCode::InvalidTimeFormat,
        ErrorCode::InvalidWorkDay,
        ErrorCode::InvalidDateRange,
        ErrorCode::InvalidDutyGroup,
        ErrorCode::RuleNotFound,
        ErrorCode::EntityNotFound,
        ErrorCode::UnknownRank,
        ErrorCode::UnknownCategory,
        ErrorCode::UnknownEdgeEndpoint,
        ErrorCode::DuplicateEntity,
        ErrorCode::SnapshotParseError,
        ErrorCode::StoreFailure,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let raw = code.code();
            assert_eq!(raw.len(), 5);
            assert!(raw.starts_with('E'));
            assert!(raw.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn store_failure_points_at_the_state_file() {
        assert_eq!(ErrorCode::StoreFailure.code(), "E5001");
        assert!(ErrorCode::StoreFailure.hint().is_some_and(|h| h.contains("state file")));
    }

    #[test]
    fn display_matches_code() {
        assert_eq!(ErrorCode::EntityNotFound.to_string(), "E3001");
    }
}
