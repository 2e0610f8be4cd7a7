//! Typed failures raised while validating duty rules.

use watchkeep_core::error::ErrorCode;

/// Errors produced when a stored rule cannot be turned into a typed
/// [`crate::model::DutyRule`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DutyError {
    /// A clock or day/clock string could not be parsed.
    #[error("invalid time format: {value:?}")]
    InvalidTimeFormat {
        /// The offending raw string.
        value: String,
    },

    /// A work day lies outside the range allowed by the rotation type.
    #[error("work day {day} is outside 1..={max}")]
    InvalidWorkDay {
        /// The rejected day number.
        day: u32,
        /// Largest day allowed for this rotation type.
        max: u32,
    },

    /// A `YYYY-MM-DD--YYYY-MM-DD` range is malformed or reversed.
    #[error("invalid date range: {value:?}")]
    InvalidDateRange {
        /// The offending raw range.
        value: String,
    },

    /// The arrangement's user configuration is unusable.
    #[error("invalid duty group: {reason}")]
    InvalidDutyGroup {
        /// Why the group was rejected.
        reason: String,
    },

    /// A rule id was requested but is not present.
    #[error("duty rule {rule_id} not found")]
    RuleNotFound {
        /// The missing rule id.
        rule_id: u64,
    },
}

impl DutyError {
    /// Map onto the shared machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTimeFormat { .. } => ErrorCode::InvalidTimeFormat,
            Self::InvalidWorkDay { .. } => ErrorCode::InvalidWorkDay,
            Self::InvalidDateRange { .. } => ErrorCode::InvalidDateRange,
            Self::InvalidDutyGroup { .. } => ErrorCode::InvalidDutyGroup,
            Self::RuleNotFound { .. } => ErrorCode::RuleNotFound,
        }
    }

    pub(crate) fn time(value: &str) -> Self {
        Self::InvalidTimeFormat {
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_shared_table() {
        assert_eq!(DutyError::time("9").code(), ErrorCode::InvalidTimeFormat);
        assert_eq!(
            DutyError::InvalidWorkDay { day: 9, max: 7 }.code().code(),
            "E2002"
        );
        assert_eq!(DutyError::RuleNotFound { rule_id: 4 }.code().code(), "E2005");
    }

    #[test]
    fn messages_name_the_bad_value() {
        let err = DutyError::InvalidWorkDay { day: 32, max: 31 };
        assert_eq!(err.to_string(), "work day 32 is outside 1..=31");
    }
}
