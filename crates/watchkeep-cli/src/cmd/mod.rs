pub mod completions;
pub mod handoff;
pub mod incident;
pub mod preview;
pub mod reconcile;

use crate::output::{CliError, OutputMode, render_error};
use chrono::NaiveDateTime;
use watchkeep_duty::model::parse_datetime;

/// Parse a local `YYYY-MM-DD[ HH:MM[:SS]]` flag value, rendering a coded
/// error on failure.
pub fn parse_local_time(
    output: OutputMode,
    flag: &str,
    raw: &str,
) -> anyhow::Result<NaiveDateTime> {
    match parse_datetime(raw) {
        Ok(value) => Ok(value),
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            anyhow::bail!("invalid {flag}: {raw:?}")
        }
    }
}
