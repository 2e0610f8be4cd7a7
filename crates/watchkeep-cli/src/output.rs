//! How `wk` commands print schedules, reports and errors.
//!
//! Each runner gets an [`OutputMode`] from `main` and hands a `Serialize`
//! payload plus a human renderer to [`render`] or [`render_mode`].
//!
//! # Choosing a mode
//!
//! First match wins:
//! 1. `--format` flag
//! 2. `--json` flag
//! 3. `FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 4. `output` in the user config
//! 5. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.
//!
//! Steps 2–5 are resolved by `watchkeep_core::config::resolve_config`; this
//! module maps its answer back onto [`OutputMode`].

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};
use watchkeep_core::error::ErrorCode;

/// Width of the dashed line under pretty headings.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Dashed line under a pretty heading.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Heading line plus its dashed underline.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// `key:` padded to a fixed column, then the value.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// How a command prints its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, aligned columns).
    Pretty,
    /// Plain tab-separated rows for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Map a normalized mode name (`pretty`, `text`, `json`) to a mode.
    /// Anything else falls back to text.
    pub fn from_resolved(raw: &str) -> Self {
        match raw {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Text,
        }
    }

    /// JSON payloads on stdout, JSON error envelopes on stderr.
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Error envelope printed on stderr before a command fails.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// What went wrong.
    pub message: String,
    /// Remediation hint, usually taken from the error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (`E####`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// Create an error carrying a shared code and its remediation hint.
    pub fn coded(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            message: message.into(),
            suggestion: code.hint().map(ToString::to_string),
            error_code: Some(code.code().to_string()),
        }
    }

    /// Error with a hand-written hint instead of the code's default one.
    pub fn with_details(
        message: impl Into<String>,
        suggestion: impl Into<String>,
        error_code: ErrorCode,
    ) -> Self {
        Self {
            message: message.into(),
            suggestion: Some(suggestion.into()),
            error_code: Some(error_code.code().to_string()),
        }
    }
}

impl From<&watchkeep_duty::DutyError> for CliError {
    fn from(err: &watchkeep_duty::DutyError) -> Self {
        Self::coded(err.to_string(), err.code())
    }
}

impl From<&watchkeep_incident::IncidentError> for CliError {
    fn from(err: &watchkeep_incident::IncidentError) -> Self {
        Self::coded(err.to_string(), err.code())
    }
}

/// Print `value` on stdout: as JSON, or through `human_fn` for the text
/// and pretty modes alike.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    write_value(mode, value, &mut out, human_fn)
}

fn write_value<T: Serialize>(
    mode: OutputMode,
    value: &T,
    out: &mut dyn Write,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut *out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => human_fn(value, out)?,
    }
    Ok(())
}

/// Like [`render`], with separate renderers for text rows and pretty output.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Pretty => render(mode, value, pretty_fn),
        OutputMode::Text | OutputMode::Json => render(mode, value, text_fn),
    }
}

/// Print the error envelope on stderr.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let mut out = io::stderr().lock();
    write_error(mode, error, &mut out)
}

fn write_error(mode: OutputMode, error: &CliError, out: &mut dyn Write) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let envelope = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut *out, &envelope)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match error.error_code {
                Some(ref code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(hint) = &error.suggestion {
                writeln!(out, "  suggestion: {hint}")?;
            }
        }
    }
    Ok(())
}
