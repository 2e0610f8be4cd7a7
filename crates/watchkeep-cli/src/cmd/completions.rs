//! `wk completions`: shell completion scripts for every `wk` subcommand.

use anyhow::Result;
use clap::Args;
use clap_complete::{Shell, generate};
use std::io::Write;

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to emit a script for (bash, zsh, fish, elvish, powershell).
    #[arg(value_enum)]
    pub shell: Shell,
}

fn write_completions(shell: Shell, command: &mut clap::Command, out: &mut dyn Write) {
    generate(shell, command, "wk", out);
}

/// Print the script on stdout, ready to source or drop into the shell's
/// completion directory.
///
/// # Errors
///
/// Infallible; returns `Result` like every other runner so `main` can
/// dispatch uniformly.
pub fn run_completions(shell: Shell, command: &mut clap::Command) -> Result<()> {
    write_completions(shell, command, &mut std::io::stdout().lock());
    Ok(())
}
