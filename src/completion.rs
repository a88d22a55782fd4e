//! # Shell Completion Module
//!
//! Completion scripts for the `emotune` command, generated by clap.
//!
//! ```bash
//! emotune completion bash > ~/.local/share/bash-completion/completions/emotune
//! emotune completion zsh > ~/.config/zsh/completions/_emotune
//! emotune completion fish > ~/.config/fish/completions/emotune.fish
//! ```

use crate::cli::Shell;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io::Write;

/// Write the completion script for `cmd` to `out`.
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command, out: &mut dyn Write) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, out);
}

/// Convert our CLI Shell enum to clap_complete Shell
pub fn shell_to_completion_shell(shell: Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}
