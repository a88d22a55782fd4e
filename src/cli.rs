//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for Emotune using Clap derive
//! macros. It provides a type-safe way to parse command-line arguments and route
//! them to the scan loops, the manual override and the library tools.
//!
//! ## Commands
//!
//! - `scan`: Run one scan and play a track for the stable emotion
//! - `watch`: Keep scanning, resting between scans
//! - `simulate`: Replay a label script through the scan controller
//! - `play`: Pick an emotion by hand and play a track for it
//! - `library`: Inspect or create the local library folders
//! - `config`: Show or write the configuration file
//!
//! ## Examples
//!
//! ```bash
//! emotune scan --capture --age 10-15
//! emotune watch --frames /tmp/frames --scans 3
//! emotune play sad --offline
//! ```

use crate::emotion::{AgeBand, EmotionLabel};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
///
/// The main structure contains an optional config override and a subcommand;
/// all functionality is accessed through specific commands.
#[derive(Parser, Debug)]
#[command(name = "emotune")]
#[command(about = "Emotune: music that follows the listener's face")]
#[command(version)]
pub struct Args {
    /// Use this config file instead of the platform default
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Where frames come from and where audio goes, shared by `scan` and `watch`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Read frames from image files dropped into this directory
    ///
    /// Files are consumed in name order; new files are picked up as they
    /// appear.
    #[arg(long, value_name = "DIR", conflicts_with = "capture")]
    pub frames: Option<PathBuf>,

    /// Grab frames with the configured capture command (the default)
    #[arg(long)]
    pub capture: bool,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Write an autoplaying HTML audio element here instead of running the player
    #[arg(long, value_name = "FILE")]
    pub html: Option<PathBuf>,

    /// Path to the local library (overrides the config file)
    #[arg(long, value_name = "DIR")]
    pub library: Option<PathBuf>,
}

/// How tracks are picked.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Listener age band, e.g. 6-10 or 15-20
    #[arg(long, value_name = "BAND")]
    pub age: Option<AgeBand>,

    /// Skip the online search and use only the local library
    #[arg(long)]
    pub offline: bool,
}

/// Enumeration of all available subcommands.
///
/// Each variant corresponds to a major piece of functionality in Emotune.
/// Command arguments are embedded directly in the enum variants for
/// type safety and automatic validation.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one scan and play a track for the detected emotion
    ///
    /// Frames are classified one by one into a sliding window. Once one
    /// emotion holds a clear majority, a track for it is searched online
    /// (or taken from the local library) and played, and the scan ends.
    Scan {
        #[command(flatten)]
        args: ScanArgs,
    },

    /// Scan continuously, resting between scans
    ///
    /// Repeats the scan cycle with a cooldown in between. The same emotion is
    /// not played twice in a row. Stops when the camera fails, the frame
    /// source runs dry, or after the requested number of scans.
    Watch {
        #[command(flatten)]
        args: ScanArgs,

        /// Stop after this many scans
        #[arg(long, value_name = "N")]
        scans: Option<usize>,
    },

    /// Replay a label script through the scanner
    ///
    /// Each line of the script is one classifier result; `label*N` repeats a
    /// label. Nothing is played; the decision and the track that would have
    /// been chosen are printed. Useful for tuning window size and support.
    Simulate {
        /// Label script to replay
        #[arg(long, value_name = "FILE")]
        labels: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Path to the local library (overrides the config file)
        #[arg(long, value_name = "DIR")]
        library: Option<PathBuf>,
    },

    /// Play a track for an emotion picked by hand
    ///
    /// Skips detection entirely. Always plays, even if the same emotion
    /// played last.
    Play {
        /// Emotion to play for
        #[arg(value_enum)]
        emotion: EmotionLabel,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Write an autoplaying HTML audio element here instead of running the player
        #[arg(long, value_name = "FILE")]
        html: Option<PathBuf>,

        /// Path to the local library (overrides the config file)
        #[arg(long, value_name = "DIR")]
        library: Option<PathBuf>,
    },

    /// Inspect or prepare the local fallback library
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },

    /// Show or write the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    ///
    /// Usage: emotune completion bash > ~/.local/share/bash-completion/completions/emotune
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Local library actions
#[derive(Subcommand, Debug)]
pub enum LibraryAction {
    /// Show how many tracks each emotion and age group has
    List {
        /// Library root (defaults to the configured one)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Create an empty folder for every emotion and age group
    Init {
        /// Library root (defaults to the configured one)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
}

/// Configuration file actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,

    /// Write the default configuration file
    ///
    /// Refuses to overwrite an existing file unless `--force` is given.
    Init {
        #[arg(long)]
        force: bool,
    },
}
