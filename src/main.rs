//! # Emotune
//!
//! Command-line front end: loads the configuration, wires the adapters into a
//! scan controller and routes each subcommand.
//!
//! ## Usage
//!
//! ```bash
//! # One scan from the webcam, local library only
//! emotune scan --offline
//!
//! # Keep following the listener, three scans
//! emotune watch --age 10-15 --scans 3
//!
//! # Play for an emotion picked by hand
//! emotune play happy
//! ```

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use emotune::capture::{
    CommandClassifier, CommandFrameSource, DirectoryFrameSource, ScriptedClassifier,
    SyntheticFrames,
};
use emotune::cli::{self, ConfigAction, LibraryAction, ScanArgs, SelectionArgs};
use emotune::completion;
use emotune::config::{self, AppConfig};
use emotune::driver::{self, LoopSettings, ScanEnd};
use emotune::emotion::EmotionLabel;
use emotune::library::FsLibrary;
use emotune::playback::{CommandPlayer, HtmlAudioSink, NullSink, PlaybackSink};
use emotune::scan::{FrameSource, OverrideOutcome, ScanController};
use emotune::selector::TrackSelector;
use emotune::status::LogReporter;
use emotune::youtube::{HttpFetcher, YouTubeSearch};
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn library_dir(config: &AppConfig, override_dir: Option<PathBuf>) -> PathBuf {
    override_dir.unwrap_or_else(|| config.library_dir.clone())
}

fn build_selector(
    config: &AppConfig,
    selection: &SelectionArgs,
    library: &Path,
) -> Result<TrackSelector> {
    let api_key = YouTubeSearch::resolve_api_key(config.youtube_api_key.as_deref());
    if api_key.is_none() && !selection.offline {
        info!("No YouTube API key found, tracks will come from {}", library.display());
    }

    Ok(TrackSelector::new(
        Box::new(YouTubeSearch::new(api_key)?),
        Box::new(HttpFetcher::new()?),
        Box::new(FsLibrary::new(library)?),
        config.selector_options(selection.offline),
    ))
}

fn build_sink(config: &AppConfig, html: Option<PathBuf>) -> Result<Box<dyn PlaybackSink>> {
    let sink: Box<dyn PlaybackSink> = match html {
        Some(path) => Box::new(HtmlAudioSink::new(path)),
        None => Box::new(CommandPlayer::from_command_line(&config.player_command)?),
    };
    Ok(sink)
}

fn build_frames(config: &AppConfig, args: &ScanArgs) -> Result<Box<dyn FrameSource>> {
    let frames: Box<dyn FrameSource> = match &args.frames {
        Some(dir) => {
            info!("Reading frames from {}", dir.display());
            Box::new(DirectoryFrameSource::new(dir))
        }
        None => Box::new(CommandFrameSource::new(
            &config.capture_command,
            config.max_capture_failures,
        )?),
    };
    Ok(frames)
}

fn build_scan_controller(config: &AppConfig, args: ScanArgs) -> Result<ScanController> {
    let frames = build_frames(config, &args)?;
    let classifier = CommandClassifier::new(&config.classifier_command)?;
    let library = library_dir(config, args.library);
    let selector = build_selector(config, &args.selection, &library)?;
    let sink = build_sink(config, args.html)?;

    Ok(ScanController::new(
        frames,
        Box::new(classifier),
        selector,
        sink,
        Box::new(LogReporter::default()),
        config.controller_options(args.selection.age),
    ))
}

fn print_ends(ends: &[ScanEnd]) {
    for (number, end) in ends.iter().enumerate() {
        println!("Scan {}: {end}", number + 1);
    }
}

/// Main entry point for the Emotune application.
///
/// Initializes logging, loads the configuration, parses command-line
/// arguments, and routes commands to the library. All operations return
/// Results for consistent error handling throughout the application.
///
/// # Logging
///
/// Initializes environment logger which can be controlled via `RUST_LOG`:
/// - `RUST_LOG=debug emotune scan` - Enable debug logging
/// - `RUST_LOG=emotune::scan=debug emotune watch` - Per-frame votes only
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => config::get_config_path()?,
    };
    let config = AppConfig::load(&config_path)?;
    debug!("Effective config: {config:?}");

    match args.command {
        cli::Command::Scan { args } => {
            let mut controller = build_scan_controller(&config, args)?;
            let end = driver::run_scan(&mut controller, &LoopSettings::from(&config));
            println!("Scan ended: {end}");
            if let ScanEnd::DeviceFailed(error) = end {
                bail!("Camera unavailable: {error}");
            }
            controller.wait_for_playback()?;
        }
        cli::Command::Watch { args, scans } => {
            let mut controller = build_scan_controller(&config, args)?;
            let ends = driver::watch(&mut controller, &LoopSettings::from(&config), scans);
            print_ends(&ends);
            if let Some(ScanEnd::DeviceFailed(error)) = ends.last() {
                bail!("Camera unavailable: {error}");
            }
            controller.wait_for_playback()?;
        }
        cli::Command::Simulate {
            labels,
            selection,
            library,
        } => {
            let classifier = ScriptedClassifier::from_file(&labels)?;
            info!("Replaying {} labels from {}", classifier.len(), labels.display());
            let frames = SyntheticFrames::new(classifier.len());
            let library = library_dir(&config, library);

            let mut controller = ScanController::new(
                Box::new(frames),
                Box::new(classifier),
                build_selector(&config, &selection, &library)?,
                Box::new(NullSink),
                Box::new(LogReporter::default()),
                config.controller_options(selection.age),
            );
            let settings = LoopSettings {
                tick_interval: Duration::ZERO,
                cooldown: Duration::ZERO,
                max_idle_ticks: 1,
            };
            let ends = driver::watch(&mut controller, &settings, None);
            print_ends(&ends);
            println!(
                "{} decisions over {} scans",
                controller.session().decisions,
                ends.len()
            );
        }
        cli::Command::Play {
            emotion,
            selection,
            html,
            library,
        } => {
            let library = library_dir(&config, library);
            let mut controller = ScanController::new(
                Box::new(SyntheticFrames::new(0)),
                Box::new(ScriptedClassifier::default()),
                build_selector(&config, &selection, &library)?,
                build_sink(&config, html)?,
                Box::new(LogReporter::default()),
                config.controller_options(selection.age),
            );
            play_override(&mut controller, emotion)?;
        }
        cli::Command::Library { action } => match action {
            LibraryAction::List { dir } => {
                let library = FsLibrary::new(&library_dir(&config, dir))?;
                println!("Library: {}", library.root().display());
                for partition in library.summary(&config.age_groups.groups()) {
                    println!(
                        "  {:<9} {:<8} {:>4} tracks",
                        partition.emotion.as_str(),
                        partition.group.as_str(),
                        partition.tracks
                    );
                }
            }
            LibraryAction::Init { dir } => {
                let library = FsLibrary::new(&library_dir(&config, dir))?;
                let created = library.init_tree(&config.age_groups.groups())?;
                for path in &created {
                    println!("Created {}", path.display());
                }
                println!(
                    "{} folders created under {}",
                    created.len(),
                    library.root().display()
                );
            }
        },
        cli::Command::Config { action } => match action {
            ConfigAction::Show => {
                println!("# {}", config_path.display());
                println!(
                    "{}",
                    serde_json::to_string_pretty(&config).context("Failed to serialize config")?
                );
            }
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    bail!(
                        "Config file {} already exists (use --force to overwrite)",
                        config_path.display()
                    );
                }
                AppConfig::default().save(&config_path)?;
                println!("Wrote {}", config_path.display());
            }
        },
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(
                completion::shell_to_completion_shell(shell),
                &mut cmd,
                &mut io::stdout(),
            );
        }
    }

    Ok(())
}

fn play_override(controller: &mut ScanController, emotion: EmotionLabel) -> Result<()> {
    match controller.override_emotion(emotion) {
        OverrideOutcome::Applied { resolution, .. } => {
            println!("{emotion}: {}", resolution.note());
            if resolution.track().is_some() {
                controller.wait_for_playback()?;
            }
            Ok(())
        }
        OverrideOutcome::Disabled => {
            bail!("Manual emotion selection is disabled (set `manual_override` in the config file)")
        }
        OverrideOutcome::Rejected { phase } => bail!("Cannot pick an emotion while {phase}"),
    }
}
