//! Music that follows the listener's face.
//!
//! Emotune classifies camera frames one at a time, stabilises the noisy
//! per-frame labels with a sliding-window vote, and once one emotion clearly
//! dominates plays a track for it: searched online first, taken from a local
//! library partitioned by emotion and age group when that fails.
//!
//! Core modules:
//! - [`window`] - Sliding-window majority vote over per-frame labels
//! - [`scan`] - Scan lifecycle, manual override and replay guard
//! - [`selector`] - Online search with local-library fallback
//! - [`emotion`] - Emotion labels, age bands and age groups
//!
//! ### Adapters
//!
//! - [`capture`] - Frame sources and classifiers backed by files or commands
//! - [`youtube`] - YouTube Data API search and HTTP downloads
//! - [`library`] - Filesystem track library
//! - [`playback`] - External player, HTML audio element, dry run
//! - [`status`] - Status lines for the terminal and for tests
//!
//! ### Supporting Modules
//!
//! - [`driver`] - Scan and watch loops on top of the controller
//! - [`config`] - Configuration file and data directory management
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use emotune::capture::{ScriptedClassifier, SyntheticFrames};
//! use emotune::emotion::EmotionLabel;
//! use emotune::library::FsLibrary;
//! use emotune::playback::NullSink;
//! use emotune::scan::{ControllerOptions, ScanController, TickOutcome};
//! use emotune::selector::{SelectorOptions, TrackSelector};
//! use emotune::status::LogReporter;
//! use emotune::youtube::{HttpFetcher, YouTubeSearch};
//! use std::path::Path;
//!
//! let selector = TrackSelector::new(
//!     Box::new(YouTubeSearch::new(None)?),
//!     Box::new(HttpFetcher::new()?),
//!     Box::new(FsLibrary::new(Path::new("music"))?),
//!     SelectorOptions::default(),
//! );
//! let mut controller = ScanController::new(
//!     Box::new(SyntheticFrames::new(30)),
//!     Box::new(ScriptedClassifier::new(vec![EmotionLabel::Happy; 30])),
//!     selector,
//!     Box::new(NullSink),
//!     Box::new(LogReporter::default()),
//!     ControllerOptions::default(),
//! );
//!
//! controller.start();
//! loop {
//!     match controller.tick() {
//!         TickOutcome::Decided { emotion, resolution } => {
//!             println!("{emotion}: {}", resolution.note());
//!             break;
//!         }
//!         TickOutcome::Pending { .. } => continue,
//!         _ => break,
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Stabilisation
//!
//! The window holds the last 50 labels. An emotion is trusted only once it
//! appears more than 25 times in that window, so a handful of misread frames
//! never flips the music. Ties between equally frequent labels go to the one
//! seen most recently.
//!
//! ## Error Handling
//!
//! Adapters return `anyhow::Result`. The controller and selector never fail:
//! collaborator errors are caught and turned into outcomes such as
//! [`scan::TickOutcome::DeviceFailed`] or [`selector::Resolution::Fallback`].

pub mod capture;
pub mod cli;
pub mod completion;
pub mod config;
pub mod driver;
pub mod emotion;
pub mod library;
pub mod playback;
pub mod scan;
pub mod selector;
pub mod status;
pub mod window;
pub mod youtube;
