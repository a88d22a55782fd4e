//! # Scan Controller
//!
//! Owns the scan lifecycle and everything a scan accumulates.
//!
//! ```text
//!            start()                decide() = Some        resolve + play
//!   Idle ───────────────▶ Scanning ───────────────▶ Deciding ──────────────▶ Idle
//!    ▲  ▲                   │  ▲                                             │
//!    │  └── stop()/cancel ──┘  └──── (continue_after_decision) ◀─────────────┘
//!    └──────────── device failure / max_frames reached
//! ```
//!
//! A manual override jumps from `Idle`/`Scanning` straight to `Deciding` with
//! the chosen label. `Cooldown` is a resting phase used by the watch loop
//! between scans; it behaves like `Idle` for every command.
//!
//! The controller is driven from outside: every call is a single synchronous
//! step, and nothing runs in the background.

use crate::emotion::{AgeBand, EmotionLabel};
use crate::playback::PlaybackSink;
use crate::selector::{Resolution, TrackSelector};
use crate::status::{ScanStatus, StatusReporter};
use crate::window::{EmotionWindow, DEFAULT_CAPACITY, DEFAULT_MIN_SUPPORT};
use anyhow::Result;
use log::{debug, error, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One captured image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position in the capture stream.
    pub index: u64,
    /// File holding the image, when the source wrote one.
    pub path: Option<PathBuf>,
    /// Encoded image bytes; may be empty when `path` is set.
    pub bytes: Vec<u8>,
}

/// Supplies frames on demand.
pub trait FrameSource {
    /// `Ok(None)` means no frame right now; the caller retries on a later tick.
    ///
    /// # Errors
    ///
    /// The capture device is unusable. This aborts the current scan.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Maps a frame to its most likely emotion.
pub trait EmotionClassifier {
    /// # Errors
    ///
    /// Any inference failure. The controller records the frame as `Unknown`.
    fn infer(&mut self, frame: &Frame) -> Result<EmotionLabel>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanPhase {
    Idle,
    Scanning,
    Deciding,
    Cooldown,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Scanning => "scanning",
            ScanPhase::Deciding => "deciding",
            ScanPhase::Cooldown => "cooldown",
        };
        f.write_str(name)
    }
}

/// State of the scan in progress, plus what is currently playing.
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub phase: ScanPhase,
    pub window: EmotionWindow,
    /// Raw label of the latest frame.
    pub last_detected: Option<EmotionLabel>,
    /// Label decided during this scan.
    pub decided: Option<EmotionLabel>,
    /// Emotion resolved during this scan, whether or not anything played.
    pub resolved: Option<EmotionLabel>,
    /// Emotion whose track was last handed to the sink. Survives scans.
    pub last_played: Option<EmotionLabel>,
    /// Name of the track last handed to the sink.
    pub playing: Option<String>,
    /// Frames examined in this scan.
    pub frames_seen: usize,
    /// Entries into `Deciding` over the controller's lifetime.
    pub decisions: usize,
    pub note: Option<String>,
}

impl ScanSession {
    fn new(window: EmotionWindow) -> Self {
        Self {
            phase: ScanPhase::Idle,
            window,
            last_detected: None,
            decided: None,
            resolved: None,
            last_played: None,
            playing: None,
            frames_seen: 0,
            decisions: 0,
            note: None,
        }
    }

    /// Fresh window and counters; playback memory is kept.
    fn begin(&mut self) {
        self.window.reset();
        self.last_detected = None;
        self.decided = None;
        self.resolved = None;
        self.frames_seen = 0;
        self.note = None;
        self.phase = ScanPhase::Scanning;
    }

    /// Back to `Idle`, dropping anything not yet acted on.
    fn abort(&mut self) {
        self.window.reset();
        self.frames_seen = 0;
        self.phase = ScanPhase::Idle;
    }

    #[must_use]
    pub fn status(&self) -> ScanStatus {
        ScanStatus {
            phase: self.phase,
            detected: self.last_detected,
            current: self.decided,
            playing: self.playing.clone(),
            note: self.note.clone(),
        }
    }
}

/// Controller behaviour switches.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub window_capacity: usize,
    pub min_support: usize,
    /// Accept emotions picked by the listener.
    pub manual_override: bool,
    /// Keep scanning after a decision; the replay guard then suppresses
    /// repeated playback of the same emotion.
    pub continue_after_decision: bool,
    /// Give up a scan after this many frames without a decision.
    pub max_frames: Option<usize>,
    pub age_band: AgeBand,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_CAPACITY,
            min_support: DEFAULT_MIN_SUPPORT,
            manual_override: true,
            continue_after_decision: false,
            max_frames: None,
            age_band: AgeBand::new("6-10"),
        }
    }
}

/// Thread-safe flag that asks the controller to stop at its next tick.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A scan is already running; its window is left untouched.
    AlreadyScanning,
}

/// Result of a single [`ScanController::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No scan running.
    NotScanning,
    /// A pending cancel was honoured.
    Cancelled,
    /// The source had no frame; nothing changed.
    NoFrame,
    /// Frame classified, no stable emotion yet.
    Pending { detected: EmotionLabel },
    /// Stable emotion reached and a track was resolved for it.
    Decided {
        emotion: EmotionLabel,
        resolution: Resolution,
    },
    /// Stable emotion reached, but its track is already playing or this scan
    /// already resolved it.
    AlreadyPlaying { emotion: EmotionLabel },
    /// The capture device failed; scan aborted without a decision.
    DeviceFailed { error: String },
    /// `max_frames` reached without a decision.
    GaveUp { frames: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideOutcome {
    Applied {
        emotion: EmotionLabel,
        resolution: Resolution,
    },
    /// Manual selection is switched off.
    Disabled,
    /// Not accepted in the current phase.
    Rejected { phase: ScanPhase },
}

/// Drives frames through the classifier and window and plays the result.
pub struct ScanController {
    frames: Box<dyn FrameSource>,
    classifier: Box<dyn EmotionClassifier>,
    selector: TrackSelector,
    sink: Box<dyn PlaybackSink>,
    reporter: Box<dyn StatusReporter>,
    session: ScanSession,
    options: ControllerOptions,
    cancel: CancelToken,
}

impl ScanController {
    pub fn new(
        frames: Box<dyn FrameSource>,
        classifier: Box<dyn EmotionClassifier>,
        selector: TrackSelector,
        sink: Box<dyn PlaybackSink>,
        reporter: Box<dyn StatusReporter>,
        options: ControllerOptions,
    ) -> Self {
        let window = EmotionWindow::new(options.window_capacity, options.min_support);
        Self {
            frames,
            classifier,
            selector,
            sink,
            reporter,
            session: ScanSession::new(window),
            options,
            cancel: CancelToken::default(),
        }
    }

    #[must_use]
    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    #[must_use]
    pub fn phase(&self) -> ScanPhase {
        self.session.phase
    }

    #[must_use]
    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    #[must_use]
    pub fn status(&self) -> ScanStatus {
        self.session.status()
    }

    /// Token another thread can use to cancel the running scan.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn set_age_band(&mut self, band: AgeBand) {
        info!("Age band set to {band}");
        self.options.age_band = band;
    }

    /// Begin a new scan.
    ///
    /// Calling this while a scan is running keeps the current window; no
    /// frames already collected are lost.
    pub fn start(&mut self) -> StartOutcome {
        if self.session.phase == ScanPhase::Scanning {
            debug!("Start ignored: scan already running");
            return StartOutcome::AlreadyScanning;
        }

        // A cancel left over from a previous scan must not kill this one.
        self.cancel.take();
        self.session.begin();
        info!(
            "Scan started (window {}, support > {})",
            self.session.window.capacity(),
            self.session.window.min_support()
        );
        self.report();
        StartOutcome::Started
    }

    /// Process one frame.
    pub fn tick(&mut self) -> TickOutcome {
        if self.cancel.take() {
            self.stop();
            return TickOutcome::Cancelled;
        }
        if self.session.phase != ScanPhase::Scanning {
            return TickOutcome::NotScanning;
        }

        let frame = match self.frames.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("No frame available yet");
                return TickOutcome::NoFrame;
            }
            Err(e) => {
                error!("Camera unavailable, aborting scan: {e:#}");
                self.session.abort();
                self.session.note = Some(format!("camera unavailable: {e}"));
                self.report();
                return TickOutcome::DeviceFailed {
                    error: format!("{e:#}"),
                };
            }
        };

        let detected = match self.classifier.infer(&frame) {
            Ok(label) => label,
            Err(e) => {
                warn!("Classifier failed on frame {}: {e:#}", frame.index);
                EmotionLabel::Unknown
            }
        };
        self.session.frames_seen += 1;
        self.session.last_detected = Some(detected);
        self.session.window.push(detected);
        debug!(
            "Frame {}: {detected} ({} of {} in window)",
            frame.index,
            self.session.window.count(detected),
            self.session.window.len()
        );

        if let Some(emotion) = self.session.window.decide() {
            return self.on_decision(emotion);
        }

        if let Some(max) = self.options.max_frames {
            if self.session.frames_seen >= max {
                let frames = self.session.frames_seen;
                warn!("No stable emotion after {frames} frames, giving up");
                self.session.abort();
                self.session.note = Some(format!("no stable emotion after {frames} frames"));
                self.report();
                return TickOutcome::GaveUp { frames };
            }
        }

        self.report();
        TickOutcome::Pending { detected }
    }

    /// Play for a listener-chosen emotion, skipping detection entirely.
    ///
    /// Unlike a detected emotion, an explicit choice always plays, even when
    /// the same emotion is already playing.
    pub fn override_emotion(&mut self, emotion: EmotionLabel) -> OverrideOutcome {
        if !self.options.manual_override {
            warn!("Manual emotion selection is disabled");
            return OverrideOutcome::Disabled;
        }
        if self.session.phase == ScanPhase::Deciding {
            return OverrideOutcome::Rejected {
                phase: self.session.phase,
            };
        }

        info!("Manual override: {emotion}");
        self.session.window.reset();
        self.session.last_detected = None;
        let resolution = self.resolve_and_play(emotion);
        self.finish(true);
        OverrideOutcome::Applied { emotion, resolution }
    }

    /// Abort right away from any phase, dropping the window and any
    /// decision not yet acted on. Audio already playing is left alone.
    pub fn stop(&mut self) {
        if self.session.phase != ScanPhase::Idle {
            info!("Scan stopped during {}", self.session.phase);
        }
        self.session.abort();
        self.session.decided = None;
        self.report();
    }

    /// Ask the running scan to stop at the top of the next tick.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    /// Rest between scans. Only valid from `Idle`.
    pub fn cool_down(&mut self) -> bool {
        if self.session.phase != ScanPhase::Idle {
            return false;
        }
        self.session.phase = ScanPhase::Cooldown;
        self.report();
        true
    }

    /// Stop the sink. Not part of a scan; exposed for shutdown paths.
    ///
    /// # Errors
    ///
    /// Whatever the sink reports.
    pub fn stop_playback(&mut self) -> Result<()> {
        self.session.playing = None;
        self.sink.stop()
    }

    /// Block until the sink has finished the current track.
    ///
    /// # Errors
    ///
    /// Whatever the sink reports.
    pub fn wait_for_playback(&mut self) -> Result<()> {
        self.sink.wait()?;
        self.session.playing = None;
        Ok(())
    }

    fn on_decision(&mut self, emotion: EmotionLabel) -> TickOutcome {
        self.session.decided = Some(emotion);

        if self.session.last_played == Some(emotion) {
            info!("Stable emotion {emotion} is already playing");
        } else if self.session.resolved == Some(emotion) {
            debug!("Stable emotion {emotion} already resolved in this scan");
        } else {
            let resolution = self.resolve_and_play(emotion);
            self.finish(false);
            return TickOutcome::Decided { emotion, resolution };
        }

        self.finish(false);
        self.report();
        TickOutcome::AlreadyPlaying { emotion }
    }

    /// Enter `Deciding`, resolve a track and hand it to the sink.
    fn resolve_and_play(&mut self, emotion: EmotionLabel) -> Resolution {
        self.session.decided = Some(emotion);
        self.session.phase = ScanPhase::Deciding;
        self.session.decisions += 1;
        info!(
            "Decided emotion {emotion} after {} frames",
            self.session.frames_seen
        );
        self.report();

        let resolution = self.selector.resolve(emotion, &self.options.age_band);
        if let Some(track) = resolution.track() {
            match self.sink.play(track) {
                Ok(()) => {
                    self.session.playing = Some(track.name());
                    self.session.last_played = Some(emotion);
                }
                Err(e) => {
                    error!("Playback of '{}' failed: {e:#}", track.name());
                }
            }
        }
        self.session.resolved = Some(emotion);
        self.session.note = Some(resolution.note());
        self.report();
        resolution
    }

    /// Leave `Deciding` once the decision has been consumed.
    fn finish(&mut self, forced: bool) {
        if self.options.continue_after_decision && !forced {
            self.session.phase = ScanPhase::Scanning;
        } else {
            self.session.window.reset();
            self.session.phase = ScanPhase::Idle;
        }
    }

    fn report(&mut self) {
        let status = self.session.status();
        self.reporter.report(&status);
    }
}
