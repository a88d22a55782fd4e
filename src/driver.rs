//! # Scan Loops
//!
//! The controller only ever takes single steps. These loops are the
//! scheduler on top: [`run_scan`] ticks one scan to completion, and [`watch`]
//! keeps scanning with a cooldown in between, which is how the app behaves
//! when left running in front of a camera.

use crate::config::AppConfig;
use crate::emotion::EmotionLabel;
use crate::scan::{ScanController, ScanPhase, StartOutcome, TickOutcome};
use log::{debug, info, warn};
use std::fmt;
use std::thread;
use std::time::Duration;

/// Pacing of the loops.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub tick_interval: Duration,
    pub cooldown: Duration,
    /// Consecutive ticks without a frame before the source counts as drained.
    pub max_idle_ticks: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            cooldown: Duration::from_secs(5),
            max_idle_ticks: 50,
        }
    }
}

impl From<&AppConfig> for LoopSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            cooldown: Duration::from_millis(config.cooldown_ms),
            max_idle_ticks: config.max_idle_ticks.max(1),
        }
    }
}

/// How a scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEnd {
    /// A track was resolved (or found missing) for this emotion.
    Decided(EmotionLabel),
    /// The emotion was stable but its track was already playing.
    AlreadyPlaying(EmotionLabel),
    Cancelled,
    DeviceFailed(String),
    GaveUp(usize),
    /// The frame source stopped producing frames.
    SourceDrained,
}

impl ScanEnd {
    /// Whether another scan can follow.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ScanEnd::Cancelled | ScanEnd::DeviceFailed(_) | ScanEnd::SourceDrained
        )
    }
}

impl fmt::Display for ScanEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanEnd::Decided(emotion) => write!(f, "decided {emotion}"),
            ScanEnd::AlreadyPlaying(emotion) => write!(f, "{emotion} already playing"),
            ScanEnd::Cancelled => write!(f, "cancelled"),
            ScanEnd::DeviceFailed(e) => write!(f, "camera failed: {e}"),
            ScanEnd::GaveUp(frames) => write!(f, "no stable emotion after {frames} frames"),
            ScanEnd::SourceDrained => write!(f, "no more frames"),
        }
    }
}

/// Run one scan until it ends.
///
/// With `continue_after_decision` the scan only ends when the source drains,
/// the camera fails or it is cancelled; decisions along the way are played
/// as they happen.
pub fn run_scan(controller: &mut ScanController, settings: &LoopSettings) -> ScanEnd {
    if controller.start() == StartOutcome::AlreadyScanning {
        debug!("Joining scan already in progress");
    }

    let mut idle_ticks = 0;
    let mut last_decision = None;
    loop {
        match controller.tick() {
            TickOutcome::Pending { .. } => idle_ticks = 0,
            TickOutcome::NoFrame => {
                idle_ticks += 1;
                if idle_ticks >= settings.max_idle_ticks {
                    info!("No frames for {idle_ticks} ticks, ending scan");
                    controller.stop();
                    return last_decision.unwrap_or(ScanEnd::SourceDrained);
                }
            }
            TickOutcome::Decided { emotion, resolution } => {
                idle_ticks = 0;
                info!("{emotion}: {}", resolution.note());
                last_decision = Some(ScanEnd::Decided(emotion));
            }
            TickOutcome::AlreadyPlaying { emotion } => {
                idle_ticks = 0;
                if last_decision.is_none() {
                    last_decision = Some(ScanEnd::AlreadyPlaying(emotion));
                }
            }
            TickOutcome::Cancelled | TickOutcome::NotScanning => {
                return last_decision.unwrap_or(ScanEnd::Cancelled);
            }
            TickOutcome::DeviceFailed { error } => return ScanEnd::DeviceFailed(error),
            TickOutcome::GaveUp { frames } => return ScanEnd::GaveUp(frames),
        }

        if controller.phase() != ScanPhase::Scanning {
            if let Some(end) = last_decision.take() {
                return end;
            }
        }
        if !settings.tick_interval.is_zero() {
            thread::sleep(settings.tick_interval);
        }
    }
}

/// Scan repeatedly, resting between scans.
///
/// Stops after `max_scans` scans (unbounded when `None`) or as soon as a scan
/// ends in a way another scan cannot recover from.
pub fn watch(
    controller: &mut ScanController,
    settings: &LoopSettings,
    max_scans: Option<usize>,
) -> Vec<ScanEnd> {
    let mut ends = Vec::new();
    loop {
        let end = run_scan(controller, settings);
        info!("Scan {} ended: {end}", ends.len() + 1);
        let recoverable = end.is_recoverable();
        ends.push(end);

        if !recoverable {
            warn!("Stopping watch loop");
            break;
        }
        if max_scans.is_some_and(|max| ends.len() >= max) {
            break;
        }

        controller.cool_down();
        if !settings.cooldown.is_zero() {
            debug!("Cooling down for {:?}", settings.cooldown);
            thread::sleep(settings.cooldown);
        }
    }
    ends
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ScriptedClassifier, SyntheticFrames};
    use crate::playback::NullSink;
    use crate::scan::ControllerOptions;
    use crate::selector::tests::{FakeFetcher, FakeLibrary, FakeSearch};
    use crate::selector::{SelectorOptions, TrackSelector};
    use crate::status::RecordingReporter;
    use std::cell::Cell;
    use std::rc::Rc;
    use EmotionLabel::*;

    fn fast() -> LoopSettings {
        LoopSettings {
            tick_interval: Duration::ZERO,
            cooldown: Duration::ZERO,
            max_idle_ticks: 1,
        }
    }

    fn controller(labels: Vec<EmotionLabel>, options: ControllerOptions) -> ScanController {
        let frames = SyntheticFrames::new(labels.len());
        let selector = TrackSelector::new(
            Box::new(FakeSearch {
                hits: None,
                calls: Rc::new(Cell::new(0)),
            }),
            Box::new(FakeFetcher { fail: false }),
            Box::new(FakeLibrary::default()),
            SelectorOptions::default(),
        );
        ScanController::new(
            Box::new(frames),
            Box::new(ScriptedClassifier::new(labels)),
            selector,
            Box::new(NullSink),
            Box::new(RecordingReporter::new()),
            options,
        )
    }

    fn repeat(label: EmotionLabel, times: usize) -> Vec<EmotionLabel> {
        vec![label; times]
    }

    #[test]
    fn test_run_scan_decides() {
        let mut controller = controller(repeat(Happy, 40), ControllerOptions::default());
        assert_eq!(run_scan(&mut controller, &fast()), ScanEnd::Decided(Happy));
        assert_eq!(controller.phase(), ScanPhase::Idle);
    }

    #[test]
    fn test_run_scan_drains_without_decision() {
        let mut controller = controller(repeat(Sad, 10), ControllerOptions::default());
        assert_eq!(run_scan(&mut controller, &fast()), ScanEnd::SourceDrained);
        assert_eq!(controller.phase(), ScanPhase::Idle);
    }

    #[test]
    fn test_run_scan_gives_up() {
        let options = ControllerOptions {
            max_frames: Some(5),
            ..ControllerOptions::default()
        };
        let mut controller = controller(repeat(Neutral, 20), options);
        assert_eq!(run_scan(&mut controller, &fast()), ScanEnd::GaveUp(5));
    }

    #[test]
    fn test_continuous_scan_reports_last_decision() {
        let options = ControllerOptions {
            continue_after_decision: true,
            ..ControllerOptions::default()
        };
        let mut labels = repeat(Happy, 30);
        labels.extend(repeat(Angry, 40));
        let mut controller = controller(labels, options);

        assert_eq!(run_scan(&mut controller, &fast()), ScanEnd::Decided(Angry));
        assert_eq!(controller.session().decisions, 2);
    }

    #[test]
    fn test_watch_runs_several_scans() {
        let mut labels = repeat(Fear, 26);
        labels.extend(repeat(Fear, 26));
        labels.extend(repeat(Surprise, 26));
        let mut controller = controller(labels, ControllerOptions::default());

        let ends = watch(&mut controller, &fast(), Some(3));
        assert_eq!(
            ends,
            vec![
                ScanEnd::Decided(Fear),
                ScanEnd::AlreadyPlaying(Fear),
                ScanEnd::Decided(Surprise),
            ]
        );
    }

    #[test]
    fn test_watch_stops_when_source_drains() {
        let mut controller = controller(repeat(Happy, 26), ControllerOptions::default());
        let ends = watch(&mut controller, &fast(), None);
        assert_eq!(ends, vec![ScanEnd::Decided(Happy), ScanEnd::SourceDrained]);
    }

    #[test]
    fn test_cancelled_scan_is_not_recoverable() {
        assert!(!ScanEnd::Cancelled.is_recoverable());
        assert!(ScanEnd::GaveUp(3).is_recoverable());
        assert!(ScanEnd::AlreadyPlaying(Sad).is_recoverable());
    }
}
