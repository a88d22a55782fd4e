//! Observable scan status for whatever surface sits on top of the controller.

use crate::emotion::EmotionLabel;
use crate::scan::ScanPhase;
use log::info;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Snapshot pushed after every tick and every track resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStatus {
    pub phase: ScanPhase,
    /// Raw label of the most recent frame.
    pub detected: Option<EmotionLabel>,
    /// Label decided by the window (or by a manual override).
    pub current: Option<EmotionLabel>,
    /// Name of the track last handed to the sink.
    pub playing: Option<String>,
    /// Short note about the last resolution, e.g. a fallback.
    pub note: Option<String>,
}

fn or_none<T: fmt::Display>(value: Option<&T>) -> String {
    value.map_or_else(|| "None".to_string(), ToString::to_string)
}

impl ScanStatus {
    #[must_use]
    pub fn detected_line(&self) -> String {
        format!("Detected emotion: `{}`", or_none(self.detected.as_ref()))
    }

    #[must_use]
    pub fn current_line(&self) -> String {
        format!("Current emotion: `{}`", or_none(self.current.as_ref()))
    }

    #[must_use]
    pub fn playing_line(&self) -> String {
        format!("Playing: `{}`", or_none(self.playing.as_ref()))
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | {} | {}",
            self.phase,
            self.detected_line(),
            self.current_line(),
            self.playing_line()
        )?;
        if let Some(note) = &self.note {
            write!(f, " ({note})")?;
        }
        Ok(())
    }
}

/// Receives status snapshots.
pub trait StatusReporter {
    fn report(&mut self, status: &ScanStatus);
}

type PrintedKey = (Option<EmotionLabel>, Option<String>, Option<String>);

/// Logs every snapshot and prints the ones that carry news.
#[derive(Debug, Default)]
pub struct LogReporter {
    last_printed: Option<PrintedKey>,
}

impl LogReporter {
    /// Whether `status` differs from the last printed one in what the
    /// listener sees: current emotion, track or note.
    fn is_news(&mut self, status: &ScanStatus) -> bool {
        let key = (status.current, status.playing.clone(), status.note.clone());
        if self.last_printed.as_ref() == Some(&key) {
            return false;
        }
        self.last_printed = Some(key);
        true
    }
}

impl StatusReporter for LogReporter {
    fn report(&mut self, status: &ScanStatus) {
        log::debug!("{status}");

        if self.is_news(status) {
            info!("{}", status.current_line());
            println!("{status}");
        }
    }
}

/// Keeps every snapshot in a shared buffer; used by tests and the simulator.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    history: Rc<RefCell<Vec<ScanStatus>>>,
}

impl RecordingReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the recorded snapshots.
    #[must_use]
    pub fn history(&self) -> Rc<RefCell<Vec<ScanStatus>>> {
        Rc::clone(&self.history)
    }

    #[must_use]
    pub fn last(&self) -> Option<ScanStatus> {
        self.history.borrow().last().cloned()
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&mut self, status: &ScanStatus) {
        self.history.borrow_mut().push(status.clone());
    }
}
