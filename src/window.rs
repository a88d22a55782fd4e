//! # Emotion Window
//!
//! Fixed-capacity FIFO of recent per-frame labels with majority voting.
//!
//! A classifier flickers between labels from one frame to the next. The window
//! keeps the last `capacity` labels and only reports a decision once one label
//! holds strictly more than `min_support` of the slots. With the default
//! parameters (50 slots, support 25) that means a strict majority of a full
//! window, so at most one label can ever qualify.

use crate::emotion::EmotionLabel;
use std::collections::{HashMap, VecDeque};

/// Default number of labels kept.
pub const DEFAULT_CAPACITY: usize = 50;

/// Default count a label has to exceed before it is trusted.
pub const DEFAULT_MIN_SUPPORT: usize = 25;

/// Sliding window of per-frame emotion labels.
#[derive(Debug, Clone)]
pub struct EmotionWindow {
    labels: VecDeque<EmotionLabel>,
    capacity: usize,
    min_support: usize,
}

impl Default for EmotionWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_MIN_SUPPORT)
    }
}

impl EmotionWindow {
    /// A capacity of zero is bumped to one so `push` always keeps the newest label.
    #[must_use]
    pub fn new(capacity: usize, min_support: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            labels: VecDeque::with_capacity(capacity + 1),
            capacity,
            min_support,
        }
    }

    /// Append a label, evicting the oldest one once the window is full.
    ///
    /// `Unknown` is stored like any other label and can win the vote.
    pub fn push(&mut self, label: EmotionLabel) {
        self.labels.push_back(label);
        if self.labels.len() > self.capacity {
            self.labels.pop_front();
        }
    }

    /// The label currently holding the window, if any.
    ///
    /// Returns the label with the highest count, provided that count is
    /// strictly greater than `min_support`. When several labels share the
    /// highest count, the one seen most recently wins.
    #[must_use]
    pub fn decide(&self) -> Option<EmotionLabel> {
        let counts = self.counts();
        let best = counts.values().copied().max()?;
        if best <= self.min_support {
            return None;
        }

        // Newest-first scan meets each label at its latest position.
        self.labels
            .iter()
            .rev()
            .copied()
            .find(|label| counts.get(label) == Some(&best))
    }

    /// Drop every entry; used at the start of each scan.
    pub fn reset(&mut self) {
        self.labels.clear();
    }

    /// Occurrences of each label currently in the window.
    #[must_use]
    pub fn counts(&self) -> HashMap<EmotionLabel, usize> {
        let mut counts = HashMap::new();
        for label in &self.labels {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    #[must_use]
    pub fn count(&self, label: EmotionLabel) -> usize {
        self.labels.iter().filter(|l| **l == label).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn min_support(&self) -> usize {
        self.min_support
    }

    /// Labels from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &EmotionLabel> {
        self.labels.iter()
    }
}
