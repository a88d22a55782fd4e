//! # Emotion Labels and Age Bands
//!
//! The closed vocabulary shared by every other module: the emotions a
//! classifier may report and the age bands a listener may pick.
//!
//! Age bands are never interpreted numerically. They are mapped onto a coarse
//! [`AgeGroup`] through a configurable [`AgeGroups`] table, and that group
//! partitions both the online query and the local library.

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Emotion reported for a single frame, or decided for a whole scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Happy,
    Sad,
    Angry,
    Surprise,
    Neutral,
    Fear,
    #[value(skip)]
    Unknown,
}

impl EmotionLabel {
    /// Every label, in declaration order.
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Surprise,
        EmotionLabel::Neutral,
        EmotionLabel::Fear,
        EmotionLabel::Unknown,
    ];

    /// Labels that can be chosen by a listener or that own a library folder.
    pub const PLAYABLE: [EmotionLabel; 6] = [
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Surprise,
        EmotionLabel::Neutral,
        EmotionLabel::Fear,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Unknown => "unknown",
        }
    }

    /// Lenient conversion of raw classifier output.
    ///
    /// Classifiers speak a slightly larger vocabulary (`disgust`, `N/A`, empty
    /// lines). Anything outside the closed set collapses to `Unknown` so one
    /// odd frame can never abort a scan.
    #[must_use]
    pub fn from_classifier(raw: &str) -> Self {
        raw.parse().unwrap_or(EmotionLabel::Unknown)
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        EmotionLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == needle)
            .ok_or_else(|| anyhow!("Unrecognised emotion label: '{}'", s.trim()))
    }
}

/// Age band picked by the listener, e.g. `"6-10"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgeBand(String);

impl AgeBand {
    pub fn new(band: impl Into<String>) -> Self {
        Self(band.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AgeBand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let band = s.trim();
        if band.is_empty() {
            return Err(anyhow!("Age band must not be empty"));
        }
        Ok(Self(band.to_string()))
    }
}

/// Coarse age group used to partition content, e.g. `"kids"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgeGroup(String);

impl AgeGroup {
    pub fn new(group: impl Into<String>) -> Self {
        Self(group.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mapping from age band to age group.
///
/// Bands missing from the table map to the fallback group, so a typo in a
/// band degrades to the default content set instead of failing the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeGroups {
    pub bands: BTreeMap<String, AgeGroup>,
    pub fallback: AgeGroup,
}

impl Default for AgeGroups {
    fn default() -> Self {
        let kids = AgeGroup::new("kids");
        let teens = AgeGroup::new("teens");
        let bands = [
            ("3-5", kids.clone()),
            ("6-10", kids.clone()),
            ("10-15", teens.clone()),
            ("15-20", teens),
        ]
        .into_iter()
        .map(|(band, group)| (band.to_string(), group))
        .collect();

        Self { bands, fallback: kids }
    }
}

impl AgeGroups {
    #[must_use]
    pub fn group_for(&self, band: &AgeBand) -> &AgeGroup {
        self.bands.get(band.as_str()).unwrap_or(&self.fallback)
    }

    /// Distinct groups in the table, fallback included.
    #[must_use]
    pub fn groups(&self) -> Vec<AgeGroup> {
        let mut groups: Vec<AgeGroup> = self.bands.values().cloned().collect();
        groups.push(self.fallback.clone());
        groups.sort();
        groups.dedup();
        groups
    }

    /// Known bands, in table order.
    #[must_use]
    pub fn bands(&self) -> Vec<AgeBand> {
        self.bands.keys().map(AgeBand::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parsing_is_case_insensitive() {
        assert_eq!("Happy".parse::<EmotionLabel>().unwrap(), EmotionLabel::Happy);
        assert_eq!(" SAD\n".parse::<EmotionLabel>().unwrap(), EmotionLabel::Sad);
        assert!("disgust".parse::<EmotionLabel>().is_err());
    }

    #[test]
    fn test_classifier_output_outside_vocabulary_is_unknown() {
        assert_eq!(EmotionLabel::from_classifier("disgust"), EmotionLabel::Unknown);
        assert_eq!(EmotionLabel::from_classifier("N/A"), EmotionLabel::Unknown);
        assert_eq!(EmotionLabel::from_classifier(""), EmotionLabel::Unknown);
        assert_eq!(EmotionLabel::from_classifier("surprise"), EmotionLabel::Surprise);
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for label in EmotionLabel::ALL {
            assert_eq!(label.to_string().parse::<EmotionLabel>().unwrap(), label);
        }
    }

    #[test]
    fn test_default_age_groups() {
        let groups = AgeGroups::default();
        assert_eq!(groups.group_for(&AgeBand::new("3-5")).as_str(), "kids");
        assert_eq!(groups.group_for(&AgeBand::new("6-10")).as_str(), "kids");
        assert_eq!(groups.group_for(&AgeBand::new("10-15")).as_str(), "teens");
        assert_eq!(groups.group_for(&AgeBand::new("15-20")).as_str(), "teens");
        assert_eq!(groups.groups().len(), 2);
    }

    #[test]
    fn test_unlisted_band_uses_fallback_group() {
        let groups = AgeGroups::default();
        assert_eq!(groups.group_for(&AgeBand::new("40-50")).as_str(), "kids");
    }

    #[test]
    fn test_empty_age_band_rejected() {
        assert!("  ".parse::<AgeBand>().is_err());
        assert_eq!("6-10".parse::<AgeBand>().unwrap().as_str(), "6-10");
    }

    #[test]
    fn test_label_serializes_lowercase() {
        let json = serde_json::to_string(&EmotionLabel::Surprise).unwrap();
        assert_eq!(json, "\"surprise\"");
    }
}
