//! # Local Track Library
//!
//! Read-only directory tree used when the online path fails:
//!
//! ```text
//! music/
//! ├── happy/
//! │   ├── kids/   a.mp3 b.mp3
//! │   └── teens/  c.ogg
//! └── sad/
//!     └── kids/   d.mp3
//! ```
//!
//! Only files with a known audio extension count. Missing or unreadable
//! directories are simply empty partitions.

use crate::emotion::{AgeGroup, EmotionLabel};
use crate::selector::LocalLibrary;
use anyhow::{Context, Result};
use log::{debug, warn};
use path_absolutize::Absolutize;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions treated as playable audio.
pub const AUDIO_EXTENSIONS: [&str; 8] = ["mp3", "ogg", "oga", "opus", "wav", "flac", "m4a", "aac"];

/// Track library backed by the filesystem.
#[derive(Debug, Clone)]
pub struct FsLibrary {
    root: PathBuf,
}

/// Number of tracks in one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub emotion: EmotionLabel,
    pub group: AgeGroup,
    pub tracks: usize,
}

impl FsLibrary {
    /// Library rooted at `root`; relative roots are resolved against the
    /// working directory.
    ///
    /// # Errors
    ///
    /// The working directory cannot be determined.
    pub fn new(root: &Path) -> Result<Self> {
        let root = root
            .absolutize()
            .with_context(|| format!("Failed to resolve library path {}", root.display()))?
            .into_owned();
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn partition_dir(&self, emotion: EmotionLabel, group: &AgeGroup) -> PathBuf {
        self.root.join(emotion.as_str()).join(group.as_str())
    }

    /// Create an empty folder for every playable emotion and group.
    ///
    /// # Errors
    ///
    /// A directory cannot be created.
    pub fn init_tree(&self, groups: &[AgeGroup]) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        for emotion in EmotionLabel::PLAYABLE {
            for group in groups {
                let dir = self.partition_dir(emotion, group);
                if !dir.exists() {
                    fs::create_dir_all(&dir)
                        .with_context(|| format!("Failed to create library folder {}", dir.display()))?;
                    created.push(dir);
                }
            }
        }
        Ok(created)
    }

    /// Track counts per partition, in emotion then group order.
    #[must_use]
    pub fn summary(&self, groups: &[AgeGroup]) -> Vec<PartitionSummary> {
        EmotionLabel::PLAYABLE
            .into_iter()
            .flat_map(|emotion| {
                groups.iter().map(move |group| PartitionSummary {
                    emotion,
                    group: group.clone(),
                    tracks: self.list_files(emotion, group).len(),
                })
            })
            .collect()
    }
}

fn is_audio_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

impl LocalLibrary for FsLibrary {
    fn list_files(&self, emotion: EmotionLabel, group: &AgeGroup) -> Vec<PathBuf> {
        let dir = self.partition_dir(emotion, group);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("No local tracks at {}: {e}", dir.display());
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {e}", dir.display());
                    None
                }
            })
            .filter(|path| is_audio_file(path))
            .collect();
        files.sort();
        debug!("{} local tracks in {}", files.len(), dir.display());
        files
    }
}
