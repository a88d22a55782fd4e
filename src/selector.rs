//! # Track Selection
//!
//! Turns a decided emotion into something playable. The online path searches
//! for a matching video, picks one candidate at random and downloads it; every
//! failure on that path degrades to a random pick from the local library,
//! partitioned by the same age group so content stays age-appropriate.
//!
//! [`TrackSelector::resolve`] never fails. The worst case is
//! [`Resolution::NothingAvailable`], which callers report and move on from.

use crate::emotion::{AgeBand, AgeGroup, AgeGroups, EmotionLabel};
use anyhow::Result;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use std::fmt;
use std::path::PathBuf;

/// One search result as returned by a [`SearchProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub uri: String,
}

impl SearchHit {
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
        }
    }

    /// The URI when it is something a fetcher can retrieve.
    #[must_use]
    pub fn playable_uri(&self) -> Option<&str> {
        let uri = self.uri.trim();
        let has_scheme = uri.starts_with("https://") || uri.starts_with("http://");
        // A bare scheme is not a location.
        (has_scheme && !uri.ends_with("://")).then_some(uri)
    }
}

/// Online search for candidate tracks.
pub trait SearchProvider {
    /// Ordered candidates for `text`, at most `max_results` of them.
    ///
    /// # Errors
    ///
    /// Network, quota and authentication failures.
    fn query(&self, text: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// Bytes downloaded for a candidate, with the type they were served as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Media {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

/// Downloads the bytes behind a candidate URI.
pub trait MediaFetcher {
    /// # Errors
    ///
    /// Any transport or HTTP status failure, or a response that is not
    /// audio or video.
    fn fetch(&self, uri: &str) -> Result<Media>;
}

/// Read-only local track library keyed by emotion and age group.
pub trait LocalLibrary {
    /// Playable files for the partition. A missing partition is an empty list.
    fn list_files(&self, emotion: EmotionLabel, group: &AgeGroup) -> Vec<PathBuf>;
}

/// A playable track, built for one decision and consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackReference {
    Remote {
        title: String,
        uri: String,
        bytes: Vec<u8>,
        /// Type the bytes were served as.
        mime_type: String,
        emotion: EmotionLabel,
        group: AgeGroup,
    },
    Local {
        path: PathBuf,
        emotion: EmotionLabel,
        group: AgeGroup,
    },
}

impl TrackReference {
    /// Human-readable name shown in the status line.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            TrackReference::Remote { title, .. } => title.clone(),
            TrackReference::Local { path, .. } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }

    #[must_use]
    pub fn emotion(&self) -> EmotionLabel {
        match self {
            TrackReference::Remote { emotion, .. } | TrackReference::Local { emotion, .. } => *emotion,
        }
    }

    #[must_use]
    pub fn group(&self) -> &AgeGroup {
        match self {
            TrackReference::Remote { group, .. } | TrackReference::Local { group, .. } => group,
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, TrackReference::Local { .. })
    }

    /// MIME type: as served for remote tracks, from the extension for local ones.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        match self {
            TrackReference::Remote { mime_type, .. } => mime_type,
            TrackReference::Local { path, .. } => {
                let extension = path
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
                mime_for_extension(extension.as_deref())
            }
        }
    }
}

fn mime_for_extension(extension: Option<&str>) -> &'static str {
    match extension {
        Some("ogg" | "oga" | "opus") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("m4a" | "mp4" | "aac") => "audio/mp4",
        Some("webm") => "audio/webm",
        _ => "audio/mpeg",
    }
}

/// Why the online path was not used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Online search disabled by configuration.
    Offline,
    SearchFailed(String),
    /// Search succeeded but nothing had a usable URI.
    NoCandidates,
    FetchFailed(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Offline => write!(f, "offline mode"),
            FallbackReason::SearchFailed(e) => write!(f, "search failed: {e}"),
            FallbackReason::NoCandidates => write!(f, "search returned no playable results"),
            FallbackReason::FetchFailed(e) => write!(f, "download failed: {e}"),
        }
    }
}

/// Outcome of [`TrackSelector::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Online(TrackReference),
    Fallback {
        track: TrackReference,
        reason: FallbackReason,
    },
    NothingAvailable {
        reason: FallbackReason,
    },
}

impl Resolution {
    #[must_use]
    pub fn track(&self) -> Option<&TrackReference> {
        match self {
            Resolution::Online(track) | Resolution::Fallback { track, .. } => Some(track),
            Resolution::NothingAvailable { .. } => None,
        }
    }

    #[must_use]
    pub fn into_track(self) -> Option<TrackReference> {
        match self {
            Resolution::Online(track) | Resolution::Fallback { track, .. } => Some(track),
            Resolution::NothingAvailable { .. } => None,
        }
    }

    /// One-line note for the listener.
    #[must_use]
    pub fn note(&self) -> String {
        match self {
            Resolution::Online(track) => format!("playing '{}'", track.name()),
            Resolution::Fallback { track, reason } => {
                format!("playing local track '{}' instead ({reason})", track.name())
            }
            Resolution::NothingAvailable { reason } => format!("nothing to play ({reason})"),
        }
    }
}

/// Tunables for [`TrackSelector`].
#[derive(Debug, Clone)]
pub struct SelectorOptions {
    /// Try the online search before the local library.
    pub online_first: bool,
    pub max_results: usize,
    pub age_groups: AgeGroups,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            online_first: true,
            max_results: 10,
            age_groups: AgeGroups::default(),
        }
    }
}

/// Resolves emotions to tracks. Holds collaborators only; every call is
/// independent of the previous one.
pub struct TrackSelector {
    search: Box<dyn SearchProvider>,
    fetcher: Box<dyn MediaFetcher>,
    library: Box<dyn LocalLibrary>,
    options: SelectorOptions,
}

impl TrackSelector {
    pub fn new(
        search: Box<dyn SearchProvider>,
        fetcher: Box<dyn MediaFetcher>,
        library: Box<dyn LocalLibrary>,
        options: SelectorOptions,
    ) -> Self {
        Self {
            search,
            fetcher,
            library,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &SelectorOptions {
        &self.options
    }

    /// Natural-language query for the online search.
    #[must_use]
    pub fn build_query(emotion: EmotionLabel, group: &AgeGroup) -> String {
        format!("{emotion} songs for {group}")
    }

    /// Resolve with the thread-local RNG.
    pub fn resolve(&self, emotion: EmotionLabel, age_band: &AgeBand) -> Resolution {
        self.resolve_with_rng(emotion, age_band, &mut thread_rng())
    }

    /// Resolve with a caller-supplied RNG for both random picks.
    pub fn resolve_with_rng<R: Rng + ?Sized>(
        &self,
        emotion: EmotionLabel,
        age_band: &AgeBand,
        rng: &mut R,
    ) -> Resolution {
        let group = self.options.age_groups.group_for(age_band).clone();
        debug!("Resolving track for {emotion} (band {age_band}, group {group})");

        let reason = if self.options.online_first {
            match self.resolve_online(emotion, &group, rng) {
                Ok(track) => {
                    info!("Selected online track '{}'", track.name());
                    return Resolution::Online(track);
                }
                Err(reason) => {
                    warn!("Online track lookup failed, falling back to local library: {reason}");
                    reason
                }
            }
        } else {
            FallbackReason::Offline
        };

        match self.pick_local(emotion, &group, rng) {
            Some(track) => {
                info!("Selected local track '{}'", track.name());
                Resolution::Fallback { track, reason }
            }
            None => {
                warn!("No local tracks for {emotion}/{group}; nothing to play");
                Resolution::NothingAvailable { reason }
            }
        }
    }

    fn resolve_online<R: Rng + ?Sized>(
        &self,
        emotion: EmotionLabel,
        group: &AgeGroup,
        rng: &mut R,
    ) -> std::result::Result<TrackReference, FallbackReason> {
        let query = Self::build_query(emotion, group);
        let hits = self
            .search
            .query(&query, self.options.max_results)
            .map_err(|e| FallbackReason::SearchFailed(format!("{e:#}")))?;

        let candidates: Vec<(&SearchHit, &str)> = hits
            .iter()
            .filter_map(|hit| hit.playable_uri().map(|uri| (hit, uri)))
            .collect();
        debug!("Query '{query}' gave {} hits, {} playable", hits.len(), candidates.len());

        let (hit, uri) = candidates.choose(rng).ok_or(FallbackReason::NoCandidates)?;
        let media = self
            .fetcher
            .fetch(uri)
            .map_err(|e| FallbackReason::FetchFailed(format!("{e:#}")))?;
        debug!("Fetched {} bytes of {} from {uri}", media.bytes.len(), media.mime_type);

        Ok(TrackReference::Remote {
            title: hit.title.clone(),
            uri: (*uri).to_string(),
            bytes: media.bytes,
            mime_type: media.mime_type,
            emotion,
            group: group.clone(),
        })
    }

    fn pick_local<R: Rng + ?Sized>(
        &self,
        emotion: EmotionLabel,
        group: &AgeGroup,
        rng: &mut R,
    ) -> Option<TrackReference> {
        let files = self.library.list_files(emotion, group);
        files.choose(rng).map(|path| TrackReference::Local {
            path: path.clone(),
            emotion,
            group: group.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::bail;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// Search fake that either fails or returns fixed hits, counting calls.
    pub(crate) struct FakeSearch {
        pub hits: Option<Vec<SearchHit>>,
        pub calls: Rc<Cell<usize>>,
    }

    impl SearchProvider for FakeSearch {
        fn query(&self, _text: &str, max_results: usize) -> Result<Vec<SearchHit>> {
            self.calls.set(self.calls.get() + 1);
            match &self.hits {
                Some(hits) => Ok(hits.iter().take(max_results).cloned().collect()),
                None => bail!("network unreachable"),
            }
        }
    }

    pub(crate) struct FakeFetcher {
        pub fail: bool,
    }

    impl MediaFetcher for FakeFetcher {
        fn fetch(&self, uri: &str) -> Result<Media> {
            if self.fail {
                bail!("connection reset fetching {uri}");
            }
            Ok(Media::new(uri.as_bytes().to_vec(), "audio/webm"))
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeLibrary {
        pub files: HashMap<(EmotionLabel, String), Vec<PathBuf>>,
    }

    impl LocalLibrary for FakeLibrary {
        fn list_files(&self, emotion: EmotionLabel, group: &AgeGroup) -> Vec<PathBuf> {
            self.files
                .get(&(emotion, group.as_str().to_string()))
                .cloned()
                .unwrap_or_default()
        }
    }

    fn selector(
        hits: Option<Vec<SearchHit>>,
        fetch_fails: bool,
        library: FakeLibrary,
        online_first: bool,
    ) -> (TrackSelector, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let selector = TrackSelector::new(
            Box::new(FakeSearch { hits, calls: Rc::clone(&calls) }),
            Box::new(FakeFetcher { fail: fetch_fails }),
            Box::new(library),
            SelectorOptions {
                online_first,
                ..SelectorOptions::default()
            },
        );
        (selector, calls)
    }

    fn happy_kids_library() -> FakeLibrary {
        let mut library = FakeLibrary::default();
        library.files.insert(
            (EmotionLabel::Happy, "kids".to_string()),
            vec![PathBuf::from("music/happy/kids/a.mp3"), PathBuf::from("music/happy/kids/b.mp3")],
        );
        library
    }

    #[test]
    fn test_online_success_returns_remote_track() {
        let hits = vec![SearchHit::new("Happy Tune", "https://www.youtube.com/watch?v=abc")];
        let (selector, calls) = selector(Some(hits), false, FakeLibrary::default(), true);
        let mut rng = StdRng::seed_from_u64(1);

        let resolution = selector.resolve_with_rng(EmotionLabel::Happy, &AgeBand::new("6-10"), &mut rng);
        match resolution {
            Resolution::Online(TrackReference::Remote { title, uri, bytes, mime_type, group, .. }) => {
                assert_eq!(title, "Happy Tune");
                assert_eq!(uri, "https://www.youtube.com/watch?v=abc");
                assert_eq!(bytes, uri.as_bytes());
                assert_eq!(mime_type, "audio/webm");
                assert_eq!(group.as_str(), "kids");
            }
            other => panic!("expected online track, got {other:?}"),
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_search_failure_falls_back_to_local() {
        let (selector, _) = selector(None, false, happy_kids_library(), true);
        let mut rng = StdRng::seed_from_u64(2);

        let resolution = selector.resolve_with_rng(EmotionLabel::Happy, &AgeBand::new("6-10"), &mut rng);
        match resolution {
            Resolution::Fallback { track, reason } => {
                assert!(track.is_local());
                assert!(matches!(reason, FallbackReason::SearchFailed(_)));
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn test_hits_without_uri_count_as_empty() {
        let hits = vec![SearchHit::new("No link", ""), SearchHit::new("Bad scheme", "ftp://x/y")];
        let (selector, _) = selector(Some(hits), false, happy_kids_library(), true);

        let resolution = selector.resolve(EmotionLabel::Happy, &AgeBand::new("3-5"));
        assert!(matches!(
            resolution,
            Resolution::Fallback { reason: FallbackReason::NoCandidates, .. }
        ));
    }

    #[test]
    fn test_fetch_failure_falls_back() {
        let hits = vec![SearchHit::new("Tune", "https://example.com/a.mp3")];
        let (selector, _) = selector(Some(hits), true, happy_kids_library(), true);

        let resolution = selector.resolve(EmotionLabel::Happy, &AgeBand::new("6-10"));
        assert!(matches!(
            resolution,
            Resolution::Fallback { reason: FallbackReason::FetchFailed(_), .. }
        ));
    }

    #[test]
    fn test_empty_library_reports_nothing_available() {
        let (selector, _) = selector(None, false, FakeLibrary::default(), true);

        let resolution = selector.resolve(EmotionLabel::Fear, &AgeBand::new("15-20"));
        assert!(matches!(resolution, Resolution::NothingAvailable { .. }));
        assert!(resolution.track().is_none());
        assert!(resolution.note().starts_with("nothing to play"));
    }

    #[test]
    fn test_offline_mode_skips_search() {
        let hits = vec![SearchHit::new("Tune", "https://example.com/a.mp3")];
        let (selector, calls) = selector(Some(hits), false, happy_kids_library(), false);

        let resolution = selector.resolve(EmotionLabel::Happy, &AgeBand::new("6-10"));
        assert!(matches!(
            resolution,
            Resolution::Fallback { reason: FallbackReason::Offline, .. }
        ));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_local_pick_respects_age_group() {
        let (selector, _) = selector(None, false, happy_kids_library(), true);

        // Teens partition is empty even though kids has files.
        let resolution = selector.resolve(EmotionLabel::Happy, &AgeBand::new("15-20"));
        assert!(matches!(resolution, Resolution::NothingAvailable { .. }));
    }

    #[test]
    fn test_online_pick_is_spread_over_candidates() {
        let hits: Vec<_> = (0..4)
            .map(|i| SearchHit::new(format!("Tune {i}"), format!("https://example.com/{i}.mp3")))
            .collect();
        let (selector, _) = selector(Some(hits), false, FakeLibrary::default(), true);
        let mut rng = StdRng::seed_from_u64(99);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            if let Some(track) = selector
                .resolve_with_rng(EmotionLabel::Sad, &AgeBand::new("10-15"), &mut rng)
                .into_track()
            {
                seen.insert(track.name());
            }
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_query_text() {
        let query = TrackSelector::build_query(EmotionLabel::Angry, &AgeGroup::new("teens"));
        assert_eq!(query, "angry songs for teens");
    }

    #[test]
    fn test_mime_type_from_extension_or_server() {
        let local = TrackReference::Local {
            path: PathBuf::from("music/sad/kids/x.OGG"),
            emotion: EmotionLabel::Sad,
            group: AgeGroup::new("kids"),
        };
        assert_eq!(local.mime_type(), "audio/ogg");
        assert_eq!(local.name(), "x.OGG");

        let remote = TrackReference::Remote {
            title: "t".into(),
            uri: "https://example.com/file.wav?sig=1".into(),
            bytes: vec![],
            mime_type: "video/mp4".into(),
            emotion: EmotionLabel::Sad,
            group: AgeGroup::new("kids"),
        };
        // The served type wins over whatever the URI suggests.
        assert_eq!(remote.mime_type(), "video/mp4");
    }
}
