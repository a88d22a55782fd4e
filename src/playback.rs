//! # Playback Sinks
//!
//! Where resolved tracks end up. The controller hands a [`TrackReference`] to
//! a [`PlaybackSink`] and forgets about it: playback is fire-and-forget, and
//! stopping audio that is already playing is the sink's own business.
//!
//! - [`CommandPlayer`] shells out to an external player (`mpv` by default),
//!   replacing whatever it started before.
//! - [`HtmlAudioSink`] renders an autoplaying `<audio>` element with the track
//!   inlined as a base64 `data:` URI, for browser-based surfaces.
//! - [`NullSink`] only logs; used for dry runs.

use crate::capture::split_command_line;
use crate::selector::TrackReference;
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tempfile::NamedTempFile;

/// Placeholder replaced by the track location in player command lines.
pub const TRACK_PLACEHOLDER: &str = "{}";

/// Receives tracks to play.
pub trait PlaybackSink {
    /// Start playing `track`, replacing anything this sink is playing.
    ///
    /// # Errors
    ///
    /// Failures to start playback. The controller logs them and carries on.
    fn play(&mut self, track: &TrackReference) -> Result<()>;

    /// Stop whatever is playing.
    ///
    /// # Errors
    ///
    /// Failures to stop the underlying player.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Block until the current track has finished. Sinks that do not own the
    /// audio return at once.
    ///
    /// # Errors
    ///
    /// Failures while waiting on the underlying player.
    fn wait(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Runs an external player process per track.
///
/// Remote tracks are written to a temporary file that lives as long as the
/// player does.
#[derive(Debug)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
    scratch: Option<NamedTempFile>,
}

impl CommandPlayer {
    /// Parse a command line such as `"mpv --no-video {}"`.
    ///
    /// If the template has no `{}` the track location is appended.
    ///
    /// # Errors
    ///
    /// An empty command line or unbalanced quotes.
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let (program, mut args) = split_command_line(command_line, "player")
            .context("Set `player_command` in the config file.")?;
        if !args.iter().any(|arg| arg.contains(TRACK_PLACEHOLDER)) {
            args.push(TRACK_PLACEHOLDER.to_string());
        }

        Ok(Self {
            program,
            args,
            child: None,
            scratch: None,
        })
    }

    /// Arguments for playing `location`.
    #[must_use]
    pub fn args_for(&self, location: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(TRACK_PLACEHOLDER, location))
            .collect()
    }

    fn materialize(&mut self, track: &TrackReference) -> Result<PathBuf> {
        match track {
            TrackReference::Local { path, .. } => Ok(path.clone()),
            TrackReference::Remote { bytes, .. } => {
                let suffix = format!(".{}", extension_for_mime(track.mime_type()));
                let mut file = tempfile::Builder::new()
                    .prefix("emotune-")
                    .suffix(&suffix)
                    .tempfile()
                    .context("Failed to create temporary file for downloaded track")?;
                file.write_all(bytes)
                    .context("Failed to write downloaded track to temporary file")?;
                let path = file.path().to_path_buf();
                self.scratch = Some(file);
                Ok(path)
            }
        }
    }
}

impl PlaybackSink for CommandPlayer {
    fn play(&mut self, track: &TrackReference) -> Result<()> {
        self.stop()?;

        let location = self.materialize(track)?;
        let args = self.args_for(&location.to_string_lossy());
        debug!("Spawning player: {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start player `{}`. Is it installed?", self.program))?;

        info!("Playing '{}' with {} (pid {})", track.name(), self.program, child.id());
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            // Already exited is fine.
            if let Err(e) = child.kill() {
                debug!("Player process already gone: {e}");
            }
            child.wait().context("Failed to reap player process")?;
        }
        self.scratch = None;
        Ok(())
    }

    fn wait(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            let status = child.wait().context("Failed to wait for player process")?;
            if !status.success() {
                warn!("Player `{}` exited with {status}", self.program);
            }
        }
        self.scratch = None;
        Ok(())
    }
}

impl Drop for CommandPlayer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop player on shutdown: {e:#}");
        }
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "audio/ogg" => "ogg",
        "audio/wav" => "wav",
        "audio/flac" => "flac",
        "audio/mp4" | "audio/aac" => "m4a",
        "audio/webm" | "video/webm" => "webm",
        "video/mp4" => "mp4",
        _ => "mp3",
    }
}

/// Writes an HTML `<audio>` element for the current track to a file.
#[derive(Debug, Clone)]
pub struct HtmlAudioSink {
    output: PathBuf,
}

impl HtmlAudioSink {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self { output: output.into() }
    }

    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Autoplaying audio element with the bytes inlined.
    #[must_use]
    pub fn render(bytes: &[u8], mime_type: &str) -> String {
        format!(
            "<audio style=\"width: 100%;\" src=\"data:{mime_type};base64,{}\" autoplay controls></audio>",
            STANDARD.encode(bytes)
        )
    }
}

impl PlaybackSink for HtmlAudioSink {
    fn play(&mut self, track: &TrackReference) -> Result<()> {
        let bytes = match track {
            TrackReference::Remote { bytes, .. } => bytes.clone(),
            TrackReference::Local { path, .. } => fs::read(path)
                .with_context(|| format!("Failed to read local track {}", path.display()))?,
        };
        if bytes.is_empty() {
            bail!("Track '{}' has no audio data", track.name());
        }

        let html = Self::render(&bytes, track.mime_type());
        fs::write(&self.output, html)
            .with_context(|| format!("Failed to write audio element to {}", self.output.display()))?;
        info!("Wrote audio element for '{}' to {}", track.name(), self.output.display());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.output.exists() {
            fs::write(&self.output, "")
                .with_context(|| format!("Failed to clear {}", self.output.display()))?;
        }
        Ok(())
    }
}

/// Sink that only logs what it would play.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn play(&mut self, track: &TrackReference) -> Result<()> {
        info!("(dry run) would play '{}' [{}]", track.name(), track.mime_type());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{AgeGroup, EmotionLabel};
    use tempfile::TempDir;

    fn local(path: PathBuf) -> TrackReference {
        TrackReference::Local {
            path,
            emotion: EmotionLabel::Happy,
            group: AgeGroup::new("kids"),
        }
    }

    #[test]
    fn test_player_template_placeholder() {
        let player = CommandPlayer::from_command_line("mpv --no-video --volume=70 {}").unwrap();
        assert_eq!(
            player.args_for("/tmp/a.mp3"),
            vec!["--no-video", "--volume=70", "/tmp/a.mp3"]
        );
    }

    #[test]
    fn test_player_template_keeps_quoted_arguments() {
        let player = CommandPlayer::from_command_line("mpv --title 'Emotune player' {}").unwrap();
        assert_eq!(
            player.args_for("/tmp/my song.mp3"),
            vec!["--title", "Emotune player", "/tmp/my song.mp3"]
        );
        assert!(CommandPlayer::from_command_line("mpv --title 'Emotune").is_err());
    }

    #[test]
    fn test_player_template_without_placeholder_appends_track() {
        let player = CommandPlayer::from_command_line("ffplay -nodisp -autoexit").unwrap();
        assert_eq!(player.args_for("x.ogg").last().unwrap(), "x.ogg");
    }

    #[test]
    fn test_empty_player_command_rejected() {
        assert!(CommandPlayer::from_command_line("   ").is_err());
    }

    #[test]
    fn test_missing_player_binary_is_an_error() {
        let mut player = CommandPlayer::from_command_line("emotune-no-such-player-binary").unwrap();
        let result = player.play(&local(PathBuf::from("/nonexistent.mp3")));
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_returns_when_player_exits() -> Result<()> {
        let mut player = CommandPlayer::from_command_line("true")?;
        player.play(&local(PathBuf::from("/nonexistent.mp3")))?;
        player.wait()?;
        assert!(player.child.is_none());
        Ok(())
    }

    #[test]
    fn test_render_audio_element() {
        let html = HtmlAudioSink::render(b"abc", "audio/mpeg");
        assert_eq!(
            html,
            "<audio style=\"width: 100%;\" src=\"data:audio/mpeg;base64,YWJj\" autoplay controls></audio>"
        );
    }

    #[test]
    fn test_html_sink_inlines_local_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let track_path = temp_dir.path().join("song.ogg");
        fs::write(&track_path, b"OggS")?;
        let output = temp_dir.path().join("player.html");

        let mut sink = HtmlAudioSink::new(&output);
        sink.play(&local(track_path))?;

        let html = fs::read_to_string(&output)?;
        assert!(html.contains("data:audio/ogg;base64,T2dnUw=="));

        sink.stop()?;
        assert_eq!(fs::read_to_string(&output)?, "");
        Ok(())
    }

    #[test]
    fn test_html_sink_rejects_empty_remote_payload() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = HtmlAudioSink::new(temp_dir.path().join("p.html"));
        let track = TrackReference::Remote {
            title: "empty".into(),
            uri: "https://example.com/e.mp3".into(),
            bytes: Vec::new(),
            mime_type: "audio/mpeg".into(),
            emotion: EmotionLabel::Sad,
            group: AgeGroup::new("teens"),
        };
        assert!(sink.play(&track).is_err());
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("audio/ogg"), "ogg");
        assert_eq!(extension_for_mime("audio/mpeg"), "mp3");
        assert_eq!(extension_for_mime("video/mp4"), "mp4");
        assert_eq!(extension_for_mime("application/x-whatever"), "mp3");
    }
}
