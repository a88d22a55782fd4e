//! # Frame Capture and Classification Adapters
//!
//! Thin adapters around the two external collaborators that feed a scan.
//! Capture and inference both happen in other programs; Emotune only moves
//! files and parses output.
//!
//! - [`DirectoryFrameSource`] reads image files a capture tool drops into a
//!   folder, oldest name first, picking up new files as they appear.
//! - [`CommandFrameSource`] runs a grabber command (e.g. `ffmpeg`) once per
//!   frame.
//! - [`CommandClassifier`] runs a classifier command once per frame and reads
//!   the label from its output, either a bare word or DeepFace-style JSON.
//! - [`ScriptedClassifier`] and [`SyntheticFrames`] replay a label script,
//!   for dry runs and tuning.

use crate::emotion::EmotionLabel;
use crate::scan::{EmotionClassifier, Frame, FrameSource};
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};
use std::collections::VecDeque;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Placeholder replaced by a frame path in command lines.
pub const FRAME_PLACEHOLDER: &str = "{}";

/// Extensions treated as frames.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Split a command line with shell quoting rules into program and arguments.
pub(crate) fn split_command_line(command_line: &str, what: &str) -> Result<(String, Vec<String>)> {
    let mut parts = shlex::split(command_line)
        .ok_or_else(|| anyhow!("The {what} command has unbalanced quotes: {command_line}"))?
        .into_iter();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("The {what} command is empty"))?;
    Ok((program, parts.collect()))
}

/// Split a command line and make sure it carries a frame placeholder.
fn parse_command_line(command_line: &str, what: &str) -> Result<(String, Vec<String>)> {
    let (program, mut args) = split_command_line(command_line, what)?;
    if !args.iter().any(|arg| arg.contains(FRAME_PLACEHOLDER)) {
        args.push(FRAME_PLACEHOLDER.to_string());
    }
    Ok((program, args))
}

fn substitute(args: &[String], path: &Path) -> Vec<String> {
    let path = path.to_string_lossy();
    args.iter()
        .map(|arg| arg.replace(FRAME_PLACEHOLDER, &path))
        .collect()
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Frames from image files in a directory, in file name order.
#[derive(Debug)]
pub struct DirectoryFrameSource {
    dir: PathBuf,
    last: Option<PathBuf>,
    index: u64,
}

impl DirectoryFrameSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last: None,
            index: 0,
        }
    }
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Frame directory {} is not readable", self.dir.display()))?;

        let next = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .filter(|path| self.last.as_ref().map_or(true, |last| path > last))
            .min();

        let Some(path) = next else {
            return Ok(None);
        };

        self.index += 1;
        self.last = Some(path.clone());
        debug!("Frame {} from {}", self.index, path.display());
        Ok(Some(Frame {
            index: self.index,
            path: Some(path),
            bytes: Vec::new(),
        }))
    }
}

/// Grabs each frame by running an external command that writes an image.
pub struct CommandFrameSource {
    program: String,
    args: Vec<String>,
    scratch: TempDir,
    index: u64,
    consecutive_failures: u32,
    max_failures: u32,
}

impl CommandFrameSource {
    /// `command_line` writes one image to the `{}` path per run, e.g.
    /// `ffmpeg -loglevel error -y -f v4l2 -i /dev/video0 -frames:v 1 {}`.
    ///
    /// After `max_failures` consecutive failed grabs the device is treated
    /// as gone.
    pub fn new(command_line: &str, max_failures: u32) -> Result<Self> {
        let (program, args) = parse_command_line(command_line, "capture")?;
        let scratch = tempfile::Builder::new()
            .prefix("emotune-frames-")
            .tempdir()
            .context("Failed to create scratch directory for frames")?;

        Ok(Self {
            program,
            args,
            scratch,
            index: 0,
            consecutive_failures: 0,
            max_failures: max_failures.max(1),
        })
    }

    fn failed_grab(&mut self, reason: &str) -> Result<Option<Frame>> {
        self.consecutive_failures += 1;
        warn!(
            "Frame grab failed ({}/{}): {reason}",
            self.consecutive_failures, self.max_failures
        );
        if self.consecutive_failures >= self.max_failures {
            bail!(
                "Camera unavailable: {} failed {} times in a row",
                self.program,
                self.consecutive_failures
            );
        }
        Ok(None)
    }
}

impl FrameSource for CommandFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let path = self.scratch.path().join("frame.jpg");
        // Stale frame must not be mistaken for a new one.
        match fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                return self.failed_grab(&format!("cannot clear {}: {e}", path.display()));
            }
            _ => {}
        }

        let output = Command::new(&self.program)
            .args(substitute(&self.args, &path))
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run capture command `{}`", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return self.failed_grab(&format!("exit status {}: {}", output.status, stderr.trim()));
        }
        if !path.exists() {
            return self.failed_grab("no image written");
        }

        self.consecutive_failures = 0;
        self.index += 1;
        Ok(Some(Frame {
            index: self.index,
            path: Some(path),
            bytes: Vec::new(),
        }))
    }
}

/// Runs an external classifier per frame.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
}

impl CommandClassifier {
    /// `command_line` receives the frame path in place of `{}` (appended when
    /// absent) and prints the emotion.
    pub fn new(command_line: &str) -> Result<Self> {
        let (program, args) = parse_command_line(command_line, "classifier")?;
        Ok(Self { program, args })
    }

    /// Label from classifier output.
    ///
    /// Accepts a bare label as the first word of output, or JSON carrying a
    /// `dominant_emotion` field (object or first element of an array).
    #[must_use]
    pub fn parse_output(stdout: &str) -> EmotionLabel {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(stdout) {
            let record = value.as_array().and_then(|a| a.first()).unwrap_or(&value);
            if let Some(raw) = record.get("dominant_emotion").and_then(|v| v.as_str()) {
                return EmotionLabel::from_classifier(raw);
            }
        }

        stdout
            .lines()
            .find_map(|line| line.split_whitespace().next())
            .map_or(EmotionLabel::Unknown, EmotionLabel::from_classifier)
    }
}

impl EmotionClassifier for CommandClassifier {
    fn infer(&mut self, frame: &Frame) -> Result<EmotionLabel> {
        // Frames without a file get a temporary one for the duration of the call.
        let mut temp = None;
        let path = match &frame.path {
            Some(path) => path.clone(),
            None => {
                let mut file = tempfile::Builder::new()
                    .prefix("emotune-frame-")
                    .suffix(".jpg")
                    .tempfile()
                    .context("Failed to create temporary frame file")?;
                file.write_all(&frame.bytes)
                    .context("Failed to write temporary frame file")?;
                let path = file.path().to_path_buf();
                temp = Some(file);
                path
            }
        };

        let output = Command::new(&self.program)
            .args(substitute(&self.args, &path))
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run classifier `{}`", self.program))?;
        drop(temp);

        if !output.status.success() {
            bail!(
                "Classifier exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(Self::parse_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Replays labels from a script, one per frame.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClassifier {
    labels: VecDeque<EmotionLabel>,
}

impl ScriptedClassifier {
    pub fn new(labels: impl IntoIterator<Item = EmotionLabel>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }

    /// Parse a label script.
    ///
    /// One label per line; `label*N` repeats a label; blank lines and `#`
    /// comments are ignored. Unrecognised labels become `unknown`, as they
    /// would coming out of a real classifier.
    pub fn parse(script: &str) -> Result<Self> {
        let mut labels = Vec::new();
        for (number, line) in script.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (label, times) = match line.split_once('*') {
                Some((label, times)) => {
                    let times: usize = times.trim().parse().with_context(|| {
                        format!("Invalid repeat count on line {}: '{line}'", number + 1)
                    })?;
                    (label, times)
                }
                None => (line, 1),
            };
            let label = EmotionLabel::from_classifier(label);
            labels.extend(std::iter::repeat(label).take(times));
        }
        Ok(Self::new(labels))
    }

    /// Load a label script from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let script = fs::read_to_string(path)
            .with_context(|| format!("Failed to read label script {}", path.display()))?;
        Self::parse(&script)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl EmotionClassifier for ScriptedClassifier {
    fn infer(&mut self, _frame: &Frame) -> Result<EmotionLabel> {
        self.labels
            .pop_front()
            .ok_or_else(|| anyhow!("Label script exhausted"))
    }
}

/// Empty frames, a fixed number of them.
#[derive(Debug, Clone)]
pub struct SyntheticFrames {
    remaining: usize,
    index: u64,
}

impl SyntheticFrames {
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self { remaining: count, index: 0 }
    }
}

impl FrameSource for SyntheticFrames {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.index += 1;
        Ok(Some(Frame {
            index: self.index,
            path: None,
            bytes: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame {
            index: 1,
            path: None,
            bytes: Vec::new(),
        }
    }

    #[test]
    fn test_parse_bare_label() {
        assert_eq!(CommandClassifier::parse_output("\n  happy \n"), EmotionLabel::Happy);
        assert_eq!(CommandClassifier::parse_output(""), EmotionLabel::Unknown);
        assert_eq!(CommandClassifier::parse_output("disgust"), EmotionLabel::Unknown);
    }

    #[test]
    fn test_parse_deepface_json() {
        let json = r#"[{"dominant_emotion": "sad", "emotion": {"sad": 80.1}}]"#;
        assert_eq!(CommandClassifier::parse_output(json), EmotionLabel::Sad);

        let json = r#"{"dominant_emotion": "Fear"}"#;
        assert_eq!(CommandClassifier::parse_output(json), EmotionLabel::Fear);
    }

    #[test]
    fn test_command_classifier_missing_binary_errors() {
        let mut classifier = CommandClassifier::new("emotune-no-such-classifier --json").unwrap();
        assert!(classifier.infer(&frame()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_classifier_reads_stdout() {
        let mut classifier = CommandClassifier::new("echo surprise").unwrap();
        assert_eq!(classifier.infer(&frame()).unwrap(), EmotionLabel::Surprise);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_classifier_keeps_quoted_arguments() {
        let mut classifier = CommandClassifier::new("sh -c 'echo happy' {}").unwrap();
        assert_eq!(
            classifier.args,
            vec!["-c".to_string(), "echo happy".to_string(), "{}".to_string()]
        );
        assert_eq!(classifier.infer(&frame()).unwrap(), EmotionLabel::Happy);
    }

    #[test]
    fn test_unbalanced_quotes_rejected() {
        let err = CommandClassifier::new("sh -c 'echo happy").unwrap_err();
        assert!(err.to_string().contains("unbalanced quotes"));
        assert!(CommandFrameSource::new("ffmpeg -i \"/dev/video0", 3).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_classifier_non_zero_exit_errors() {
        let mut classifier = CommandClassifier::new("false").unwrap();
        assert!(classifier.infer(&frame()).is_err());
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandClassifier::new("").is_err());
        assert!(CommandFrameSource::new("  ", 3).is_err());
    }

    #[test]
    fn test_script_parsing() {
        let script = "# warm-up\nneutral*2\nhappy\n\nSAD * 3 # trailing\nbogus\n";
        let classifier = ScriptedClassifier::parse(script).unwrap();
        let labels: Vec<_> = classifier.labels.iter().copied().collect();
        assert_eq!(
            labels,
            vec![
                EmotionLabel::Neutral,
                EmotionLabel::Neutral,
                EmotionLabel::Happy,
                EmotionLabel::Sad,
                EmotionLabel::Sad,
                EmotionLabel::Sad,
                EmotionLabel::Unknown,
            ]
        );
    }

    #[test]
    fn test_script_bad_repeat_count() {
        assert!(ScriptedClassifier::parse("happy*lots").is_err());
    }

    #[test]
    fn test_scripted_classifier_exhausts() {
        let mut classifier = ScriptedClassifier::new([EmotionLabel::Angry]);
        assert_eq!(classifier.infer(&frame()).unwrap(), EmotionLabel::Angry);
        assert!(classifier.infer(&frame()).is_err());
    }

    #[test]
    fn test_synthetic_frames_run_out() {
        let mut frames = SyntheticFrames::new(2);
        assert!(frames.next_frame().unwrap().is_some());
        assert_eq!(frames.next_frame().unwrap().unwrap().index, 2);
        assert!(frames.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_directory_source_orders_and_follows() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("0002.jpg"), b"x").unwrap();
        fs::write(dir.join("0001.jpg"), b"x").unwrap();
        fs::write(dir.join("notes.txt"), b"x").unwrap();

        let mut source = DirectoryFrameSource::new(dir);
        let first = source.next_frame().unwrap().unwrap();
        assert!(first.path.unwrap().ends_with("0001.jpg"));
        let second = source.next_frame().unwrap().unwrap();
        assert!(second.path.unwrap().ends_with("0002.jpg"));
        assert!(source.next_frame().unwrap().is_none());

        fs::write(dir.join("0003.png"), b"x").unwrap();
        let third = source.next_frame().unwrap().unwrap();
        assert_eq!(third.index, 3);
    }

    #[test]
    fn test_directory_source_missing_dir_is_device_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut source = DirectoryFrameSource::new(temp_dir.path().join("camera"));
        assert!(source.next_frame().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_source_gives_up_after_repeated_failures() {
        let mut source = CommandFrameSource::new("false", 2).unwrap();
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_source_writes_frame() {
        let mut source = CommandFrameSource::new("touch {}", 3).unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.index, 1);
        assert!(frame.path.unwrap().ends_with("frame.jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_source_never_reuses_uncleared_frame() {
        let mut source = CommandFrameSource::new("touch {}", 3).unwrap();
        // A directory in the frame's place cannot be removed as a file.
        fs::create_dir(source.scratch.path().join("frame.jpg")).unwrap();

        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().is_err());
        assert_eq!(source.index, 0);
    }
}
