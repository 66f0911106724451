//! Duration probing for staged media via ffprobe.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe binary '{0}' not found")]
    ProbeNotFound(String),

    #[error("Failed to run ffprobe: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Could not open media file {path}: {stderr}")]
    Unreadable { path: PathBuf, stderr: String },

    #[error("Unexpected ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Missing or non-positive frame rate")]
    NoFrameRate,

    #[error("Duration is zero or undefined")]
    ZeroDuration,
}

/// Computes the playable duration of a media file, in seconds
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn duration(&self, path: &Path) -> Result<f64, ProbeError>;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.trim().parse().ok()
}

fn parse_f64(value: Option<&String>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

/// `frame_count / frame_rate` for the first video stream. Containers that
/// do not record a frame count fall back to their declared duration.
fn duration_from_output(probe: &FfprobeOutput) -> Result<f64, ProbeError> {
    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::NoVideoStream)?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .filter(|f| *f > 0.0)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .filter(|f| f.is_finite() && *f > 0.0)
        .ok_or(ProbeError::NoFrameRate)?;

    let frame_count = match parse_f64(stream.nb_frames.as_ref()) {
        Some(frames) => frames,
        None => {
            let declared = parse_f64(stream.duration.as_ref())
                .or_else(|| parse_f64(probe.format.as_ref().and_then(|f| f.duration.as_ref())))
                .unwrap_or(0.0);
            (declared * fps).round()
        }
    };

    let duration = frame_count / fps;
    if duration.is_finite() && duration > 0.0 {
        Ok(duration)
    } else {
        Err(ProbeError::ZeroDuration)
    }
}

pub struct FfprobeDurationProbe {
    binary: String,
}

impl FfprobeDurationProbe {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn duration(&self, path: &Path) -> Result<f64, ProbeError> {
        if !self.is_available() {
            return Err(ProbeError::ProbeNotFound(self.binary.clone()));
        }

        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::Unreadable {
                path: path.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        duration_from_output(&probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> FfprobeOutput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("n/a"), None);
    }

    #[test]
    fn test_duration_from_frame_count() {
        let probe = parse(
            r#"{"streams": [
                {"codec_type": "audio", "avg_frame_rate": "0/0"},
                {"codec_type": "video", "avg_frame_rate": "25/1", "nb_frames": "250"}
            ]}"#,
        );
        assert!((duration_from_output(&probe).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_duration_falls_back_to_declared_duration() {
        let probe = parse(
            r#"{"format": {"duration": "12.000000"},
                "streams": [{"codec_type": "video", "avg_frame_rate": "0/0", "r_frame_rate": "30/1"}]}"#,
        );
        assert!((duration_from_output(&probe).unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_duration_errors() {
        let audio_only = parse(r#"{"streams": [{"codec_type": "audio"}]}"#);
        assert!(matches!(
            duration_from_output(&audio_only),
            Err(ProbeError::NoVideoStream)
        ));

        let no_rate = parse(
            r#"{"streams": [{"codec_type": "video", "avg_frame_rate": "0/0", "r_frame_rate": "0/0", "nb_frames": "10"}]}"#,
        );
        assert!(matches!(
            duration_from_output(&no_rate),
            Err(ProbeError::NoFrameRate)
        ));

        let still_image = parse(
            r#"{"format": {}, "streams": [{"codec_type": "video", "avg_frame_rate": "25/1"}]}"#,
        );
        assert!(matches!(
            duration_from_output(&still_image),
            Err(ProbeError::ZeroDuration)
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let probe = FfprobeDurationProbe::new("definitely-not-a-real-ffprobe");
        let err = probe.duration(Path::new("clip.mp4")).await.unwrap_err();
        assert!(matches!(err, ProbeError::ProbeNotFound(_)));
    }

    #[tokio::test]
    async fn test_non_media_file_is_unreadable() {
        let probe = FfprobeDurationProbe::new("ffprobe");
        if !probe.is_available() {
            eprintln!("ffprobe not installed, skipping");
            return;
        }

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.mp4");
        std::fs::write(&path, b"this is plain text, not a video container").unwrap();

        let err = probe.duration(&path).await.unwrap_err();
        match err {
            ProbeError::Unreadable { path: failed, stderr } => {
                assert_eq!(failed, path);
                assert!(!stderr.is_empty());
            }
            other => panic!("expected Unreadable, got {other:?}"),
        }
    }
}
