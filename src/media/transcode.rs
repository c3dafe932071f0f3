//! Video normalization via ffmpeg
//!
//! Transports reliably play H.264/AAC MP4 with the moov atom up front;
//! anything else gets rewritten. The transcoder shells out to an
//! ffmpeg binary discovered at startup, in the spirit of any external
//! tool integration: explicit configured path first, then PATH lookup.

use crate::config::TranscodeConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Normalizes videos to transport-compatible MP4.
#[derive(Clone, Debug)]
pub struct Transcoder {
    ffmpeg_path: PathBuf,
    max_width: u32,
    audio_sample_rate: u32,
}

impl Transcoder {
    /// Create a transcoder with an explicit ffmpeg binary path
    pub fn new(ffmpeg_path: PathBuf, config: &TranscodeConfig) -> Self {
        Self {
            ffmpeg_path,
            max_width: config.max_width,
            audio_sample_rate: config.audio_sample_rate,
        }
    }

    /// Discover ffmpeg from the configuration.
    ///
    /// Uses the configured path when set, otherwise searches PATH with
    /// the `which` crate when `search_path` is enabled. `None` means no
    /// transcoding is available and videos go out as fetched.
    pub fn from_config(config: &TranscodeConfig) -> Option<Self> {
        if let Some(path) = &config.ffmpeg_path {
            return Some(Self::new(path.clone(), config));
        }
        if config.search_path {
            return which::which("ffmpeg").ok().map(|p| Self::new(p, config));
        }
        None
    }

    /// Rewrite a video file as H.264/AAC MP4 with fast-start layout.
    ///
    /// Output lands next to the input with `.mp4` appended; the input
    /// file is deleted once the output exists. Video is scaled so width
    /// stays within the configured maximum with both dimensions forced
    /// even, and audio is resampled to the configured rate.
    pub async fn normalize(&self, input: &Path) -> Result<PathBuf> {
        let output = PathBuf::from(format!("{}.mp4", input.display()));
        let scale = format!(
            "scale='min({},iw)':'-2',pad=ceil(iw/2)*2:ceil(ih/2)*2",
            self.max_width
        );
        let sample_rate = self.audio_sample_rate.to_string();

        // A task deadline can drop this future mid-transcode; the child
        // must not outlive it and keep writing into removed scratch space
        let result = Command::new(&self.ffmpeg_path)
            .kill_on_drop(true)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-vf", &scale])
            .args(["-c:v", "libx264"])
            .args(["-preset", "veryfast"])
            .args(["-profile:v", "main"])
            .args(["-level", "3.1"])
            .args(["-pix_fmt", "yuv420p"])
            .args(["-movflags", "+faststart"])
            .args(["-crf", "23"])
            .args(["-c:a", "aac"])
            .args(["-b:a", "128k"])
            .args(["-ar", &sample_rate])
            .arg(&output)
            .output()
            .await
            .map_err(|e| Error::Transcode(format!("failed to execute ffmpeg: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Error::Transcode(format!(
                "ffmpeg exited with {}: {tail}",
                result.status
            )));
        }

        // The intermediate must never outlive its replacement
        if let Err(e) = tokio::fs::remove_file(input).await {
            tracing::warn!(
                input = %input.display(),
                error = %e,
                "Failed to remove pre-transcode file"
            );
        }

        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            "Video normalized to MP4"
        );
        Ok(output)
    }
}
