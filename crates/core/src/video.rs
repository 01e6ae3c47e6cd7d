use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use wait_timeout::ChildExt;

use crate::models::MediaUri;

/// Time into a video at which preview frames are taken.
pub const PREVIEW_FRAME_AT: Duration = Duration::from_secs(1);

/// Pulls a single encoded frame out of a video.
pub trait FrameExtractor: Send + Sync {
    /// Encoded image bytes of the frame nearest `at`, or `None` on failure.
    fn frame_near(&self, uri: &MediaUri, at: Duration) -> Option<Vec<u8>>;
}

/// Extracts frames by running `ffmpeg`, killed after `timeout`.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    pub program: PathBuf,
    pub timeout: Duration,
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            timeout: Duration::from_secs(15),
        }
    }
}

impl FrameExtractor for FfmpegFrameExtractor {
    fn frame_near(&self, uri: &MediaUri, at: Duration) -> Option<Vec<u8>> {
        let input = uri.to_file_path()?;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let output = std::env::temp_dir().join(format!(
            "lumaloop-frame-{}-{nanos}.png",
            std::process::id()
        ));

        let mut child = match Command::new(&self.program)
            .arg("-v")
            .arg("error")
            .arg("-y")
            .arg("-ss")
            .arg(format!("{:.3}", at.as_secs_f64()))
            .arg("-i")
            .arg(&input)
            .arg("-frames:v")
            .arg("1")
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                warn!("failed to spawn {}: {err}", self.program.display());
                return None;
            }
        };

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                warn!("frame extraction for {uri} timed out");
                let _ = fs::remove_file(&output);
                return None;
            }
            Err(err) => {
                warn!("waiting for frame extraction failed: {err}");
                let _ = fs::remove_file(&output);
                return None;
            }
        };

        let frame = if status.success() {
            fs::read(&output).ok().filter(|bytes| !bytes.is_empty())
        } else {
            debug!("ffmpeg exited with {status} for {uri}");
            None
        };
        let _ = fs::remove_file(&output);
        frame
    }
}
