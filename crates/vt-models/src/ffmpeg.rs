use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use image::RgbImage;
use tracing::debug;
use vt_core::models::{ModelError, VideoEncoder};

/// Encodes rendered frames to H.264 MP4 by piping raw RGB into `ffmpeg`
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_path: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::with_path("ffmpeg")
    }
}

impl FfmpegEncoder {
    pub fn with_path(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn build_args(&self, width: u32, height: u32, fps: u32, dest: &Path) -> Vec<OsString> {
        let size = format!("{width}x{height}");
        let rate = fps.to_string();
        let mut args: Vec<OsString> = [
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            size.as_str(),
            "-r",
            rate.as_str(),
            "-i",
            "-",
            // yuv420p needs even dimensions
            "-vf",
            "pad=ceil(iw/2)*2:ceil(ih/2)*2",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-f",
            "mp4",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(dest.as_os_str().to_os_string());
        args
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, frames: &[RgbImage], fps: u32, dest: &Path) -> Result<(), ModelError> {
        let first = frames
            .first()
            .ok_or_else(|| ModelError::new("No frames to encode"))?;
        let (width, height) = first.dimensions();
        if let Some(odd) = frames.iter().find(|f| f.dimensions() != (width, height)) {
            let (w, h) = odd.dimensions();
            return Err(ModelError::new(format!(
                "Frame size changed mid-sequence: {w}x{h}, expected {width}x{height}"
            )));
        }

        debug!(frames = frames.len(), width, height, fps, dest = %dest.display(), "Encoding video");

        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.build_args(width, height, fps, dest))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ModelError::with_source(format!("Failed to start {}", self.ffmpeg_path), e))?;

        // stdin is closed at the end of the match so ffmpeg sees EOF
        let streamed = match child.stdin.take() {
            Some(mut stdin) => frames.iter().try_for_each(|frame| stdin.write_all(frame.as_raw())),
            None => Ok(()),
        };

        // Reap the child even when it hung up early
        let output = child
            .wait_with_output()
            .map_err(|e| ModelError::with_source("Failed to wait for ffmpeg", e))?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Err(e) = streamed {
            return Err(ModelError::with_source(
                format!("ffmpeg stopped reading frames ({}): {}", output.status, stderr.trim()),
                e,
            ));
        }

        if !output.status.success() {
            return Err(ModelError::new(format!("FFmpeg execution failed: {}", stderr.trim())));
        }

        Ok(())
    }
}
