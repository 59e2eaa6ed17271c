use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as ProcCommand;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::FfmpegConfig;

/// Timestamps `0, step, 2*step, ...` up to and including `duration_ms` when
/// it lands on a step boundary.
pub(crate) fn sample_timestamps(step_ms: u64, duration_ms: u64) -> impl Iterator<Item = u64> {
    (0..=duration_ms).step_by(step_ms as usize)
}

/// ffmpeg time duration syntax, e.g. "2500ms".
fn format_timestamp(timestamp_ms: u64) -> String {
    format!("{}ms", timestamp_ms)
}

/// Scratch image file holding the single decoded frame. Overwritten every
/// iteration, removed when the guard drops.
pub(crate) struct ScratchFrame {
    path: PathBuf,
}

impl ScratchFrame {
    pub(crate) fn new() -> Self {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "asciitape_frame_{}_{}.png",
            std::process::id(),
            stamp
        ));
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFrame {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Decode the frame nearest `timestamp_ms` from `input` into `out`.
///
/// Returns `Ok(false)` when ffmpeg exits nonzero or writes no image — a
/// decode failure at that timestamp, to be handled per the configured
/// [`FailurePolicy`](crate::FailurePolicy). Failing to launch ffmpeg at all
/// is an error regardless of policy.
pub(crate) fn extract_frame(
    ffmpeg: &FfmpegConfig,
    input: &Path,
    timestamp_ms: u64,
    out: &Path,
) -> Result<bool> {
    // A stale frame from the previous iteration must not stand in for a
    // failed decode.
    let _ = fs::remove_file(out);

    let status = ProcCommand::new(ffmpeg.ffmpeg_cmd())
        .arg("-loglevel")
        .arg("error")
        .arg("-y")
        .arg("-ss")
        .arg(format_timestamp(timestamp_ms))
        .arg("-i")
        .arg(input)
        .arg("-frames:v")
        .arg("1")
        .arg(out)
        .status()
        .context("running ffmpeg frame extraction")?;

    Ok(status.success() && out.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_100_duration_300_yields_four_timestamps() {
        let timestamps: Vec<u64> = sample_timestamps(100, 300).collect();
        assert_eq!(timestamps, vec![0, 100, 200, 300]);
    }

    #[test]
    fn endpoint_between_steps_is_not_sampled() {
        let timestamps: Vec<u64> = sample_timestamps(100, 250).collect();
        assert_eq!(timestamps, vec![0, 100, 200]);
    }

    #[test]
    fn zero_duration_samples_only_the_start() {
        let timestamps: Vec<u64> = sample_timestamps(100, 0).collect();
        assert_eq!(timestamps, vec![0]);
    }

    #[test]
    fn timestamps_use_millisecond_duration_syntax() {
        assert_eq!(format_timestamp(0), "0ms");
        assert_eq!(format_timestamp(2500), "2500ms");
    }

    #[test]
    fn scratch_frame_lives_in_the_temp_dir_as_png() {
        let scratch = ScratchFrame::new();
        assert!(scratch.path().starts_with(std::env::temp_dir()));
        assert_eq!(
            scratch.path().extension().and_then(|e| e.to_str()),
            Some("png")
        );
    }

    #[test]
    fn missing_ffmpeg_binary_is_an_error() {
        let ffmpeg = FfmpegConfig::with_command("asciitape-no-such-binary");
        let result = extract_frame(
            &ffmpeg,
            Path::new("input.mp4"),
            0,
            Path::new("/tmp/asciitape_test_out.png"),
        );
        assert!(result.is_err());
    }
}
