//! # asciitape - Video to ASCII Tape Converter
//!
//! `asciitape` converts a video into a single text file (a "tape") of
//! ASCII-art frames, one per sampled timestamp, separated by a delimiter
//! string.
//!
//! ## Features
//!
//! - Sample a video at a fixed timestamp step and render each frame as ASCII
//! - Configurable character palette, frame grid, step, and clip length
//! - Batched writes: frames accumulate in memory and flush at a threshold
//! - Abort-or-skip policy for frames that fail to decode
//! - Progress reporting for integration with UI applications
//!
//! ## Example
//!
//! ```no_run
//! use asciitape::{TapeConverter, TapeOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = TapeConverter::new();
//! let options = TapeOptions::default()
//!     .with_width(120)
//!     .with_duration_ms(10_000);
//! let stats = converter.convert_video(
//!     Path::new("input.mp4"),
//!     Path::new("input_ascii.txt"),
//!     &options,
//! )?;
//! println!("{} frames rendered", stats.rendered);
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! ```no_run
//! use asciitape::{TapeConverter, TapeOptions};
//! use std::path::Path;
//!
//! let converter = TapeConverter::new();
//! let options = TapeOptions::default();
//!
//! converter.convert_video_with_progress(
//!     Path::new("input.mp4"),
//!     Path::new("input_ascii.txt"),
//!     &options,
//!     Some(|completed: usize, total: usize| {
//!         println!("Sampled {}/{}", completed, total);
//!     }),
//! ).unwrap();
//! ```

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::Path;

mod sampler;
mod writer;

pub use writer::FrameSink;

/// Character palette of the original tape generator, densest to sparsest.
pub const DEFAULT_PALETTE: &str =
    r#"$@B%8&WM#*oahkbdpqwmZO0QLCJUYXzcvunxrjft/\|()1{}[]?-_+~<>i!lI;:,"^`'. "#;

/// Delimiter written between consecutive frames on the tape.
pub const DEFAULT_DELIMITER: &str = "SPLIT";

/// An ordered character palette indexed by luminance bucket.
///
/// Index 0 renders the darkest pixels, the last index the lightest.
/// Only pure-ASCII palettes are accepted; anything else would corrupt the
/// fixed-width frame grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    chars: Vec<u8>,
}

impl Palette {
    /// Build a palette from an ordered character sequence.
    pub fn new(chars: &str) -> Result<Self> {
        if chars.is_empty() {
            return Err(anyhow!("Palette must contain at least one character"));
        }
        if !chars.is_ascii() {
            return Err(anyhow!(
                "Palette contains non-ASCII characters. This will cause corrupted \
                output. Please use only ASCII characters."
            ));
        }
        Ok(Self {
            chars: chars.as_bytes().to_vec(),
        })
    }

    /// Number of luminance buckets.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Always false; a palette cannot be constructed empty.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Map a luminance value to its palette character.
    ///
    /// The bucket is `floor(luminance / (256 / len))`. Luminance 255 must land
    /// in the last bucket, never one past it, so the index is clamped to
    /// `len - 1`.
    pub fn quantize(&self, luminance: u8) -> char {
        let len = self.chars.len();
        let bucket = (luminance as usize * len) / 256;
        self.chars[bucket.min(len - 1)] as char
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(DEFAULT_PALETTE).unwrap()
    }
}

/// What to do when a frame fails to decode at a sampled timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// End the run with an error on the first failed frame.
    #[default]
    Abort,
    /// Skip the timestamp and continue; the tape gets no frame for it.
    SkipFrame,
}

/// Options for a tape conversion run.
#[derive(Debug, Clone)]
pub struct TapeOptions {
    /// Character palette, densest to sparsest.
    pub palette: Palette,
    /// Frame width in characters (columns).
    pub width: u32,
    /// Frame height in rows. `None` derives the height from the source
    /// aspect ratio.
    pub height: Option<u32>,
    /// Milliseconds between sampled timestamps.
    pub step_ms: u64,
    /// Sampling endpoint in milliseconds, inclusive when it lands on a step.
    pub duration_ms: u64,
    /// Buffered frames per batched write.
    pub flush_threshold: usize,
    /// Literal placed between consecutive frames.
    pub delimiter: String,
    /// Policy for frames that fail to decode.
    pub on_decode_failure: FailurePolicy,
}

impl Default for TapeOptions {
    fn default() -> Self {
        Self {
            palette: Palette::default(),
            width: 300,
            height: Some(90),
            step_ms: 100,
            duration_ms: 100_000,
            flush_threshold: 32,
            delimiter: DEFAULT_DELIMITER.to_string(),
            on_decode_failure: FailurePolicy::Abort,
        }
    }
}

impl TapeOptions {
    /// Set the frame width in characters.
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    /// Set the frame height in rows, or `None` to derive from aspect ratio.
    pub fn with_height(mut self, height: Option<u32>) -> Self {
        self.height = height;
        self
    }

    /// Set the sampling step in milliseconds.
    pub fn with_step_ms(mut self, step_ms: u64) -> Self {
        self.step_ms = step_ms;
        self
    }

    /// Set the sampling endpoint in milliseconds.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Set how many frames accumulate before a batched write.
    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    /// Set the literal placed between consecutive frames.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Set a custom character palette.
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    /// Set the decode-failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_decode_failure = policy;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 {
            return Err(anyhow!("Frame width must be greater than zero"));
        }
        if self.step_ms == 0 {
            return Err(anyhow!("Sampling step must be greater than zero"));
        }
        Ok(())
    }
}

/// Preset defining the sampling grid and cadence.
#[derive(Debug, Deserialize, Clone)]
pub struct TapePreset {
    pub width: u32,
    /// 0 derives the height from the source aspect ratio.
    pub height: u32,
    pub step_ms: u64,
    pub duration_ms: u64,
    pub flush_threshold: usize,
}

fn default_palette_str() -> String {
    DEFAULT_PALETTE.to_string()
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

/// Application configuration with presets, palette, and delimiter.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub presets: HashMap<String, TapePreset>,
    pub default_preset: String,
    #[serde(default = "default_palette_str")]
    pub palette: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let default_json = r#"{
            "presets": {
                "default": {"width": 300, "height": 90, "step_ms": 100, "duration_ms": 100000, "flush_threshold": 32},
                "small":   {"width": 100, "height": 30, "step_ms": 200, "duration_ms": 100000, "flush_threshold": 16},
                "large":   {"width": 480, "height": 0,  "step_ms": 50,  "duration_ms": 100000, "flush_threshold": 64}
            },
            "default_preset": "default"
        }"#;
        serde_json::from_str(default_json).unwrap()
    }
}

/// Counters reported at the end of a conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeStats {
    /// Number of sampled timestamps.
    pub sampled: usize,
    /// Frames rendered onto the tape.
    pub rendered: usize,
    /// Timestamps skipped under [`FailurePolicy::SkipFrame`].
    pub skipped: usize,
}

/// Which external binary performs the per-timestamp frame decode.
#[derive(Debug, Clone, Default)]
pub struct FfmpegConfig {
    command: Option<String>,
}

impl FfmpegConfig {
    /// Use the `ffmpeg` found on PATH.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific ffmpeg binary.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
        }
    }

    pub(crate) fn ffmpeg_cmd(&self) -> &str {
        self.command.as_deref().unwrap_or("ffmpeg")
    }
}

/// Main converter struct for tape generation.
pub struct TapeConverter {
    config: AppConfig,
    ffmpeg: FfmpegConfig,
}

impl TapeConverter {
    /// Create a new converter with default configuration.
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            ffmpeg: FfmpegConfig::default(),
        }
    }

    /// Create a converter with custom configuration.
    pub fn with_config(config: AppConfig) -> Result<Self> {
        // Validate palette characters up front
        Palette::new(&config.palette)?;
        Ok(Self {
            config,
            ffmpeg: FfmpegConfig::default(),
        })
    }

    /// Load configuration from a JSON file.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&text).context("parsing config json")?;
        Self::with_config(config)
    }

    /// Override the ffmpeg binary used for frame extraction.
    pub fn with_ffmpeg(mut self, ffmpeg: FfmpegConfig) -> Self {
        self.ffmpeg = ffmpeg;
        self
    }

    /// Get the current configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Get a preset by name.
    pub fn get_preset(&self, name: &str) -> Option<&TapePreset> {
        self.config.presets.get(name)
    }

    /// Build conversion options from a preset name.
    pub fn options_from_preset(&self, preset_name: &str) -> Result<TapeOptions> {
        let preset = self
            .get_preset(preset_name)
            .ok_or_else(|| anyhow!("Preset '{}' not found", preset_name))?;
        Ok(TapeOptions {
            palette: Palette::new(&self.config.palette)?,
            width: preset.width,
            height: if preset.height == 0 {
                None
            } else {
                Some(preset.height)
            },
            step_ms: preset.step_ms,
            duration_ms: preset.duration_ms,
            flush_threshold: preset.flush_threshold,
            delimiter: self.config.delimiter.clone(),
            on_decode_failure: FailurePolicy::Abort,
        })
    }

    /// Convert a video into an ASCII tape.
    ///
    /// # Arguments
    ///
    /// * `input` - Path to the input video file
    /// * `output` - Path to the output tape file, opened in append mode
    /// * `options` - Conversion options
    ///
    /// # Example
    ///
    /// ```no_run
    /// use asciitape::{TapeConverter, TapeOptions};
    /// use std::path::Path;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let converter = TapeConverter::new();
    /// let options = TapeOptions::default().with_width(200);
    /// converter.convert_video(
    ///     Path::new("video.mp4"),
    ///     Path::new("video_ascii.txt"),
    ///     &options,
    /// )?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn convert_video(
        &self,
        input: &Path,
        output: &Path,
        options: &TapeOptions,
    ) -> Result<TapeStats> {
        self.convert_video_with_progress(input, output, options, None::<fn(usize, usize)>)
    }

    /// Convert a video into an ASCII tape with a progress callback.
    ///
    /// The callback receives `(completed, total)` after every sampled
    /// timestamp, whether the frame was rendered or skipped.
    pub fn convert_video_with_progress<F>(
        &self,
        input: &Path,
        output: &Path,
        options: &TapeOptions,
        progress_callback: Option<F>,
    ) -> Result<TapeStats>
    where
        F: Fn(usize, usize),
    {
        options.validate()?;

        let timestamps: Vec<u64> =
            sampler::sample_timestamps(options.step_ms, options.duration_ms).collect();
        let total = timestamps.len();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(output)
            .with_context(|| format!("opening {}", output.display()))?;
        let mut sink = FrameSink::new(file, options.delimiter.clone(), options.flush_threshold);

        // One scratch image on disk, overwritten every iteration, removed on drop.
        let scratch = sampler::ScratchFrame::new();
        let mut rendered = 0usize;
        let mut skipped = 0usize;

        for (done, &timestamp_ms) in timestamps.iter().enumerate() {
            let decoded =
                sampler::extract_frame(&self.ffmpeg, input, timestamp_ms, scratch.path())?;
            if !decoded {
                match options.on_decode_failure {
                    FailurePolicy::Abort => {
                        return Err(anyhow!(
                            "Failed to decode frame at {} ms from {}",
                            timestamp_ms,
                            input.display()
                        ));
                    }
                    FailurePolicy::SkipFrame => {
                        skipped += 1;
                        if let Some(ref callback) = progress_callback {
                            callback(done + 1, total);
                        }
                        continue;
                    }
                }
            }

            let frame = image::open(scratch.path())
                .with_context(|| format!("opening extracted frame at {} ms", timestamp_ms))?;
            let ascii_frame =
                rasterize_frame(&frame, &options.palette, options.width, options.height);
            sink.push(ascii_frame)
                .with_context(|| format!("writing {}", output.display()))?;
            rendered += 1;

            if let Some(ref callback) = progress_callback {
                callback(done + 1, total);
            }
        }

        sink.finish()
            .with_context(|| format!("flushing {}", output.display()))?;

        Ok(TapeStats {
            sampled: total,
            rendered,
            skipped,
        })
    }
}

impl Default for TapeConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a decoded frame as a block of ASCII characters.
///
/// The frame is resized to `width` columns by `height` rows (aspect ratio is
/// not preserved when both are given; a `None` or zero height is derived from
/// the source aspect ratio), converted to grayscale, and quantized pixel by
/// pixel in row-major order. Rows are joined with a single newline and there
/// is no trailing newline.
pub fn rasterize_frame(
    frame: &DynamicImage,
    palette: &Palette,
    width: u32,
    height: Option<u32>,
) -> String {
    let (orig_w, orig_h) = (frame.width(), frame.height());
    let target_h = match height {
        Some(h) if h > 0 => h,
        _ => ((orig_h as f32 / orig_w as f32) * width as f32).round().max(1.0) as u32,
    };

    let gray = if width != orig_w || target_h != orig_h {
        frame
            .resize_exact(width, target_h, image::imageops::FilterType::Lanczos3)
            .to_luma8()
    } else {
        frame.to_luma8()
    };

    let (w, h) = gray.dimensions();
    let mut out = String::with_capacity((w as usize + 1) * (h as usize));
    for y in 0..h {
        if y > 0 {
            out.push('\n');
        }
        for x in 0..w {
            out.push(palette.quantize(gray.get_pixel(x, y)[0]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn gray_frame(width: u32, height: u32, pixels: Vec<u8>) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, pixels).unwrap())
    }

    #[test]
    fn quantize_stays_in_range_for_all_luminance_values() {
        for palette_str in ["AB", "ABC", "0123456789X", DEFAULT_PALETTE] {
            let palette = Palette::new(palette_str).unwrap();
            for value in 0..=255u8 {
                let ch = palette.quantize(value);
                assert!(
                    palette_str.contains(ch),
                    "value {} produced {:?}, not in palette {:?}",
                    value,
                    ch,
                    palette_str
                );
            }
        }
    }

    #[test]
    fn quantize_max_luminance_hits_last_bucket() {
        let palette = Palette::new("AB").unwrap();
        assert_eq!(palette.quantize(0), 'A');
        assert_eq!(palette.quantize(127), 'A');
        assert_eq!(palette.quantize(128), 'B');
        assert_eq!(palette.quantize(255), 'B');
    }

    #[test]
    fn quantize_single_character_palette() {
        let palette = Palette::new("#").unwrap();
        assert_eq!(palette.quantize(0), '#');
        assert_eq!(palette.quantize(255), '#');
    }

    #[test]
    fn palette_rejects_empty_and_non_ascii() {
        assert!(Palette::new("").is_err());
        assert!(Palette::new("a\u{2588}b").is_err());
    }

    #[test]
    fn two_pixel_frame_rasterizes_to_both_buckets() {
        let palette = Palette::new("AB").unwrap();
        let frame = gray_frame(2, 1, vec![0, 255]);
        assert_eq!(rasterize_frame(&frame, &palette, 2, Some(1)), "AB");
    }

    #[test]
    fn uniform_frame_rasterizes_to_uniform_characters() {
        let palette = Palette::default();
        let value = 100u8;
        let frame = gray_frame(8, 4, vec![value; 32]);
        let expected = palette.quantize(value);

        let ascii = rasterize_frame(&frame, &palette, 8, Some(4));
        for (y, row) in ascii.lines().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                assert_eq!(ch, expected, "mismatch at ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn rasterized_frame_has_exact_grid_dimensions() {
        let palette = Palette::default();
        let frame = gray_frame(64, 48, vec![50; 64 * 48]);

        let ascii = rasterize_frame(&frame, &palette, 10, Some(5));
        let rows: Vec<&str> = ascii.lines().collect();
        assert_eq!(rows.len(), 5);
        for row in rows {
            assert_eq!(row.chars().count(), 10);
        }
        assert!(!ascii.ends_with('\n'));
    }

    #[test]
    fn omitted_height_derives_from_aspect_ratio() {
        let palette = Palette::default();
        let frame = gray_frame(100, 50, vec![50; 100 * 50]);

        // 50/100 * 40 columns = 20 rows
        let ascii = rasterize_frame(&frame, &palette, 40, None);
        assert_eq!(ascii.lines().count(), 20);

        // An explicit zero behaves like an omitted height
        let ascii = rasterize_frame(&frame, &palette, 40, Some(0));
        assert_eq!(ascii.lines().count(), 20);
    }

    #[test]
    fn default_options_match_the_original_tape_generator() {
        let options = TapeOptions::default();
        assert_eq!(options.width, 300);
        assert_eq!(options.height, Some(90));
        assert_eq!(options.step_ms, 100);
        assert_eq!(options.duration_ms, 100_000);
        assert_eq!(options.delimiter, "SPLIT");
        assert_eq!(options.on_decode_failure, FailurePolicy::Abort);
        assert_eq!(options.palette.len(), DEFAULT_PALETTE.len());
    }

    #[test]
    fn options_validation_rejects_zero_width_and_step() {
        assert!(TapeOptions::default().with_width(0).validate().is_err());
        assert!(TapeOptions::default().with_step_ms(0).validate().is_err());
        assert!(TapeOptions::default().validate().is_ok());
    }

    #[test]
    fn default_config_exposes_the_three_presets() {
        let config = AppConfig::default();
        assert_eq!(config.default_preset, "default");
        for name in ["default", "small", "large"] {
            assert!(config.presets.contains_key(name), "missing preset {}", name);
        }
        assert_eq!(config.palette, DEFAULT_PALETTE);
        assert_eq!(config.delimiter, DEFAULT_DELIMITER);
    }

    #[test]
    fn options_from_preset_translates_zero_height() {
        let converter = TapeConverter::new();
        let options = converter.options_from_preset("large").unwrap();
        assert_eq!(options.height, None);

        let options = converter.options_from_preset("default").unwrap();
        assert_eq!(options.height, Some(90));

        assert!(converter.options_from_preset("missing").is_err());
    }
}
