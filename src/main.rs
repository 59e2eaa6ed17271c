use anyhow::{anyhow, Context, Result};
use asciitape::{AppConfig, FailurePolicy, FfmpegConfig, Palette, TapeConverter, TapeOptions};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

fn load_config() -> Result<AppConfig> {
    // Look for asciitape.json in app support, current dir fallback, then built-in default
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(mut d) = dirs::data_dir() {
        d.push("asciitape");
        d.push("asciitape.json");
        tried.push(d);
    }
    tried.push(PathBuf::from("asciitape.json"));

    for p in &tried {
        if p.exists() {
            let text =
                fs::read_to_string(p).with_context(|| format!("reading config {}", p.display()))?;
            let cfg: AppConfig = serde_json::from_str(&text).context("parsing config json")?;

            // Validate that the palette contains only ASCII characters
            if !cfg.palette.is_ascii() {
                return Err(anyhow!(
                    "Config file {} contains non-ASCII characters in palette field. \
                    This will cause corrupted output. Please use only ASCII characters.",
                    p.display()
                ));
            }

            return Ok(cfg);
        }
    }

    // Built-in defaults
    Ok(AppConfig::default())
}

#[derive(Parser, Debug)]
#[command(version, about = "Batch video to ASCII tape converter.")]
struct Args {
    /// Input video file
    input: PathBuf,

    /// Output tape file (defaults to <input-stem>_ascii.txt)
    out: Option<PathBuf>,

    /// Frame width in characters (columns)
    #[arg(long)]
    width: Option<u32>,

    /// Frame height in rows (0 derives the height from the aspect ratio)
    #[arg(long)]
    height: Option<u32>,

    /// Milliseconds between sampled timestamps
    #[arg(long)]
    step_ms: Option<u64>,

    /// Clip length to sample, in milliseconds
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Buffered frames per batched write
    #[arg(long)]
    flush_threshold: Option<usize>,

    /// Literal placed between consecutive frames
    #[arg(long)]
    delimiter: Option<String>,

    /// Character palette, densest to sparsest
    #[arg(long)]
    palette: Option<String>,

    /// Skip timestamps whose frame fails to decode instead of aborting
    #[arg(long, default_value_t = false)]
    skip_bad_frames: bool,

    /// Use smaller default values for quality settings
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["large"])]
    small: bool,

    /// Use larger default values for quality settings
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["small"])]
    large: bool,

    /// ffmpeg binary used for frame extraction
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Log generation details to standard output
    #[arg(long, default_value_t = false)]
    log_details: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !args.input.is_file() {
        return Err(anyhow!("Input path does not exist: {}", args.input.display()));
    }

    let cfg = load_config()?;
    let active_preset_name: String = if args.small {
        "small".to_string()
    } else if args.large {
        "large".to_string()
    } else {
        cfg.default_preset.clone()
    };

    let mut converter = TapeConverter::with_config(cfg)?;
    if let Some(cmd) = &args.ffmpeg {
        converter = converter.with_ffmpeg(FfmpegConfig::with_command(cmd));
    }

    let mut options = converter.options_from_preset(&active_preset_name)?;
    if let Some(width) = args.width {
        options.width = width;
    }
    if let Some(height) = args.height {
        options.height = if height == 0 { None } else { Some(height) };
    }
    if let Some(step_ms) = args.step_ms {
        options.step_ms = step_ms;
    }
    if let Some(duration_ms) = args.duration_ms {
        options.duration_ms = duration_ms;
    }
    if let Some(flush_threshold) = args.flush_threshold {
        options.flush_threshold = flush_threshold;
    }
    if let Some(delimiter) = &args.delimiter {
        options.delimiter = delimiter.clone();
    }
    if let Some(palette) = &args.palette {
        options.palette = Palette::new(palette)?;
    }
    if args.skip_bad_frames {
        options.on_decode_failure = FailurePolicy::SkipFrame;
    }

    let output_path = args
        .out
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));

    println!("Sampling video frames...");

    // Create progress bar (initialized once the total is known)
    let progress_bar: Arc<Mutex<Option<ProgressBar>>> = Arc::new(Mutex::new(None));
    let pb_clone = Arc::clone(&progress_bar);

    let stats = converter.convert_video_with_progress(
        &args.input,
        &output_path,
        &options,
        Some(move |completed: usize, total: usize| {
            let mut pb_guard = pb_clone.lock().unwrap();
            if pb_guard.is_none() {
                // Initialize progress bar on first callback
                let pb = ProgressBar::new(total as u64);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
                        .unwrap()
                        .progress_chars("#>-"),
                );
                pb.set_message("Rendering frames");
                *pb_guard = Some(pb);
            }
            if let Some(ref pb) = *pb_guard {
                pb.set_position(completed as u64);
            }
        }),
    )?;

    // Finish the progress bar
    let pb_opt = progress_bar.lock().unwrap().take();
    if let Some(pb) = pb_opt {
        pb.finish_with_message("Done");
    }

    println!("\nASCII tape complete in {}", output_path.display());

    if args.log_details {
        let details = format!(
            "Version: {}\nSampled: {}\nRendered: {}\nSkipped: {}\nWidth: {}\nHeight: {}\nStep: {} ms\nDuration: {} ms",
            env!("CARGO_PKG_VERSION"),
            stats.sampled,
            stats.rendered,
            stats.skipped,
            options.width,
            options
                .height
                .map(|h| h.to_string())
                .unwrap_or_else(|| "auto".to_string()),
            options.step_ms,
            options.duration_ms
        );
        println!("\n--- Generation Details ---");
        println!("{}", details);
    }

    Ok(())
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    let mut output = input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    output.push(format!("{stem}_ascii.txt"));
    output
}
