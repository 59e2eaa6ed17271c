//! Example: Convert a video to an ASCII tape using asciitape as a library
//!
//! Run with: cargo run --example simple_tape

use asciitape::{TapeConverter, TapeOptions};
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create a converter
    let converter = TapeConverter::new();

    // Sample the first five seconds, four frames per second
    let options = TapeOptions::default()
        .with_width(120)
        .with_height(Some(36))
        .with_step_ms(250)
        .with_duration_ms(5_000);

    let input = Path::new("tests/fixtures/sample_video.mp4");
    let output = Path::new("sample_tape.txt");

    if input.exists() {
        println!("Converting video to an ASCII tape...");
        println!("Input: {}", input.display());
        println!("Output: {}", output.display());

        let stats = converter.convert_video(input, output, &options)?;

        println!("✓ Tape complete!");
        println!(
            "{} timestamps sampled, {} frames rendered, {} skipped",
            stats.sampled, stats.rendered, stats.skipped
        );
    } else {
        println!("Note: {} not found.", input.display());
        println!("To use this example, provide a video file at that path.");
    }

    Ok(())
}
