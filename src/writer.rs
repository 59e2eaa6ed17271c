use std::io::{self, Write};

/// Buffered sink for finished ASCII frames.
///
/// The first frame goes out immediately so the tape starts materializing at
/// once; later frames accumulate in memory and go out in batches of
/// `flush_threshold`. Exactly one delimiter separates every consecutive pair
/// of frames, across batch boundaries included, with no leading or trailing
/// delimiter.
pub struct FrameSink<W: Write> {
    out: W,
    delimiter: String,
    flush_threshold: usize,
    buffer: Vec<String>,
    frames_written: usize,
}

impl<W: Write> FrameSink<W> {
    /// Create a sink over `out`. A zero threshold behaves like 1.
    pub fn new(out: W, delimiter: String, flush_threshold: usize) -> Self {
        Self {
            out,
            delimiter,
            flush_threshold: flush_threshold.max(1),
            buffer: Vec::new(),
            frames_written: 0,
        }
    }

    /// Append one frame to the tape.
    pub fn push(&mut self, frame: String) -> io::Result<()> {
        if self.frames_written == 0 {
            return self.write_batch(&[frame]);
        }
        self.buffer.push(frame);
        if self.buffer.len() >= self.flush_threshold {
            self.flush_buffered()?;
        }
        Ok(())
    }

    /// Flush any buffered remainder and return the total frame count.
    pub fn finish(mut self) -> io::Result<usize> {
        self.flush_buffered()?;
        self.out.flush()?;
        Ok(self.frames_written)
    }

    fn flush_buffered(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.write_batch(&batch)
    }

    fn write_batch(&mut self, frames: &[String]) -> io::Result<()> {
        let cap = frames
            .iter()
            .map(|frame| frame.len() + self.delimiter.len())
            .sum();
        let mut chunk = String::with_capacity(cap);
        for frame in frames {
            // Frames already on the tape get a delimiter before each newcomer.
            if self.frames_written > 0 || !chunk.is_empty() {
                chunk.push_str(&self.delimiter);
            }
            chunk.push_str(frame);
        }
        self.out.write_all(chunk.as_bytes())?;
        self.frames_written += frames.len();
        Ok(())
    }
}
