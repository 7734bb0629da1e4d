use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Reads fixed-size blocks from a byte stream.
///
/// Iteration stops at end-of-stream or at the first read error. A short final block, i.e.,
/// fewer than `block_len` bytes before end-of-stream, is not provided; its length is
/// available from [FrameReader::truncated].
///
/// # Example
/// ```
/// use downlink::framing::FrameReader;
///
/// let dat = vec![0u8; 2500];
/// let mut reader = FrameReader::new(&dat[..], 1024);
/// let blocks: Vec<Vec<u8>> = reader.by_ref().collect();
/// assert_eq!(blocks.len(), 2);
/// assert_eq!(reader.truncated(), 452);
/// ```
pub struct FrameReader<R: Read> {
    reader: R,
    block_len: usize,
    consumed: u64,
    truncated: usize,
    error: Option<std::io::Error>,
    done: bool,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, block_len: usize) -> Self {
        FrameReader {
            reader,
            block_len,
            consumed: 0,
            truncated: 0,
            error: None,
            done: false,
        }
    }

    /// Total number of bytes read so far, including any truncated trailing bytes.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Number of trailing bytes dropped because they did not make a complete block.
    pub fn truncated(&self) -> usize {
        self.truncated
    }

    /// Take the error that stopped iteration early, if any.
    pub fn take_error(&mut self) -> Option<std::io::Error> {
        self.error.take()
    }

    /// Fill `buf` as far as possible, returning the number of bytes read. Only returns fewer
    /// than `buf.len()` bytes at end-of-stream or on error.
    fn fill(&mut self, buf: &mut [u8]) -> usize {
        let mut got = 0;
        while got < buf.len() {
            match self.reader.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!("read failed after {} bytes: {err}", self.consumed + got as u64);
                    self.error = Some(err);
                    break;
                }
            }
        }
        got
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.block_len == 0 {
            return None;
        }
        let mut buf = vec![0u8; self.block_len];
        let got = self.fill(&mut buf);
        self.consumed += got as u64;

        if got == self.block_len {
            return Some(buf);
        }

        self.done = true;
        if got > 0 {
            warn!(
                bytes = got,
                expected = self.block_len,
                "short final block; input is truncated, dropping"
            );
            self.truncated = got;
        }
        None
    }
}

/// Rate limited progress logging based on the number of bytes consumed from an input of
/// known size.
pub struct Progress {
    total: u64,
    interval: Duration,
    last: Option<Instant>,
}

impl Progress {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

    pub fn new(total: u64) -> Self {
        Progress {
            total,
            interval: Self::DEFAULT_INTERVAL,
            last: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Percent complete, rounded to a tenth of a percent.
    pub fn percent(&self, consumed: u64) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        let pct = consumed.min(self.total) as f64 / self.total as f64 * 100.0;
        (pct * 10.0).round() / 10.0
    }

    /// Log progress if at least the configured interval has passed since the last report.
    /// Returns true if a report was logged.
    pub fn update(&mut self, consumed: u64) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        self.last = Some(now);
        info!(progress = self.percent(consumed), "reading input");
        true
    }
}
