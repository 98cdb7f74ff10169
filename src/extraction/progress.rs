//! Percentage scanning of extraction tool output
//!
//! unrar redraws its progress counter in place with backspaces, so output
//! looks like `"  0%\b\b\b\b 40%\b\b\b\b100%\b\b\b\b"`. The scanner splits
//! the byte stream into tokens on whitespace and backspace and reports every
//! `([0-9]{1,3})%` match in each token, in order.

use regex::Regex;
use std::sync::LazyLock;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

use super::traits::ExtractionEvent;

/// Longest token kept before it is scanned regardless of separators
const MAX_TOKEN_LEN: usize = 4096;

#[allow(clippy::expect_used)]
static PERCENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{1,3})%").expect("progress pattern is a valid regex"));

/// Incremental tokenizer that extracts percentages from raw output chunks
///
/// Chunk boundaries may fall anywhere, including inside a number: an
/// unterminated token is carried over to the next [`feed`](Self::feed).
#[derive(Debug, Default)]
pub struct ProgressScanner {
    pending: Vec<u8>,
}

impl ProgressScanner {
    /// Create an empty scanner
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of output and return the percentages of every token it
    /// completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut found = Vec::new();
        for &byte in chunk {
            if is_separator(byte) {
                self.scan_pending(&mut found);
                continue;
            }
            if self.pending.len() >= MAX_TOKEN_LEN {
                self.scan_pending(&mut found);
            }
            self.pending.push(byte);
        }
        found
    }

    /// Scan whatever token is still pending at end of output
    pub fn finish(&mut self) -> Vec<u8> {
        let mut found = Vec::new();
        self.scan_pending(&mut found);
        found
    }

    fn scan_pending(&mut self, found: &mut Vec<u8>) {
        if self.pending.is_empty() {
            return;
        }
        let token = String::from_utf8_lossy(&self.pending);
        found.extend(
            PERCENT_PATTERN
                .captures_iter(&token)
                .filter_map(|caps| caps.get(1)?.as_str().parse::<u8>().ok())
                .filter(|pct| *pct <= 100),
        );
        self.pending.clear();
    }
}

fn is_separator(byte: u8) -> bool {
    byte.is_ascii_whitespace() || byte == b'\x08'
}

/// Read `output` to its end, sending a progress event for every percentage
///
/// Stops early if the receiving side has gone away. Read errors end the scan;
/// the exit status is reported separately by whoever waits on the process.
pub(crate) async fn scan_output<R>(mut output: R, events: mpsc::Sender<ExtractionEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut scanner = ProgressScanner::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = match output.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "stopped reading tool output");
                break;
            }
        };
        for pct in scanner.feed(&buf[..n]) {
            if events.send(ExtractionEvent::Progress(pct)).await.is_err() {
                return;
            }
        }
    }
    for pct in scanner.finish() {
        if events.send(ExtractionEvent::Progress(pct)).await.is_err() {
            return;
        }
    }
}
