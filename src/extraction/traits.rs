//! Traits and types for archive extraction

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::Path;
use std::process::ExitStatus;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::exit_code::explain_exit_code;
use crate::protocol::Status;

/// Capacity of the bounded event channel between an extraction and its consumer
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One observation from a running extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionEvent {
    /// A percentage (0..=100) found in the tool's output
    Progress(u8),
    /// The tool has finished; always the last event of a job
    Exited(ExitOutcome),
}

/// How an extraction process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with a status code
    Code(i32),
    /// Terminated by a signal before it could report a status (unix only)
    Signal(i32),
    /// The exit status could not be obtained
    Failed(String),
}

impl ExitOutcome {
    /// Whether the extraction completed successfully
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Code(0))
    }

    /// Classify the result of waiting on a child process
    pub fn from_wait(result: io::Result<ExitStatus>) -> Self {
        match result {
            Ok(status) => match status.code() {
                Some(code) => ExitOutcome::Code(code),
                None => Self::from_signal(status),
            },
            Err(e) => ExitOutcome::Failed(format!("failed to wait for process: {e}")),
        }
    }

    #[cfg(unix)]
    fn from_signal(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        match status.signal() {
            Some(signal) => ExitOutcome::Signal(signal),
            None => ExitOutcome::Failed(format!("process ended without exit code: {status}")),
        }
    }

    #[cfg(not(unix))]
    fn from_signal(status: ExitStatus) -> Self {
        ExitOutcome::Failed(format!("process ended without exit code: {status}"))
    }

    /// Status of the final reply reporting this outcome
    ///
    /// Exit codes map through the unrar exit table; signals and wait failures
    /// are an internal error.
    pub fn status(&self) -> Status {
        match self {
            ExitOutcome::Code(code) => Status::for_exit_code(*code),
            ExitOutcome::Signal(_) | ExitOutcome::Failed(_) => Status::INTERNAL_ERROR,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Code(code) => match explain_exit_code(*code) {
                Some(explanation) => write!(f, "exit code {code} ({explanation})"),
                None => write!(f, "exit code {code}"),
            },
            ExitOutcome::Signal(signal) => write!(f, "terminated by signal {signal}"),
            ExitOutcome::Failed(reason) => f.write_str(reason),
        }
    }
}

/// Handle to a running extraction
///
/// Events arrive in the order the tool produced them, with
/// [`ExtractionEvent::Exited`] last. Dropping the job cancels the extraction.
pub struct ExtractionJob {
    events: mpsc::Receiver<ExtractionEvent>,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl ExtractionJob {
    /// Wrap the receiving end of an event channel and the token that stops
    /// the producer
    pub fn new(events: mpsc::Receiver<ExtractionEvent>, cancel: CancellationToken) -> Self {
        let guard = cancel.clone().drop_guard();
        Self {
            events,
            cancel,
            _cancel_on_drop: guard,
        }
    }

    /// Next event, or `None` once the producer has gone away
    pub async fn next_event(&mut self) -> Option<ExtractionEvent> {
        self.events.recv().await
    }

    /// Ask the extraction to stop
    ///
    /// The job keeps yielding events; the exit outcome of the terminated
    /// process still arrives.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for ExtractionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionJob")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Trait for archive extraction backends
///
/// Implementations can run an external binary, or provide stub functionality
/// when no extraction tool is available.
///
/// # Examples
///
/// ```
/// use remote_unpack::extraction::{Extractor, NoOpExtractor};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() {
/// let extractor = NoOpExtractor;
/// let result = extractor.start(Path::new("a.rar"), Path::new("out")).await;
/// assert!(result.is_err());
/// # }
/// ```
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Start extracting `archive` into `destination`
    ///
    /// Returns as soon as the extraction is running; progress and the exit
    /// outcome are delivered through the returned job.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The destination cannot be created
    /// - The external binary cannot be started
    /// - Extraction is not supported (for stub implementations)
    async fn start(&self, archive: &Path, destination: &Path) -> crate::Result<ExtractionJob>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
