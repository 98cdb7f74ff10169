//! Archive extraction collaborator
//!
//! The server never extracts archives itself. It hands the archive to an
//! [`Extractor`], which runs the work out of process and reports back a stream
//! of [`ExtractionEvent`]s: zero or more progress percentages followed by
//! exactly one exit outcome.
//!
//! ## Implementations
//!
//! - [`UnrarExtractor`]: runs the external `unrar` binary and scans its output
//!   for percentages
//! - [`NoOpExtractor`]: used when no `unrar` binary is available; every start
//!   fails with [`Error::NotSupported`](crate::Error::NotSupported)
//!
//! ## Usage
//!
//! ```no_run
//! use remote_unpack::extraction::{ExtractionEvent, Extractor, UnrarExtractor};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extractor = UnrarExtractor::from_path().expect("unrar binary not found");
//!     let mut job = extractor
//!         .start(Path::new("movie.rar"), Path::new("out"))
//!         .await?;
//!
//!     while let Some(event) = job.next_event().await {
//!         match event {
//!             ExtractionEvent::Progress(pct) => println!("{pct}%"),
//!             ExtractionEvent::Exited(outcome) => println!("finished: {outcome}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod exit_code;
mod noop;
mod progress;
mod traits;
mod unrar;

pub use exit_code::explain_exit_code;
pub use noop::NoOpExtractor;
pub use progress::ProgressScanner;
pub use traits::{EVENT_CHANNEL_CAPACITY, ExitOutcome, ExtractionEvent, ExtractionJob, Extractor};
pub use unrar::{DEFAULT_TERMINATE_GRACE, UnrarExtractor};
