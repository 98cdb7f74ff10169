//! # remote-unpack
//!
//! A small TCP service that lists directories and unpacks RAR archives on the
//! machine it runs on, streaming extraction progress back to the client.
//!
//! ## Overview
//!
//! - **Framing** - every message is a 4-byte big-endian length followed by a
//!   UTF-8 JSON object ([`protocol::frame`])
//! - **Version gate** - a request is served only if it declares the server's
//!   exact protocol version (`RU/0.4` by default)
//! - **Methods** - `get` lists a directory, `unpack` runs `unrar` and relays
//!   its percentages as `206 Partial Content` replies
//! - **Sessions** - one task per connection; persistent connections serve
//!   requests until the client closes
//!
//! ## Quick Start
//!
//! ```no_run
//! use remote_unpack::{Config, Server, UnrarExtractor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let extractor = Arc::new(UnrarExtractor::from_path().ok_or("unrar not found")?);
//!     let server = Server::bind(&config, extractor).await?;
//!     println!("listening on {}", server.local_addr()?);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Protocol client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Archive extraction through the external `unrar` tool
pub mod extraction;
/// Tracing subscriber setup for the binaries
pub mod logging;
/// Wire protocol: framing, messages, status codes, version gate
pub mod protocol;
/// TCP server, sessions and method handlers
pub mod server;

// Re-export commonly used types
pub use client::Client;
pub use config::{Config, ServerConfig, ToolsConfig, UnpackConfig};
pub use error::{Error, Result, ToReplyStatus};
pub use extraction::{ExitOutcome, ExtractionEvent, Extractor, NoOpExtractor, UnrarExtractor};
pub use protocol::{Data, Message, ProtocolVersion, Status};
pub use server::{Dispatcher, MethodHandler, ReplyContext, Server, wait_for_signal};
