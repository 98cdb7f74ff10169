//! Per-connection session state machine
//!
//! ```text
//! AwaitingRequest -> Validating -> Dispatching -> Streaming/Replying -> Done
//!        ^                                                               |
//!        +-------------------- persistent connection -------------------+
//! ```
//!
//! A request whose version does not match gets one `506` and goes straight to
//! `Done`; an unknown method gets one `501`. The session closes on end of
//! stream, a malformed request, a transport error, a handler fault, shutdown,
//! or after the first request when connections are not persistent.

use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::ReplyContext;
use super::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::Result;
use crate::protocol::{DEFAULT_MAX_FRAME_LEN, Message, Status, read_frame};

/// Where a session is in its request cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next request frame
    AwaitingRequest,
    /// Checking the declared protocol version
    Validating,
    /// Looking up and running the handler
    Dispatching,
    /// Interim replies are being sent; the final reply ends the stream
    Streaming,
    /// A single final reply was sent with no interim replies
    Replying,
    /// The request is finished
    Done,
}

impl SessionState {
    pub(crate) fn advance(&mut self, next: SessionState, peer: &str) {
        if *self != next {
            debug!(peer, from = %self, to = %next, "session state");
            *self = next;
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingRequest => "awaiting-request",
            SessionState::Validating => "validating",
            SessionState::Dispatching => "dispatching",
            SessionState::Streaming => "streaming",
            SessionState::Replying => "replying",
            SessionState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Connection handling options
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Serve further requests after the first one
    pub persistent: bool,
    /// Largest accepted request frame
    pub max_frame_len: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            persistent: true,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// One client connection
pub struct Session<R, W> {
    reader: BufReader<R>,
    writer: W,
    peer: String,
    dispatcher: Arc<Dispatcher>,
    options: SessionOptions,
    shutdown: CancellationToken,
    state: SessionState,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Create a session over the two halves of a connection
    pub fn new(
        reader: R,
        writer: W,
        peer: impl Into<String>,
        dispatcher: Arc<Dispatcher>,
        options: SessionOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            peer: peer.into(),
            dispatcher,
            options,
            shutdown,
            state: SessionState::AwaitingRequest,
        }
    }

    /// Serve requests until the session closes
    ///
    /// Returns `Ok` when the session ended normally (including the client
    /// going away) and an error for a malformed request or a transport
    /// failure. Either way the connection is finished.
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.state.advance(SessionState::AwaitingRequest, &self.peer);

            let frame = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    debug!(peer = %self.peer, "server shutting down, closing idle connection");
                    return Ok(());
                }
                frame = read_frame(&mut self.reader, self.options.max_frame_len) => frame?,
            };
            let Some(payload) = frame else {
                info!(peer = %self.peer, "client closed connection");
                return Ok(());
            };

            let request = Message::decode(&payload)?;
            let keep_open = self.serve(&request).await?;
            self.state.advance(SessionState::Done, &self.peer);

            if !keep_open || !self.options.persistent || self.shutdown.is_cancelled() {
                debug!(peer = %self.peer, "closing connection");
                return Ok(());
            }
        }
    }

    /// Validate and dispatch one request; `Ok(false)` closes the connection
    async fn serve(&mut self, request: &Message) -> Result<bool> {
        self.state.advance(SessionState::Validating, &self.peer);
        let dispatcher = Arc::clone(&self.dispatcher);
        let version = dispatcher.version();

        let mut ctx = ReplyContext::new(
            &mut self.writer,
            &mut self.reader,
            version,
            &self.shutdown,
            &mut self.state,
            &self.peer,
        );

        if !version.verify(&request.protocol) {
            warn!(
                peer = ctx.peer(),
                declared = %request.protocol,
                supported = %version,
                "protocol version mismatch"
            );
            return match ctx.send(&Status::PROTOCOL_NOT_SUPPORTED, "").await {
                Ok(()) => Ok(true),
                Err(e) if e.is_disconnect() => Ok(false),
                Err(e) => Err(e),
            };
        }

        ctx.advance_state(SessionState::Dispatching);
        info!(
            peer = ctx.peer(),
            method = %request.method,
            path = %request.path,
            "request"
        );

        Ok(match dispatcher.dispatch(request, &mut ctx).await {
            DispatchOutcome::Completed | DispatchOutcome::Rejected => true,
            DispatchOutcome::Failed | DispatchOutcome::Disconnected => false,
        })
    }
}
