//! Per-request reply context handed to method handlers

use futures::future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::session::SessionState;
use crate::error::{Error, Result};
use crate::protocol::{Data, Message, ProtocolVersion, Status, write_frame};

/// Everything a handler needs to answer one request
///
/// Replies are stamped with the server's protocol version and written
/// immediately, in call order. The context also tracks the session state
/// and lets a streaming handler notice that the client went away.
pub struct ReplyContext<'a> {
    writer: &'a mut (dyn AsyncWrite + Unpin + Send),
    reader: &'a mut (dyn AsyncBufRead + Unpin + Send),
    version: &'a ProtocolVersion,
    shutdown: &'a CancellationToken,
    state: &'a mut SessionState,
    peer: &'a str,
    replies_sent: usize,
    final_sent: bool,
    watch_peer: bool,
}

impl<'a> ReplyContext<'a> {
    pub(crate) fn new(
        writer: &'a mut (dyn AsyncWrite + Unpin + Send),
        reader: &'a mut (dyn AsyncBufRead + Unpin + Send),
        version: &'a ProtocolVersion,
        shutdown: &'a CancellationToken,
        state: &'a mut SessionState,
        peer: &'a str,
    ) -> Self {
        Self {
            writer,
            reader,
            version,
            shutdown,
            state,
            peer,
            replies_sent: 0,
            final_sent: false,
            watch_peer: true,
        }
    }

    /// Send one reply
    ///
    /// `202` and `206` are interim and move the session into streaming; any
    /// other status is the final reply of the request, after which nothing
    /// more may be sent. A final reply with no interim reply before it is the
    /// replying branch of the state machine.
    ///
    /// # Errors
    ///
    /// - [`Error::Disconnected`] if the peer is gone
    /// - [`Error::Other`] if the final reply was already sent
    pub async fn send(&mut self, status: &Status, data: impl Into<Data>) -> Result<()> {
        if self.final_sent {
            return Err(Error::Other(format!(
                "reply {status} after the final reply of the request"
            )));
        }

        let message = Message::reply(self.version.as_str(), status, data);
        let payload = message.encode()?;
        write_frame(&mut *self.writer, &payload)
            .await
            .map_err(|e| match e {
                Error::Io(io) if crate::error::is_disconnect_kind(io.kind()) => {
                    Error::Disconnected(io.to_string())
                }
                other => other,
            })?;

        self.replies_sent += 1;
        trace!(peer = self.peer, %status, "sent reply");
        if status.is_final() {
            self.final_sent = true;
            if *self.state != SessionState::Streaming {
                self.state.advance(SessionState::Replying, self.peer);
            }
        } else {
            self.state.advance(SessionState::Streaming, self.peer);
        }
        Ok(())
    }

    /// Resolves once reading from the client fails
    ///
    /// Looks at the buffered read half without consuming anything. A clean
    /// end of stream is a half-close: the client may still be reading, so
    /// watching stops and this future never resolves. The same happens when
    /// the client sends more data (a pipelined request), which stays buffered
    /// for the session. A client that is really gone shows up as a read error
    /// here or as a failed [`send`](Self::send).
    pub async fn connection_lost(&mut self) {
        if self.watch_peer {
            match self.reader.fill_buf().await {
                Ok([]) => {
                    debug!(peer = self.peer, "client closed its write half");
                    self.watch_peer = false;
                }
                Ok(_) => {
                    debug!(peer = self.peer, "client sent data while a request is running");
                    self.watch_peer = false;
                }
                Err(e) => {
                    debug!(peer = self.peer, error = %e, "read half failed");
                    return;
                }
            }
        }
        future::pending::<()>().await
    }

    pub(crate) fn advance_state(&mut self, next: SessionState) {
        self.state.advance(next, self.peer);
    }

    /// Token cancelled when the server shuts down
    pub fn shutdown(&self) -> &CancellationToken {
        self.shutdown
    }

    /// Protocol version stamped on every reply
    pub fn version(&self) -> &ProtocolVersion {
        self.version
    }

    /// Address of the client, for logging
    pub fn peer(&self) -> &str {
        self.peer
    }

    /// Number of replies sent for this request
    pub fn replies_sent(&self) -> usize {
        self.replies_sent
    }

    /// Whether the final reply of this request has been sent
    pub fn final_sent(&self) -> bool {
        self.final_sent
    }
}
