//! Client side of the protocol
//!
//! A [`Client`] owns one connection. [`Client::request`] sends a single
//! request and collects the reply stream up to its final reply, handing
//! interim replies (`202`, `206`) to a callback as they arrive.
//!
//! ```no_run
//! use remote_unpack::client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("localhost:1337", "RU/0.4").await?;
//!     let last = client
//!         .request("unpack", "/srv/incoming/movie.rar", |reply| {
//!             println!("{} {} {:?}", reply.code, reply.phrase, reply.data);
//!         })
//!         .await?;
//!     println!("finished with {}", last.code);
//!     Ok(())
//! }
//! ```

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{DEFAULT_MAX_FRAME_LEN, Message, read_frame, write_frame};

/// A connection to a remote-unpack server
#[derive(Debug)]
pub struct Client<S = TcpStream> {
    stream: S,
    protocol: String,
    max_frame_len: u32,
}

impl Client<TcpStream> {
    /// Connect over TCP, declaring `protocol` on every request
    pub async fn connect(addr: impl ToSocketAddrs, protocol: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "connected");
        Ok(Self::from_stream(stream, protocol))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Speak the protocol over an already open stream
    pub fn from_stream(stream: S, protocol: impl Into<String>) -> Self {
        Self {
            stream,
            protocol: protocol.into(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Largest reply frame accepted
    pub fn max_frame_len(mut self, max_len: u32) -> Self {
        self.max_frame_len = max_len;
        self
    }

    /// Protocol version declared on requests
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Send one message
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        trace!(method = %message.method, path = %message.path, "sending request");
        write_frame(&mut self.stream, &message.encode()?).await
    }

    /// Receive one message; `None` once the server closed the connection
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        match read_frame(&mut self.stream, self.max_frame_len).await? {
            Some(payload) => Ok(Some(Message::decode(&payload)?)),
            None => Ok(None),
        }
    }

    /// Send a request and read replies up to the final one
    ///
    /// Every reply, including the final one, is passed to `on_reply`. The
    /// final reply is also returned. A connection closed before the final
    /// reply is [`Error::Disconnected`].
    pub async fn request<F>(&mut self, method: &str, path: &str, mut on_reply: F) -> Result<Message>
    where
        F: FnMut(&Message),
    {
        let request = Message::request(method, path, self.protocol.clone());
        self.send(&request).await?;

        loop {
            let Some(reply) = self.recv().await? else {
                return Err(Error::Disconnected(
                    "server closed the connection before the final reply".into(),
                ));
            };
            on_reply(&reply);
            if reply.is_final() {
                debug!(code = %reply.code, phrase = %reply.phrase, "request finished");
                return Ok(reply);
            }
        }
    }

    /// Close the write half so the server sees end of stream
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
