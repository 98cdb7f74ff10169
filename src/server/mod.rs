//! TCP server
//!
//! One accept loop hands every connection to its own task running a
//! [`Session`]. Sessions are tracked so that [`Server::run`] returns only
//! after every connection has finished once shutdown was requested.
//!
//! ```no_run
//! use remote_unpack::config::Config;
//! use remote_unpack::extraction::UnrarExtractor;
//! use remote_unpack::server::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let extractor = Arc::new(UnrarExtractor::from_path().expect("unrar not found"));
//!     let server = Server::bind(&config, extractor).await?;
//!
//!     let shutdown = server.shutdown_token();
//!     tokio::spawn(async move {
//!         remote_unpack::server::wait_for_signal().await;
//!         shutdown.cancel();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::extraction::Extractor;
use crate::protocol::ProtocolVersion;

mod context;
mod dispatcher;
pub mod handlers;
mod relay;
mod session;

pub use context::ReplyContext;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use handlers::{ListHandler, MethodHandler, UnpackHandler};
pub use relay::ProgressRelay;
pub use session::{Session, SessionOptions, SessionState};

#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

/// Pause after a failed accept, so a persistent failure such as running out
/// of file descriptors does not spin the loop
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Dispatcher serving `get` and `unpack` as configured
pub fn build_dispatcher(config: &Config, extractor: Arc<dyn Extractor>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(ProtocolVersion::new(config.protocol_version.clone()));
    dispatcher.register("get", Arc::new(ListHandler));
    dispatcher.register(
        "unpack",
        Arc::new(UnpackHandler::new(extractor, config.unpack.clone())),
    );
    dispatcher
}

/// The remote-unpack TCP server
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    options: SessionOptions,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Server {
    /// Validate `config` and bind its listening address
    pub async fn bind(config: &Config, extractor: Arc<dyn Extractor>) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.server.bind_address()).await?;
        let options = SessionOptions {
            persistent: config.server.persistent_connections,
            max_frame_len: config.server.max_frame_len,
        };
        Ok(Self::from_listener(
            listener,
            build_dispatcher(config, extractor),
            options,
        ))
    }

    /// Serve on an already bound listener with a custom dispatcher
    pub fn from_listener(
        listener: TcpListener,
        dispatcher: Dispatcher,
        options: SessionOptions,
    ) -> Self {
        Self {
            listener,
            dispatcher: Arc::new(dispatcher),
            options,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown, then wait for open sessions
    ///
    /// On shutdown idle sessions close at once; a session in the middle of an
    /// extraction terminates the tool, reports its exit status, then closes.
    pub async fn run(self) -> Result<()> {
        info!(
            addr = ?self.listener.local_addr().ok(),
            version = %self.dispatcher.version(),
            methods = ?self.dispatcher.methods(),
            "server listening"
        );

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(stream, peer),
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        self.tracker.close();
        info!(sessions = self.tracker.len(), "shutting down, waiting for open sessions");
        self.tracker.wait().await;
        info!("server stopped");
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        info!(%peer, "client connected");
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "could not disable Nagle's algorithm");
        }

        let (reader, writer) = stream.into_split();
        let session = Session::new(
            reader,
            writer,
            peer.to_string(),
            Arc::clone(&self.dispatcher),
            self.options,
            self.shutdown.child_token(),
        );
        self.tracker.spawn(async move {
            match session.run().await {
                Ok(()) => debug!(%peer, "session ended"),
                Err(e) => warn!(%peer, error = %e, "session ended with error"),
            }
        });
    }
}

/// Wait for SIGTERM or Ctrl+C
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                () = ctrl_c() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "could not register SIGTERM handler, waiting for Ctrl+C only");
            ctrl_c().await;
        }
    }
}

/// Wait for Ctrl+C
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received SIGINT (Ctrl+C)"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            futures::future::pending::<()>().await;
        }
    }
}
