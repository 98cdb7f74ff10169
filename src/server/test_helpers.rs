//! Shared test helpers: a scripted extractor and an in-memory session harness.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{DuplexStream, duplex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::UnpackConfig;
use crate::error::{Error, Result};
use crate::extraction::{
    EVENT_CHANNEL_CAPACITY, ExitOutcome, ExtractionEvent, ExtractionJob, Extractor,
};
use crate::protocol::{DEFAULT_MAX_FRAME_LEN, Message, ProtocolVersion, read_frame, write_frame};
use crate::server::{Dispatcher, ListHandler, Session, SessionOptions, UnpackHandler};

/// Extractor that replays a fixed list of percentages, then exits.
///
/// When cancelled it stops emitting progress and exits with 255 (User break),
/// like unrar does on SIGTERM.
pub(crate) struct ScriptedExtractor {
    progress: Vec<u8>,
    exit: ExitOutcome,
    step_delay: Duration,
    wait_for_cancel: bool,
    /// Cancelled as soon as any job of this extractor is cancelled
    pub(crate) cancelled: CancellationToken,
    /// `(archive, destination)` of every start
    pub(crate) starts: Mutex<Vec<(PathBuf, PathBuf)>>,
    running: Arc<AtomicUsize>,
    /// Highest number of jobs that ran at the same time
    pub(crate) max_running: Arc<AtomicUsize>,
}

impl ScriptedExtractor {
    pub(crate) fn new(progress: &[u8], exit: ExitOutcome) -> Self {
        Self {
            progress: progress.to_vec(),
            exit,
            step_delay: Duration::ZERO,
            wait_for_cancel: false,
            cancelled: CancellationToken::new(),
            starts: Mutex::new(Vec::new()),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Keep running after the last percentage until cancelled
    pub(crate) fn until_cancelled(mut self) -> Self {
        self.wait_for_cancel = true;
        self
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn start(&self, archive: &Path, destination: &Path) -> Result<ExtractionJob> {
        self.starts
            .lock()
            .unwrap()
            .push((archive.to_path_buf(), destination.to_path_buf()));

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let token = CancellationToken::new();
        let progress = self.progress.clone();
        let exit = self.exit.clone();
        let delay = self.step_delay;
        let wait_for_cancel = self.wait_for_cancel;
        let observed = self.cancelled.clone();
        let running = Arc::clone(&self.running);
        let max_running = Arc::clone(&self.max_running);
        let job_token = token.clone();

        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        max_running.fetch_max(now, Ordering::SeqCst);

        tokio::spawn(async move {
            let mut outcome = exit;
            let mut interrupted = false;
            for pct in progress {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = job_token.cancelled() => {
                        interrupted = true;
                        break;
                    }
                }
                if tx.send(ExtractionEvent::Progress(pct)).await.is_err() {
                    interrupted = true;
                    break;
                }
            }
            if wait_for_cancel && !interrupted {
                job_token.cancelled().await;
            }
            if job_token.is_cancelled() {
                observed.cancel();
                outcome = ExitOutcome::Code(255);
            }
            running.fetch_sub(1, Ordering::SeqCst);
            let _ = tx.send(ExtractionEvent::Exited(outcome)).await;
        });

        Ok(ExtractionJob::new(rx, token))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Extractor whose start always fails.
pub(crate) struct FailingExtractor;

#[async_trait]
impl Extractor for FailingExtractor {
    async fn start(&self, _archive: &Path, _destination: &Path) -> Result<ExtractionJob> {
        Err(Error::ExternalTool("Failed to execute unrar: no such file".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Dispatcher with `get` and an `unpack` backed by `extractor`.
pub(crate) fn dispatcher_with(extractor: Arc<dyn Extractor>, unpack: UnpackConfig) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(ProtocolVersion::default());
    dispatcher.register("get", Arc::new(ListHandler));
    dispatcher.register("unpack", Arc::new(UnpackHandler::new(extractor, unpack)));
    dispatcher
}

/// A session running on one end of an in-memory pipe, with the client end.
pub(crate) struct TestConnection {
    pub(crate) client: DuplexStream,
    pub(crate) session: JoinHandle<Result<()>>,
    pub(crate) shutdown: CancellationToken,
}

pub(crate) fn spawn_session(
    dispatcher: impl Into<Arc<Dispatcher>>,
    options: SessionOptions,
) -> TestConnection {
    let (client, server) = duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(server);
    let shutdown = CancellationToken::new();
    let session = Session::new(
        reader,
        writer,
        "test-peer",
        dispatcher.into(),
        options,
        shutdown.clone(),
    );
    TestConnection {
        client,
        session: tokio::spawn(session.run()),
        shutdown,
    }
}

impl TestConnection {
    pub(crate) async fn send(&mut self, request: &Message) {
        write_frame(&mut self.client, &request.encode().unwrap())
            .await
            .unwrap();
    }

    pub(crate) async fn send_raw(&mut self, payload: &[u8]) {
        write_frame(&mut self.client, payload).await.unwrap();
    }

    /// Next reply, or `None` once the server closed the connection.
    pub(crate) async fn recv(&mut self) -> Option<Message> {
        let frame = tokio::time::timeout(
            Duration::from_secs(10),
            read_frame(&mut self.client, DEFAULT_MAX_FRAME_LEN),
        )
        .await
        .expect("reply within 10s")
        .unwrap()?;
        Some(Message::decode(&frame).unwrap())
    }

    /// Replies up to and including the first final one.
    pub(crate) async fn recv_until_final(&mut self) -> Vec<Message> {
        let mut replies = Vec::new();
        loop {
            let reply = self.recv().await.expect("connection closed before final reply");
            let done = reply.is_final();
            replies.push(reply);
            if done {
                return replies;
            }
        }
    }

    /// Close the client end and wait for the session task to finish.
    pub(crate) async fn finish(self) -> Result<()> {
        let TestConnection { client, session, .. } = self;
        drop(client);
        tokio::time::timeout(Duration::from_secs(10), session)
            .await
            .expect("session ends within 10s")
            .unwrap()
    }
}

/// `(code, data)` of each reply, for compact assertions.
pub(crate) fn codes_and_data(replies: &[Message]) -> Vec<(String, String)> {
    replies
        .iter()
        .map(|r| (r.code.clone(), r.data.as_text().unwrap_or_default().to_string()))
        .collect()
}

pub(crate) fn request(method: &str, path: &str) -> Message {
    Message::request(method, path, "RU/0.4")
}
