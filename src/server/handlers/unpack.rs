//! `unpack`: streaming archive extraction

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use super::MethodHandler;
use crate::config::UnpackConfig;
use crate::error::{Error, Result};
use crate::extraction::{ExitOutcome, ExtractionEvent, Extractor};
use crate::protocol::{Message, Status};
use crate::server::context::ReplyContext;
use crate::server::relay::ProgressRelay;

type DestinationLock = Arc<tokio::sync::Mutex<()>>;

/// Extracts the archive named by the request path
///
/// Reply sequence: `202 Accepted`, one `206 Partial Content` per relayed
/// percentage (`"<n>%"`), then `200 OK` if the tool exited with 0 or the
/// tool's exit status otherwise. A missing archive gets `202` and then a
/// final `404` without progress.
///
/// Extractions into the same destination run one at a time.
pub struct UnpackHandler {
    extractor: Arc<dyn Extractor>,
    settings: UnpackConfig,
    locks: Mutex<HashMap<PathBuf, DestinationLock>>,
}

impl UnpackHandler {
    /// Create a handler that extracts with `extractor`
    pub fn new(extractor: Arc<dyn Extractor>, settings: UnpackConfig) -> Self {
        Self {
            extractor,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn destination_lock(&self, destination: &Path) -> DestinationLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop locks nobody holds or waits for.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(destination.to_path_buf()).or_default())
    }
}

#[async_trait]
impl MethodHandler for UnpackHandler {
    async fn handle(&self, request: &Message, ctx: &mut ReplyContext<'_>) -> Result<()> {
        ctx.send(&Status::ACCEPTED, "").await?;

        let archive = PathBuf::from(&request.path);
        if request.path.is_empty() || tokio::fs::symlink_metadata(&archive).await.is_err() {
            info!(archive = %request.path, "archive not found");
            return ctx.send(&Status::NOT_FOUND, "").await;
        }

        let destination = self.settings.destination_for(&archive);
        let lock = self.destination_lock(&destination);
        let _guard = tokio::select! {
            guard = lock.lock_owned() => guard,
            () = ctx.connection_lost() => {
                return Err(Error::Disconnected(
                    "connection lost while waiting for destination".into(),
                ));
            }
        };

        let mut job = self.extractor.start(&archive, &destination).await?;
        info!(
            archive = %archive.display(),
            destination = %destination.display(),
            extractor = self.extractor.name(),
            "extraction started"
        );

        let shutdown = ctx.shutdown().clone();
        let mut relay = ProgressRelay::new(self.settings.progress_interval);
        let outcome = loop {
            tokio::select! {
                event = job.next_event() => match event {
                    Some(ExtractionEvent::Progress(pct)) => {
                        if relay.accept(pct) {
                            ctx.send(&Status::PARTIAL_CONTENT, format!("{pct}%")).await?;
                        }
                    }
                    Some(ExtractionEvent::Exited(outcome)) => break outcome,
                    None => {
                        break ExitOutcome::Failed(
                            "extraction ended without reporting an exit status".into(),
                        );
                    }
                },
                () = ctx.connection_lost() => {
                    job.cancel();
                    return Err(Error::Disconnected(
                        "connection lost during extraction".into(),
                    ));
                }
                () = shutdown.cancelled(), if !job.is_cancelled() => {
                    info!(
                        archive = %archive.display(),
                        "server shutting down, terminating extraction"
                    );
                    job.cancel();
                }
            }
        };

        info!(archive = %archive.display(), %outcome, "extraction finished");
        if outcome.is_success() {
            if let Some(pct) = relay.finish() {
                ctx.send(&Status::PARTIAL_CONTENT, format!("{pct}%")).await?;
            }
            return ctx.send(&Status::OK, "").await;
        }

        let data = match &outcome {
            ExitOutcome::Code(_) => String::new(),
            ExitOutcome::Signal(_) | ExitOutcome::Failed(_) => outcome.to_string(),
        };
        debug!(status = %outcome.status(), "reporting extraction failure");
        ctx.send(&outcome.status(), data).await
    }
}
