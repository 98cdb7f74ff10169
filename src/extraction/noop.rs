//! No-op extractor for graceful degradation

use async_trait::async_trait;
use std::path::Path;

use super::traits::{ExtractionJob, Extractor};

/// Extractor used when no unrar binary is available
///
/// Every start fails with `Error::NotSupported`, so an `unpack` request gets
/// a well-formed failure reply instead of the server refusing to start.
pub struct NoOpExtractor;

#[async_trait]
impl Extractor for NoOpExtractor {
    async fn start(&self, _archive: &Path, _destination: &Path) -> crate::Result<ExtractionJob> {
        Err(crate::Error::NotSupported(
            "extraction requires the external unrar binary. \
             Configure tools.unrar_path in config or ensure unrar is in PATH."
                .into(),
        ))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
