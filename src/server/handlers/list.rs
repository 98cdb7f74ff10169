//! `get`: directory listing

use async_trait::async_trait;
use std::io;
use std::path::Path;
use tracing::{debug, info};

use super::MethodHandler;
use crate::error::Result;
use crate::protocol::{Message, Status};
use crate::server::context::ReplyContext;

/// Lists the entries of the directory named by the request path
///
/// Replies `200 OK` with the entry names (in no particular order), or
/// `404 Not Found` with empty data if the path is missing, unreadable or not
/// a directory.
pub struct ListHandler;

#[async_trait]
impl MethodHandler for ListHandler {
    async fn handle(&self, request: &Message, ctx: &mut ReplyContext<'_>) -> Result<()> {
        match list_directory(Path::new(&request.path)).await {
            Ok(entries) => {
                debug!(path = %request.path, entries = entries.len(), "listed directory");
                ctx.send(&Status::OK, entries).await
            }
            Err(e) => {
                info!(path = %request.path, error = %e, "cannot list directory");
                ctx.send(&Status::NOT_FOUND, "").await
            }
        }
    }
}

/// Entry names of `path`; names that are not UTF-8 are converted lossily
pub(crate) async fn list_directory(path: &Path) -> io::Result<Vec<String>> {
    let mut dir = tokio::fs::read_dir(path).await?;
    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        entries.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(entries)
}
