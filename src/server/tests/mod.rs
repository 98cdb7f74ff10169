use super::test_helpers::*;
use super::*;
use crate::Error;
use crate::config::UnpackConfig;
use crate::extraction::{ExitOutcome, NoOpExtractor};
use crate::protocol::{Data, Message};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;


fn default_options() -> SessionOptions {
    SessionOptions::default()
}

fn scripted(progress: &[u8], exit: ExitOutcome) -> Arc<ScriptedExtractor> {
    Arc::new(ScriptedExtractor::new(progress, exit))
}

/// Temp dir holding an (empty) archive file; returns the dir and the archive path.
fn archive_fixture() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("movie.rar");
    std::fs::write(&archive, b"Rar!").unwrap();
    (dir, archive)
}

struct PanickingHandler;

#[async_trait]
impl MethodHandler for PanickingHandler {
    async fn handle(&self, _request: &Message, _ctx: &mut ReplyContext<'_>) -> crate::Result<()> {
        panic!("handler exploded");
    }
}

struct SilentHandler;

#[async_trait]
impl MethodHandler for SilentHandler {
    async fn handle(&self, _request: &Message, _ctx: &mut ReplyContext<'_>) -> crate::Result<()> {
        Ok(())
    }
}
