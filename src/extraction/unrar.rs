//! Extraction through the external unrar binary

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{MAIN_SEPARATOR_STR, Path, PathBuf, is_separator};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress::scan_output;
use super::traits::{EVENT_CHANNEL_CAPACITY, ExitOutcome, ExtractionEvent, ExtractionJob, Extractor};
use crate::error::{Error, Result};

/// Default time a terminated unrar gets to exit before it is killed
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// How long output readers may take to finish after the process exited
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Extractor that runs the external `unrar` binary
///
/// The command is `unrar x -ai -o- -y -idc -- <archive> <destination>/`:
/// extract with full paths, ignore file attributes, never overwrite, assume
/// yes on all queries and print only the progress counter. stdout and stderr
/// are both scanned for percentages.
///
/// # Examples
///
/// ```no_run
/// use remote_unpack::extraction::UnrarExtractor;
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// // Explicit path
/// let extractor = UnrarExtractor::new(PathBuf::from("/usr/bin/unrar"))
///     .with_terminate_grace(Duration::from_secs(2));
///
/// // Or auto-discover from PATH
/// let extractor = UnrarExtractor::from_path().expect("unrar not found in PATH");
/// ```
#[derive(Debug, Clone)]
pub struct UnrarExtractor {
    binary_path: PathBuf,
    terminate_grace: Duration,
}

impl UnrarExtractor {
    /// Create an extractor with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
        }
    }

    /// Attempt to find unrar in PATH
    ///
    /// Returns `None` if no `unrar` binary is found.
    pub fn from_path() -> Option<Self> {
        which::which("unrar").ok().map(Self::new)
    }

    /// Set how long a cancelled extraction may take to exit after SIGTERM
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Path of the binary this extractor runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Argument vector passed to unrar
    ///
    /// The destination always ends with a path separator, which is how unrar
    /// tells a destination directory apart from a file mask.
    pub fn command_args(archive: &Path, destination: &Path) -> Vec<OsString> {
        let mut dest = destination.as_os_str().to_owned();
        let has_separator = dest
            .as_encoded_bytes()
            .last()
            .is_some_and(|b| is_separator(char::from(*b)));
        if !has_separator {
            dest.push(MAIN_SEPARATOR_STR);
        }

        let mut args: Vec<OsString> = ["x", "-ai", "-o-", "-y", "-idc", "--"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(archive.as_os_str().to_owned());
        args.push(dest);
        args
    }
}

#[async_trait]
impl Extractor for UnrarExtractor {
    async fn start(&self, archive: &Path, destination: &Path) -> Result<ExtractionJob> {
        tokio::fs::create_dir_all(destination).await?;

        let mut child = Command::new(&self.binary_path)
            .args(Self::command_args(archive, destination))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::ExternalTool(format!(
                    "Failed to execute {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        info!(
            archive = %archive.display(),
            destination = %destination.display(),
            pid = ?child.id(),
            "started unrar"
        );

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(scan_output(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(scan_output(stderr, tx.clone())));
        }

        let cancel = CancellationToken::new();
        tokio::spawn(drive(
            child,
            readers,
            tx,
            cancel.clone(),
            self.terminate_grace,
        ));

        Ok(ExtractionJob::new(rx, cancel))
    }

    fn name(&self) -> &'static str {
        "unrar"
    }
}

/// Wait for the process (terminating it on cancellation), let the output
/// readers finish, then publish the exit outcome as the last event.
async fn drive(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    events: mpsc::Sender<ExtractionEvent>,
    cancel: CancellationToken,
    grace: Duration,
) {
    let outcome = tokio::select! {
        result = child.wait() => ExitOutcome::from_wait(result),
        () = cancel.cancelled() => terminate(&mut child, grace).await,
    };
    debug!(%outcome, "unrar exited");

    for mut reader in readers {
        if timeout(READER_DRAIN_TIMEOUT, &mut reader).await.is_err() {
            debug!("output reader still busy after exit, aborting it");
            reader.abort();
        }
    }

    if events.send(ExtractionEvent::Exited(outcome)).await.is_err() {
        debug!("extraction job dropped before exit was reported");
    }
}

async fn terminate(child: &mut Child, grace: Duration) -> ExitOutcome {
    info!(pid = ?child.id(), "terminating unrar");
    request_termination(child);

    match timeout(grace, child.wait()).await {
        Ok(result) => ExitOutcome::from_wait(result),
        Err(_) => {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "unrar did not exit after termination request, killing it"
            );
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill unrar");
            }
            ExitOutcome::from_wait(child.wait().await)
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    // No pid means the process was already reaped.
    let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory; pid names
    // our own child, which has not been reaped while `child` still holds it.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        warn!(
            pid,
            error = %std::io::Error::last_os_error(),
            "failed to send SIGTERM"
        );
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "failed to stop unrar");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_args_match_unrar_invocation() {
        let args = UnrarExtractor::command_args(Path::new("/data/a.rar"), Path::new("/data/out"));
        let expected: Vec<OsString> = [
            "x",
            "-ai",
            "-o-",
            "-y",
            "-idc",
            "--",
            "/data/a.rar",
            &format!("/data/out{MAIN_SEPARATOR_STR}"),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn destination_separator_is_not_doubled() {
        let dest = format!("out{MAIN_SEPARATOR_STR}");
        let args = UnrarExtractor::command_args(Path::new("a.rar"), Path::new(&dest));
        assert_eq!(args.last().unwrap(), &OsString::from(dest));
    }

    #[test]
    fn archive_with_leading_dash_stays_after_terminator() {
        let args = UnrarExtractor::command_args(Path::new("-rf.rar"), Path::new("out"));
        let terminator = args.iter().position(|a| a == "--").unwrap();
        let archive = args.iter().position(|a| a == "-rf.rar").unwrap();
        assert!(terminator < archive);
    }

    #[test]
    fn from_path_binary_discovery() {
        match (which::which("unrar"), UnrarExtractor::from_path()) {
            (Ok(path), Some(extractor)) => assert_eq!(extractor.binary_path(), path),
            (Err(_), None) => {}
            (which, found) => panic!("which={which:?} but from_path={found:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_external_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = UnrarExtractor::new(dir.path().join("no-such-unrar"));
        let err = extractor
            .start(&dir.path().join("a.rar"), &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExternalTool(_)), "got {err:?}");
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use serial_test::serial;
        use std::os::unix::fs::PermissionsExt;

        fn write_script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-unrar");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        async fn collect(mut job: ExtractionJob) -> (Vec<u8>, ExitOutcome) {
            let mut progress = Vec::new();
            while let Some(event) = job.next_event().await {
                match event {
                    ExtractionEvent::Progress(pct) => progress.push(pct),
                    ExtractionEvent::Exited(outcome) => return (progress, outcome),
                }
            }
            panic!("job ended without an exit event");
        }

        #[tokio::test]
        #[serial]
        async fn reports_progress_then_exit_code() {
            let dir = tempfile::tempdir().unwrap();
            let argv_log = dir.path().join("argv");
            let script = write_script(
                dir.path(),
                &format!(
                    "printf '%s\\n' \"$@\" > '{}'\nprintf '  0%%\\b\\b\\b\\b 40%%\\b\\b\\b\\b100%%\\b\\b\\b\\b'\nexit 3",
                    argv_log.display()
                ),
            );
            let archive = dir.path().join("movie.rar");
            let dest = dir.path().join("out");

            let job = UnrarExtractor::new(script)
                .start(&archive, &dest)
                .await
                .unwrap();
            let (progress, outcome) = timeout(Duration::from_secs(10), collect(job))
                .await
                .unwrap();

            assert_eq!(progress, vec![0, 40, 100]);
            assert_eq!(outcome, ExitOutcome::Code(3));
            assert!(dest.is_dir(), "destination is created before spawning");

            let argv = std::fs::read_to_string(&argv_log).unwrap();
            let argv: Vec<&str> = argv.lines().collect();
            assert_eq!(&argv[..6], &["x", "-ai", "-o-", "-y", "-idc", "--"]);
            assert_eq!(argv[6], archive.to_str().unwrap());
            assert_eq!(argv[7], format!("{}/", dest.display()));
        }

        #[tokio::test]
        #[serial]
        async fn progress_on_stderr_is_reported() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "echo ' 12%' >&2\nexit 0");
            let job = UnrarExtractor::new(script)
                .start(&dir.path().join("a.rar"), &dir.path().join("out"))
                .await
                .unwrap();
            let (progress, outcome) = timeout(Duration::from_secs(10), collect(job))
                .await
                .unwrap();
            assert_eq!(progress, vec![12]);
            assert!(outcome.is_success());
        }

        #[tokio::test]
        #[serial]
        async fn cancel_sends_sigterm() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "echo ' 5%'\nexec sleep 30");
            let mut job = UnrarExtractor::new(script)
                .start(&dir.path().join("a.rar"), &dir.path().join("out"))
                .await
                .unwrap();

            let first = timeout(Duration::from_secs(10), job.next_event())
                .await
                .unwrap();
            assert_eq!(first, Some(ExtractionEvent::Progress(5)));

            job.cancel();
            let (_, outcome) = timeout(Duration::from_secs(10), collect(job))
                .await
                .unwrap();
            assert_eq!(outcome, ExitOutcome::Signal(libc::SIGTERM));
        }

        #[tokio::test]
        #[serial]
        async fn process_ignoring_sigterm_is_killed_after_grace() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(
                dir.path(),
                "trap '' TERM\necho ' 1%'\nwhile :; do sleep 1; done",
            );
            let mut job = UnrarExtractor::new(script)
                .with_terminate_grace(Duration::from_millis(200))
                .start(&dir.path().join("a.rar"), &dir.path().join("out"))
                .await
                .unwrap();

            let first = timeout(Duration::from_secs(10), job.next_event())
                .await
                .unwrap();
            assert_eq!(first, Some(ExtractionEvent::Progress(1)));

            job.cancel();
            let (_, outcome) = timeout(Duration::from_secs(10), collect(job))
                .await
                .unwrap();
            assert_eq!(outcome, ExitOutcome::Signal(libc::SIGKILL));
        }
    }
}
