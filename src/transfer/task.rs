use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::Sender;
use serde::Serialize;

use super::helpers::display_path;
use super::progress::ProgressThrottle;
use super::pump::{CancelFlag, PumpOutcome, pump};
use super::remote::{Connector, RemoteSession};
use super::size::resolve_remote_size;
use super::token::{Direction, Token};
use crate::TransferError;

/// Progress notification for one running transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub token: Token,
    pub percentage: u8,
}

/// Terminal state of a transfer. `Cancelled` is kept apart from `Failed` so a
/// caller can tell "I stopped it" from "it broke".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    Cancelled,
    Failed(TransferError),
}

impl TransferOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferOutcome::Completed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransferOutcome::Completed => "completed",
            TransferOutcome::Cancelled => "cancelled",
            TransferOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
    Pending,
    Connecting,
    SizingRemote,
    Preparing,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

/// One admitted transfer. Owns its session and both stream handles for as long
/// as it runs; `run` consumes the task and always releases them.
pub(crate) struct TransferTask {
    token: Token,
    direction: Direction,
    local_path: PathBuf,
    remote_path: String,
    chunk_size: usize,
    cancel: CancelFlag,
    connector: Arc<dyn Connector>,
    events: Sender<ProgressEvent>,
    state: TaskState,
    total_bytes: u64,
    transferred_bytes: u64,
}

pub(crate) struct TaskSpec {
    pub(crate) token: Token,
    pub(crate) direction: Direction,
    pub(crate) local_path: PathBuf,
    pub(crate) remote_path: String,
    pub(crate) chunk_size: usize,
}

impl TransferTask {
    pub(crate) fn new(
        spec: TaskSpec,
        cancel: CancelFlag,
        connector: Arc<dyn Connector>,
        events: Sender<ProgressEvent>,
    ) -> Self {
        let TaskSpec { token, direction, local_path, remote_path, chunk_size } = spec;
        Self {
            token,
            direction,
            local_path,
            remote_path,
            chunk_size,
            cancel,
            connector,
            events,
            state: TaskState::Pending,
            total_bytes: 0,
            transferred_bytes: 0,
        }
    }

    pub(crate) fn run(mut self) -> TransferOutcome {
        let outcome = match self.direction {
            Direction::Upload => self.run_upload(),
            Direction::Download => self.run_download(),
        };
        let terminal = match &outcome {
            TransferOutcome::Completed => TaskState::Completed,
            TransferOutcome::Cancelled => TaskState::Cancelled,
            TransferOutcome::Failed(_) => TaskState::Failed,
        };
        self.transition(terminal);
        match &outcome {
            TransferOutcome::Failed(e) => tracing::info!(
                "[ftpc][{}] {} failed after {}/{} bytes: {}",
                self.direction,
                self.token,
                self.transferred_bytes,
                self.total_bytes,
                e
            ),
            other => tracing::info!(
                "[ftpc][{}] {} {} ({}/{} bytes)",
                self.direction,
                self.token,
                other.label(),
                self.transferred_bytes,
                self.total_bytes
            ),
        }
        outcome
    }

    fn transition(&mut self, next: TaskState) {
        tracing::debug!("[ftpc][{}] {} {:?} -> {:?}", self.direction, self.token, self.state, next);
        self.state = next;
    }

    fn connect(&self) -> Result<Box<dyn RemoteSession>, TransferError> {
        self.connector.connect().map_err(|e| TransferError::SessionFailed(format!("{:#}", e)))
    }

    fn run_upload(&mut self) -> TransferOutcome {
        let (mut local, len) = match open_local_source(&self.local_path) {
            Ok(v) => v,
            Err(e) => return TransferOutcome::Failed(e),
        };
        self.total_bytes = len;
        self.transition(TaskState::Connecting);
        let mut session = match self.connect() {
            Ok(s) => s,
            Err(e) => return TransferOutcome::Failed(e),
        };
        let outcome = self.upload_with(session.as_mut(), &mut local, len);
        drop(local);
        session.logout();
        outcome
    }

    fn upload_with(
        &mut self,
        session: &mut dyn RemoteSession,
        local: &mut File,
        len: u64,
    ) -> TransferOutcome {
        if self.cancel.is_cancelled() {
            return TransferOutcome::Cancelled;
        }
        let mut sink = match session.open_write_stream(&self.remote_path) {
            Ok(s) => s,
            Err(e) => {
                return TransferOutcome::Failed(TransferError::StreamIoFailed(format!(
                    "remote create failed: {} — {:#}",
                    self.remote_path, e
                )));
            }
        };
        let pumped = self.stream(local, sink.as_mut(), len);
        // the data connection must be closed before the server sends its verdict
        drop(sink);
        match pumped {
            Err(e) => TransferOutcome::Failed(e),
            Ok(PumpOutcome::Interrupted(_)) => TransferOutcome::Cancelled,
            Ok(PumpOutcome::Finished(_)) => match session.complete_pending() {
                Ok(true) => TransferOutcome::Completed,
                Ok(false) => {
                    delete_remote_best_effort(session, &self.remote_path);
                    TransferOutcome::Failed(TransferError::UploadNotConfirmed(
                        self.remote_path.clone(),
                    ))
                }
                Err(e) => TransferOutcome::Failed(TransferError::StreamIoFailed(format!(
                    "finalize failed: {} — {:#}",
                    self.remote_path, e
                ))),
            },
        }
    }

    fn run_download(&mut self) -> TransferOutcome {
        self.transition(TaskState::SizingRemote);
        let mut session = match self.connect() {
            Ok(s) => s,
            Err(e) => return TransferOutcome::Failed(e),
        };
        let outcome = self.download_with(session.as_mut());
        session.logout();
        outcome
    }

    fn download_with(&mut self, session: &mut dyn RemoteSession) -> TransferOutcome {
        let total = match resolve_remote_size(session, &self.remote_path) {
            Ok(n) => n,
            Err(e) => return TransferOutcome::Failed(e),
        };
        self.total_bytes = total;
        self.transition(TaskState::Preparing);
        if self.cancel.is_cancelled() {
            return TransferOutcome::Cancelled;
        }
        let file = match create_local_destination(&self.local_path) {
            Ok(f) => f,
            Err(e) => return TransferOutcome::Failed(e),
        };
        let mut local = BufWriter::new(file);
        let outcome = self.fill_local(session, &mut local, total);
        drop(local);
        if !outcome.is_completed() {
            remove_partial_local(&self.local_path);
        }
        outcome
    }

    fn fill_local<W: Write>(
        &mut self,
        session: &mut dyn RemoteSession,
        local: &mut W,
        total: u64,
    ) -> TransferOutcome {
        let mut source = match session.open_read_stream(&self.remote_path) {
            Ok(s) => s,
            Err(e) => {
                return TransferOutcome::Failed(TransferError::StreamIoFailed(format!(
                    "remote open failed: {} — {:#}",
                    self.remote_path, e
                )));
            }
        };
        let pumped = self.stream(source.as_mut(), local, total);
        drop(source);
        match pumped {
            Err(e) => TransferOutcome::Failed(e),
            Ok(PumpOutcome::Interrupted(_)) => TransferOutcome::Cancelled,
            Ok(PumpOutcome::Finished(_)) => match session.complete_pending() {
                Ok(true) => {
                    if total == 0 {
                        self.emit(100);
                    }
                    TransferOutcome::Completed
                }
                Ok(false) => TransferOutcome::Failed(TransferError::DownloadNotConfirmed(
                    self.remote_path.clone(),
                )),
                Err(e) => TransferOutcome::Failed(TransferError::StreamIoFailed(format!(
                    "finalize failed: {} — {:#}",
                    self.remote_path, e
                ))),
            },
        }
    }

    /// Emit 0%, then pump with throttled progress.
    fn stream<R, W>(
        &mut self,
        source: &mut R,
        sink: &mut W,
        total: u64,
    ) -> Result<PumpOutcome, TransferError>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        self.transition(TaskState::Streaming);
        let mut throttle = ProgressThrottle::new(total);
        let token = &self.token;
        let events = &self.events;
        let cancel = &self.cancel;
        send_progress(events, token, 0);
        if let Some(t) = throttle.as_mut() {
            // swallow the initial 0 so it is not sent twice
            let _ = t.report(0);
        }
        let mut transferred = 0u64;
        let res = pump(
            source,
            sink,
            self.chunk_size,
            || cancel.is_cancelled(),
            |n| {
                transferred += n;
                if let Some(pct) = throttle.as_mut().and_then(|t| t.report(transferred)) {
                    send_progress(events, token, pct);
                }
            },
        );
        self.transferred_bytes = transferred;
        res
    }

    fn emit(&self, percentage: u8) {
        send_progress(&self.events, &self.token, percentage);
    }
}

fn send_progress(events: &Sender<ProgressEvent>, token: &Token, percentage: u8) {
    tracing::trace!("[ftpc] send progress {} to: {}", percentage, token);
    // nobody listening is fine
    let _ = events.send(ProgressEvent { token: token.clone(), percentage });
}

fn open_local_source(path: &Path) -> Result<(File, u64), TransferError> {
    let unreadable =
        |why: String| TransferError::LocalFileUnreadable(display_path(path).to_string(), why);
    let file = File::open(path).map_err(|e| unreadable(e.to_string()))?;
    let meta = file.metadata().map_err(|e| unreadable(e.to_string()))?;
    if !meta.is_file() {
        return Err(unreadable("not a regular file".to_string()));
    }
    if meta.len() == 0 {
        return Err(unreadable("file is empty".to_string()));
    }
    Ok((file, meta.len()))
}

fn create_local_destination(path: &Path) -> Result<File, TransferError> {
    let shown = display_path(path).to_string();
    if path.exists() {
        return Err(TransferError::LocalFileExists(shown));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            TransferError::StreamIoFailed(format!(
                "local mkdir failed: {} — {}",
                display_path(parent),
                e
            ))
        })?;
    }
    OpenOptions::new().write(true).create_new(true).open(path).map_err(|e| {
        if e.kind() == ErrorKind::AlreadyExists {
            TransferError::LocalFileExists(shown.clone())
        } else {
            TransferError::StreamIoFailed(format!("local create failed: {} — {}", shown, e))
        }
    })
}

fn remove_partial_local(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != ErrorKind::NotFound
    {
        tracing::warn!("[ftpc][download] cannot remove partial file {}: {}", display_path(path), e);
    }
}

/// Delete a remote file, logging instead of surfacing any failure.
pub(crate) fn delete_remote_best_effort(session: &mut dyn RemoteSession, remote_path: &str) {
    match session.delete_remote(remote_path) {
        Ok(true) => tracing::debug!("[ftpc][upload] removed remote {}", remote_path),
        Ok(false) => tracing::warn!("[ftpc][upload] server refused to delete {}", remote_path),
        Err(e) => tracing::warn!("[ftpc][upload] delete {} failed: {:#}", remote_path, e),
    }
}
