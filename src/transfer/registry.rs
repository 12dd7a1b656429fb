use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, unbounded};

use super::helpers::{display_path, is_remote_dir_path, resolve_local_destination};
use super::pump::CancelFlag;
use super::remote::Connector;
use super::task::{ProgressEvent, TaskSpec, TransferOutcome, TransferTask, delete_remote_best_effort};
use super::token::{Direction, Token};
use crate::TransferError;
use crate::config::TransferConfig;

#[derive(Clone)]
struct TaskEntry {
    // distinguishes successive tasks that reuse one token
    id: u64,
    cancel: CancelFlag,
    // never receives a message; disconnects when the task thread exits
    done: Receiver<()>,
    remote_path: String,
}

struct TaskTable {
    direction: Direction,
    max: usize,
    entries: HashMap<Token, TaskEntry>,
}

impl TaskTable {
    fn new(direction: Direction, max: usize) -> Self {
        Self { direction, max, entries: HashMap::new() }
    }

    /// Duplicate check, capacity check, `validate` and insertion as one step.
    fn admit<V>(&mut self, token: &Token, entry: TaskEntry, validate: V) -> Result<(), TransferError>
    where
        V: FnOnce() -> Result<(), TransferError>,
    {
        if self.entries.contains_key(token) {
            return Err(TransferError::DuplicateTransfer(token.to_string()));
        }
        if self.entries.len() >= self.max {
            return Err(TransferError::CapacityExceeded(
                self.direction.as_str().to_string(),
                self.max,
            ));
        }
        validate()?;
        self.entries.insert(token.clone(), entry);
        Ok(())
    }

    /// Remove `token` only if it still belongs to task `id`.
    fn release(&mut self, token: &Token, id: u64) -> bool {
        if self.entries.get(token).is_some_and(|e| e.id == id) {
            self.entries.remove(token);
            return true;
        }
        false
    }
}

type SharedTable = Arc<Mutex<TaskTable>>;

// A panicking task must not poison admission for everyone else.
fn lock(table: &Mutex<TaskTable>) -> MutexGuard<'_, TaskTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Frees the task's slot when dropped, including when the thread unwinds or
/// is never spawned at all.
struct SlotRelease {
    table: SharedTable,
    token: Token,
    id: u64,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        lock(&self.table).release(&self.token, self.id);
    }
}

/// Caller's view of an admitted transfer.
pub struct TransferHandle {
    token: Token,
    direction: Direction,
    outcome: Receiver<TransferOutcome>,
    // first outcome received; the channel only ever carries one
    settled: OnceLock<TransferOutcome>,
}

impl TransferHandle {
    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Block until the transfer reaches its terminal outcome.
    pub fn wait(self) -> TransferOutcome {
        if let Some(o) = self.settled.get() {
            return o.clone();
        }
        self.outcome.recv().unwrap_or_else(|_| lost_outcome())
    }

    /// Like `wait`, giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TransferOutcome> {
        if let Some(o) = self.settled.get() {
            return Some(o.clone());
        }
        match self.outcome.recv_timeout(timeout) {
            Ok(o) => Some(self.settle(o)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.settle(lost_outcome())),
        }
    }

    /// Outcome if the transfer has already ended; never blocks.
    pub fn try_outcome(&self) -> Option<TransferOutcome> {
        if let Some(o) = self.settled.get() {
            return Some(o.clone());
        }
        match self.outcome.try_recv() {
            Ok(o) => Some(self.settle(o)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.settle(lost_outcome())),
        }
    }

    fn settle(&self, outcome: TransferOutcome) -> TransferOutcome {
        self.settled.get_or_init(|| outcome).clone()
    }
}

fn lost_outcome() -> TransferOutcome {
    TransferOutcome::Failed(TransferError::StreamIoFailed(
        "transfer thread exited without an outcome".to_string(),
    ))
}

/// Admission, bookkeeping and cancellation for concurrent transfers.
///
/// Uploads and downloads have separate pools. Every admitted transfer runs on
/// its own thread with its own session from the connector.
pub struct TransferManager {
    uploads: SharedTable,
    downloads: SharedTable,
    connector: Arc<dyn Connector>,
    events: Sender<ProgressEvent>,
    chunk_size: usize,
    next_id: AtomicU64,
}

impl TransferManager {
    /// Build a manager plus the receiving end of its progress events.
    pub fn new(
        config: TransferConfig,
        connector: Arc<dyn Connector>,
    ) -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = unbounded();
        (Self::with_events(config, connector, tx), rx)
    }

    pub fn with_events(
        config: TransferConfig,
        connector: Arc<dyn Connector>,
        events: Sender<ProgressEvent>,
    ) -> Self {
        let config = config.normalized();
        Self {
            uploads: Arc::new(Mutex::new(TaskTable::new(
                Direction::Upload,
                config.max_concurrent_uploads,
            ))),
            downloads: Arc::new(Mutex::new(TaskTable::new(
                Direction::Download,
                config.max_concurrent_downloads,
            ))),
            connector,
            events,
            chunk_size: config.chunk_size_bytes,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn start_upload(
        &self,
        local_path: &str,
        remote_path: &str,
    ) -> Result<TransferHandle, TransferError> {
        let spec = TaskSpec {
            token: Token::upload(local_path, remote_path),
            direction: Direction::Upload,
            local_path: Path::new(local_path).to_path_buf(),
            remote_path: remote_path.to_string(),
            chunk_size: self.chunk_size,
        };
        self.admit_and_launch(spec, || check_remote_file_path(remote_path))
    }

    pub fn start_download(
        &self,
        local_path: &str,
        remote_path: &str,
    ) -> Result<TransferHandle, TransferError> {
        let destination = resolve_local_destination(local_path, remote_path);
        let spec = TaskSpec {
            token: Token::download(local_path, remote_path),
            direction: Direction::Download,
            local_path: destination.clone(),
            remote_path: remote_path.to_string(),
            chunk_size: self.chunk_size,
        };
        self.admit_and_launch(spec, || {
            check_remote_file_path(remote_path)?;
            // the task re-checks with create-new semantics; this only spares a session
            if destination.exists() {
                return Err(TransferError::LocalFileExists(display_path(&destination).to_string()));
            }
            Ok(())
        })
    }

    /// Stop an upload, wait for its thread to finish, then remove whatever it
    /// left on the server. Cleanup problems are logged, never returned.
    ///
    /// The delete runs even when the cancel landed before the data connection
    /// opened, so a file that already sat at the remote path is removed too.
    pub fn cancel_upload(&self, token: &Token) -> Result<(), TransferError> {
        let entry = self.cancel_and_join(Direction::Upload, token)?;
        self.delete_remote_artifact(&entry.remote_path);
        lock(&self.uploads).release(token, entry.id);
        Ok(())
    }

    /// Stop a download and wait for its thread; the task itself removes the
    /// partial local file.
    pub fn cancel_download(&self, token: &Token) -> Result<(), TransferError> {
        let entry = self.cancel_and_join(Direction::Download, token)?;
        lock(&self.downloads).release(token, entry.id);
        Ok(())
    }

    pub fn active_uploads(&self) -> Vec<Token> {
        active(&self.uploads)
    }

    pub fn active_downloads(&self) -> Vec<Token> {
        active(&self.downloads)
    }

    fn table(&self, direction: Direction) -> &SharedTable {
        match direction {
            Direction::Upload => &self.uploads,
            Direction::Download => &self.downloads,
        }
    }

    fn admit_and_launch<V>(&self, spec: TaskSpec, validate: V) -> Result<TransferHandle, TransferError>
    where
        V: FnOnce() -> Result<(), TransferError>,
    {
        let direction = spec.direction;
        let token = spec.token.clone();
        let table = self.table(direction).clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelFlag::new();
        let (done_tx, done_rx) = bounded::<()>(0);
        let (outcome_tx, outcome_rx) = bounded::<TransferOutcome>(1);

        {
            let mut guard = lock(&table);
            guard.admit(
                &token,
                TaskEntry {
                    id,
                    cancel: cancel.clone(),
                    done: done_rx,
                    remote_path: spec.remote_path.clone(),
                },
                validate,
            )?;
            tracing::info!(
                "[ftpc][registry] admitted {} {} ({}/{})",
                direction,
                token,
                guard.entries.len(),
                guard.max
            );
        }

        let release = SlotRelease { table: table.clone(), token: token.clone(), id };
        let task = TransferTask::new(spec, cancel, self.connector.clone(), self.events.clone());
        let spawned = std::thread::Builder::new()
            .name(format!("ftpc-{}-{}", direction, id))
            .spawn(move || {
                let _done = done_tx;
                let outcome = task.run();
                // slot is free before anyone can observe the outcome
                drop(release);
                let _ = outcome_tx.send(outcome);
            });
        if let Err(e) = spawned {
            // the dropped closure already released the slot; this is a no-op guard
            lock(&table).release(&token, id);
            return Err(TransferError::SpawnFailed(e.to_string()));
        }
        Ok(TransferHandle { token, direction, outcome: outcome_rx, settled: OnceLock::new() })
    }

    fn cancel_and_join(&self, direction: Direction, token: &Token) -> Result<TaskEntry, TransferError> {
        let entry = lock(self.table(direction))
            .entries
            .get(token)
            .cloned()
            .ok_or_else(|| TransferError::UnknownToken(token.to_string()))?;
        tracing::info!("[ftpc][registry] cancelling {} {}", direction, token);
        entry.cancel.cancel();
        // Err(Disconnected) is the only possible result: the task has exited
        let _ = entry.done.recv();
        tracing::debug!("[ftpc][registry] {} {} joined", direction, token);
        Ok(entry)
    }

    fn delete_remote_artifact(&self, remote_path: &str) {
        match self.connector.connect() {
            Ok(mut session) => {
                delete_remote_best_effort(session.as_mut(), remote_path);
                session.logout();
            }
            Err(e) => {
                tracing::warn!(
                    "[ftpc][upload] cannot connect to remove {} after cancel: {:#}",
                    remote_path,
                    e
                );
            }
        }
    }
}

fn check_remote_file_path(remote_path: &str) -> Result<(), TransferError> {
    if is_remote_dir_path(remote_path) {
        return Err(TransferError::InvalidRemotePath(remote_path.to_string()));
    }
    Ok(())
}

fn active(table: &SharedTable) -> Vec<Token> {
    let mut tokens: Vec<Token> = lock(table).entries.keys().cloned().collect();
    tokens.sort();
    tokens
}
