use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use crossbeam_channel::Receiver;
use indicatif::{MultiProgress, ProgressBar};

use crate::TransferError;
use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::parse::apply_server_spec;
use crate::transfer::{
    Direction, FtpConnector, ProgressEvent, Token, TransferHandle, TransferManager,
    TransferOutcome, resolve_local_destination, resolve_remote_destination,
};
use crate::util::{add_transfer_bar, human_bytes, init_multi_progress, outcome_badge, print_summary};

type BarMap = Arc<Mutex<HashMap<Token, ProgressBar>>>;

fn lock_bars(bars: &BarMap) -> MutexGuard<'_, HashMap<Token, ProgressBar>> {
    bars.lock().unwrap_or_else(|p| p.into_inner())
}

/// Output switches shared by `put` and `get`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub server: Option<String>,
    pub password: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

/// One requested transfer, before admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub direction: Direction,
    pub local: String,
    pub remote: String,
}

impl TransferJob {
    pub fn token(&self) -> Token {
        Token::new(&self.local, &self.remote, self.direction)
    }

    fn start(&self, manager: &TransferManager) -> Result<TransferHandle, TransferError> {
        match self.direction {
            Direction::Upload => manager.start_upload(&self.local, &self.remote),
            Direction::Download => manager.start_download(&self.local, &self.remote),
        }
    }

    // bytes on the local side once the transfer completed
    fn local_len(&self) -> u64 {
        let p = match self.direction {
            Direction::Upload => Path::new(&self.local).to_path_buf(),
            Direction::Download => resolve_local_destination(&self.local, &self.remote),
        };
        std::fs::metadata(p).map(|m| m.len()).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub job: TransferJob,
    pub outcome: TransferOutcome,
    pub bytes: u64,
}

impl TransferRecord {
    fn to_json(&self) -> serde_json::Value {
        let error = match &self.outcome {
            TransferOutcome::Failed(e) => serde_json::json!({
                "variant": e.variant(),
                "message": e.to_string(),
                "retriable": e.is_retriable(),
            }),
            _ => serde_json::Value::Null,
        };
        serde_json::json!({
            "token": self.job.token(),
            "direction": self.job.direction,
            "local": self.job.local,
            "remote": self.job.remote,
            "outcome": self.outcome.label(),
            "bytes": self.bytes,
            "error": error,
        })
    }
}

/// Several sources, or a target ending in `/`, upload into a remote directory.
pub fn plan_uploads(sources: &[String], target: &str) -> Vec<TransferJob> {
    let force_dir = sources.len() > 1;
    sources
        .iter()
        .map(|s| TransferJob {
            direction: Direction::Upload,
            local: s.clone(),
            remote: resolve_remote_destination(Path::new(s), target, force_dir),
        })
        .collect()
}

/// Several sources always download into a local directory.
pub fn plan_downloads(sources: &[String], target: &str) -> Vec<TransferJob> {
    let is_dir = target.ends_with('/') || target.ends_with(std::path::MAIN_SEPARATOR);
    let local =
        if sources.len() > 1 && !is_dir { format!("{}/", target) } else { target.to_string() };
    sources
        .iter()
        .map(|s| TransferJob { direction: Direction::Download, local: local.clone(), remote: s.clone() })
        .collect()
}

pub fn dispatch(cli: Cli) -> Result<bool> {
    let Cli { server, password, verbose: _, json, quiet, command } = cli;
    let opts = RunOptions { server, password, json, quiet };
    match command {
        Commands::Put { sources, target } => {
            handle_transfers(&Config::load()?, &opts, plan_uploads(&sources, &target))
        }
        Commands::Get { sources, target } => {
            handle_transfers(&Config::load()?, &opts, plan_downloads(&sources, &target))
        }
        Commands::Token { upload, download: _, local, remote } => {
            let direction = if upload { Direction::Upload } else { Direction::Download };
            handle_token(direction, &local, &remote, json);
            Ok(true)
        }
        Commands::Set { max_uploads, max_downloads, chunk_size, connect_timeout, io_timeout } => {
            handle_set(
                &Config::load()?,
                opts.server.as_deref(),
                max_uploads,
                max_downloads,
                chunk_size,
                connect_timeout,
                io_timeout,
            )?;
            Ok(true)
        }
    }
}

pub fn handle_token(direction: Direction, local: &str, remote: &str, json: bool) {
    let token = Token::new(local, remote, direction);
    if json {
        println!("{}", serde_json::json!({ "direction": direction, "token": token }));
    } else {
        println!("{}", token);
    }
}

pub fn handle_set(
    config: &Config,
    server: Option<&str>,
    max_uploads: Option<usize>,
    max_downloads: Option<usize>,
    chunk_size: Option<usize>,
    connect_timeout: Option<u64>,
    io_timeout: Option<u64>,
) -> Result<()> {
    let mut cfg = config.clone();
    if let Some(s) = server {
        cfg.server = apply_server_spec(&cfg.server, s)?;
    }
    if let Some(n) = max_uploads {
        cfg.transfer.max_concurrent_uploads = n;
    }
    if let Some(n) = max_downloads {
        cfg.transfer.max_concurrent_downloads = n;
    }
    if let Some(n) = chunk_size {
        cfg.transfer.chunk_size_bytes = n;
    }
    if let Some(n) = connect_timeout {
        cfg.server.connect_timeout_secs = n;
    }
    if let Some(n) = io_timeout {
        cfg.server.io_timeout_secs = n;
    }
    cfg.transfer = cfg.transfer.normalized();
    let path = cfg.save()?;
    println!("✅ config updated: {}", path.display());
    Ok(())
}

/// Connect, run every job through one manager and report. Ok(false) when
/// anything did not complete.
pub fn handle_transfers(config: &Config, opts: &RunOptions, jobs: Vec<TransferJob>) -> Result<bool> {
    let server = match &opts.server {
        Some(s) => apply_server_spec(&config.server, s)?,
        None => config.server.clone(),
    };
    if !server.is_set() {
        anyhow::bail!(
            "no FTP server configured: pass --server user@host[:port] or save one with `ftpc set --server ...`"
        );
    }
    tracing::info!(
        "[ftpc] {} transfer(s) via {}@{} (max up {}, max down {}, chunk {})",
        jobs.len(),
        server.username,
        server.address(),
        config.transfer.max_concurrent_uploads,
        config.transfer.max_concurrent_downloads,
        human_bytes(config.transfer.chunk_size_bytes as u64)
    );
    let connector = Arc::new(FtpConnector::new(server, opts.password.clone().unwrap_or_default()));
    let (manager, events) = TransferManager::new(config.transfer, connector);

    let mp = init_multi_progress(opts.quiet || opts.json);
    let bars: BarMap = Arc::new(Mutex::new(HashMap::new()));
    let renderer = spawn_progress_renderer(events, bars.clone());
    let started = Instant::now();
    let records = run_jobs(&manager, jobs, &mp, &bars);
    // last sender gone: the renderer drains and exits
    drop(manager);
    let _ = renderer.join();

    Ok(report(&records, started.elapsed().as_secs_f64(), opts.json))
}

fn spawn_progress_renderer(events: Receiver<ProgressEvent>, bars: BarMap) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for ev in events.iter() {
            if let Some(pb) = lock_bars(&bars).get(&ev.token) {
                pb.set_position(u64::from(ev.percentage));
            }
        }
    })
}

/// Admit jobs in order. A full pool is not an error here: wait for the oldest
/// running transfer to free a slot and try again.
pub fn run_jobs(
    manager: &TransferManager,
    jobs: Vec<TransferJob>,
    mp: &MultiProgress,
    bars: &BarMap,
) -> Vec<TransferRecord> {
    let mut records: Vec<(usize, TransferRecord)> = Vec::with_capacity(jobs.len());
    let mut running: VecDeque<(usize, TransferJob, TransferHandle)> = VecDeque::new();

    for (idx, job) in jobs.into_iter().enumerate() {
        let token = job.token();
        // bar exists before the task can emit its first event
        let bar = add_transfer_bar(mp, job.direction.as_str());
        bar.set_message(token.to_string());
        lock_bars(bars).insert(token.clone(), bar.clone());
        loop {
            match job.start(manager) {
                Ok(handle) => {
                    running.push_back((idx, job, handle));
                    break;
                }
                Err(TransferError::CapacityExceeded(_, _)) if !running.is_empty() => {
                    // prefer a transfer that already ended, else the oldest
                    let pos = running.iter().position(|(_, _, h)| h.try_outcome().is_some());
                    if let Some((i, j, h)) = running.remove(pos.unwrap_or(0)) {
                        records.push((i, finish(j, h, bars)));
                    }
                }
                Err(e) => {
                    tracing::warn!("[ftpc] not started {}: {}", token, e);
                    bar.abandon_with_message(format!("{}: {}", token, e));
                    lock_bars(bars).remove(&token);
                    records.push((idx, TransferRecord { job, outcome: TransferOutcome::Failed(e), bytes: 0 }));
                    break;
                }
            }
        }
    }
    while let Some((i, j, h)) = running.pop_front() {
        records.push((i, finish(j, h, bars)));
    }
    records.sort_by_key(|(i, _)| *i);
    records.into_iter().map(|(_, r)| r).collect()
}

fn finish(job: TransferJob, handle: TransferHandle, bars: &BarMap) -> TransferRecord {
    let direction = handle.direction();
    let outcome = handle.wait();
    tracing::debug!("[ftpc][{}] {} settled: {}", direction, job.token(), outcome.label());
    let bytes = if outcome.is_completed() { job.local_len() } else { 0 };
    if let Some(pb) = lock_bars(bars).remove(&job.token()) {
        match &outcome {
            TransferOutcome::Completed => pb.finish_with_message(job.token().to_string()),
            TransferOutcome::Cancelled => pb.abandon_with_message(format!("{} (cancelled)", job.token())),
            TransferOutcome::Failed(e) => pb.abandon_with_message(format!("{}: {}", job.token(), e)),
        }
    }
    TransferRecord { job, outcome, bytes }
}

fn report(records: &[TransferRecord], elapsed_secs: f64, json: bool) -> bool {
    let completed = records.iter().filter(|r| r.outcome.is_completed()).count();
    let cancelled =
        records.iter().filter(|r| matches!(r.outcome, TransferOutcome::Cancelled)).count();
    let failed = records.len() - completed - cancelled;
    let total_bytes: u64 = records.iter().map(|r| r.bytes).sum();

    if json {
        for r in records {
            println!("{}", r.to_json());
        }
        println!(
            "{}",
            serde_json::json!({
                "finished_at": Utc::now().to_rfc3339(),
                "completed": completed,
                "failed": failed,
                "cancelled": cancelled,
                "bytes": total_bytes,
                "elapsed_secs": elapsed_secs,
            })
        );
    } else {
        for r in records {
            let detail = match &r.outcome {
                TransferOutcome::Failed(e) => format!("  {}", e),
                _ => String::new(),
            };
            println!("{:>10}  {}{}", outcome_badge(r.outcome.label()), r.job.token(), detail);
        }
        print_summary(total_bytes, elapsed_secs, completed, failed, cancelled);
    }
    completed == records.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferConfig;
    use crate::transfer::mock_io::{ScriptedConnector, make_tmp_dir};
    use indicatif::ProgressDrawTarget;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn several_uploads_go_into_remote_dir() {
        let jobs = plan_uploads(&["a/x.txt".to_string(), "b/y.txt".to_string()], "/pub");
        assert_eq!(jobs[0].remote, "/pub/x.txt");
        assert_eq!(jobs[1].remote, "/pub/y.txt");
        let single = plan_uploads(&["a/x.txt".to_string()], "/pub/renamed.txt");
        assert_eq!(single[0].remote, "/pub/renamed.txt");
    }

    #[test]
    fn several_downloads_go_into_local_dir() {
        let jobs = plan_downloads(&["/r/a".to_string(), "/r/b".to_string()], "dl");
        assert!(jobs.iter().all(|j| j.local == "dl/"));
        assert_eq!(jobs[1].token().as_str(), "dl/<=/r/b");
    }

    #[test]
    fn jobs_beyond_capacity_wait_for_a_slot() {
        let dir = make_tmp_dir();
        let mut sources = Vec::new();
        for i in 0..4 {
            let p = dir.join(format!("f{}.bin", i));
            std::fs::write(&p, vec![i as u8 + 1; 3000]).expect("write");
            sources.push(p.to_string_lossy().to_string());
        }
        let conn = ScriptedConnector::default();
        let cfg = TransferConfig { max_concurrent_uploads: 1, ..TransferConfig::default() };
        let (manager, _events) = TransferManager::new(cfg, Arc::new(conn.clone()));
        let bars: BarMap = Arc::new(Mutex::new(HashMap::new()));
        let records = run_jobs(&manager, plan_uploads(&sources, "/pub/"), &hidden(), &bars);
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.outcome.is_completed()));
        assert!(records.iter().all(|r| r.bytes == 3000));
        assert_eq!(records[2].job.remote, "/pub/f2.bin");
        assert_eq!(conn.connects(), 4);
        assert!(lock_bars(&bars).is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn admission_errors_become_failed_records() {
        let conn = ScriptedConnector::default();
        let (manager, _events) = TransferManager::new(TransferConfig::default(), Arc::new(conn));
        let bars: BarMap = Arc::new(Mutex::new(HashMap::new()));
        let jobs = vec![TransferJob {
            direction: Direction::Download,
            local: "/tmp/whatever".into(),
            remote: "/pub/dir/".into(),
        }];
        let records = run_jobs(&manager, jobs, &hidden(), &bars);
        assert!(matches!(
            records[0].outcome,
            TransferOutcome::Failed(TransferError::InvalidRemotePath(_))
        ));
        assert!(!report(&records, 0.1, true));
    }
}
