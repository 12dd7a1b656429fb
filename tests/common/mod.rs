#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use ftpcourier::transfer::{Connector, RemoteSession, Reply};

pub fn make_tmp_dir() -> std::path::PathBuf {
    let mut base = std::env::temp_dir();
    let uniq = format!(
        "ftpc_it_{}_{}",
        std::process::id(),
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
    );
    base.push(uniq);
    std::fs::create_dir(&base).expect("create tmp dir");
    base
}

#[derive(Default)]
struct Gate {
    paused: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn wait_open(&self) {
        let mut paused = self.paused.lock().unwrap();
        while *paused {
            paused = self.cv.wait(paused).unwrap();
        }
    }

    fn set(&self, paused: bool) {
        *self.paused.lock().unwrap() = paused;
        self.cv.notify_all();
    }
}

#[derive(Default)]
struct State {
    files: Mutex<HashMap<String, Vec<u8>>>,
    gate: Gate,
    chunk_delay: Mutex<Duration>,
    refuse_finalize: AtomicBool,
    refuse_connect: AtomicBool,
    size_override: Mutex<Option<Reply>>,
    deletes: Mutex<Vec<String>>,
    connects: AtomicUsize,
    logouts: AtomicUsize,
    data_streams: AtomicUsize,
}

/// In-memory FTP server: every connect hands out a fresh session over the
/// same file store. Streams can be slowed per chunk or paused outright.
#[derive(Clone, Default)]
pub struct StubServer {
    state: Arc<State>,
}

impl StubServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_file(&self, path: &str, data: Vec<u8>) {
        self.state.files.lock().unwrap().insert(path.to_string(), data);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.files.lock().unwrap().get(path).cloned()
    }

    pub fn set_chunk_delay(&self, d: Duration) {
        *self.state.chunk_delay.lock().unwrap() = d;
    }

    /// Blocks every data-stream read/write until `resume`.
    pub fn pause(&self) {
        self.state.gate.set(true);
    }

    pub fn resume(&self) {
        self.state.gate.set(false);
    }

    pub fn refuse_finalize(&self) {
        self.state.refuse_finalize.store(true, Ordering::SeqCst);
    }

    pub fn refuse_connect(&self) {
        self.state.refuse_connect.store(true, Ordering::SeqCst);
    }

    pub fn override_size_reply(&self, code: u32, text: &str) {
        *self.state.size_override.lock().unwrap() = Some(Reply { code, text: text.to_string() });
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state.deletes.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.state.logouts.load(Ordering::SeqCst)
    }

    pub fn data_streams(&self) -> usize {
        self.state.data_streams.load(Ordering::SeqCst)
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

impl Connector for StubServer {
    fn connect(&self) -> anyhow::Result<Box<dyn RemoteSession>> {
        if self.state.refuse_connect.load(Ordering::SeqCst) {
            anyhow::bail!("530 Login incorrect");
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSession { state: self.state.clone() }))
    }
}

struct StubSession {
    state: Arc<State>,
}

impl RemoteSession for StubSession {
    fn open_write_stream(&mut self, remote_path: &str) -> anyhow::Result<Box<dyn Write + Send>> {
        self.state.data_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubWriter {
            path: remote_path.to_string(),
            buf: Vec::new(),
            state: self.state.clone(),
        }))
    }

    fn open_read_stream(&mut self, remote_path: &str) -> anyhow::Result<Box<dyn Read + Send>> {
        let data = self
            .state
            .files
            .lock()
            .unwrap()
            .get(remote_path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("550 {}: no such file", remote_path))?;
        self.state.data_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubReader { data, pos: 0, state: self.state.clone() }))
    }

    fn complete_pending(&mut self) -> anyhow::Result<bool> {
        Ok(!self.state.refuse_finalize.load(Ordering::SeqCst))
    }

    fn delete_remote(&mut self, remote_path: &str) -> anyhow::Result<bool> {
        self.state.deletes.lock().unwrap().push(remote_path.to_string());
        Ok(self.state.files.lock().unwrap().remove(remote_path).is_some())
    }

    fn size_query(&mut self, remote_path: &str) -> anyhow::Result<Reply> {
        if let Some(r) = self.state.size_override.lock().unwrap().clone() {
            return Ok(r);
        }
        Ok(match self.state.files.lock().unwrap().get(remote_path) {
            Some(d) => Reply { code: 213, text: format!("213 {}", d.len()) },
            None => Reply { code: 550, text: "550 Could not get file size.".to_string() },
        })
    }

    fn logout(&mut self) {
        self.state.logouts.fetch_add(1, Ordering::SeqCst);
    }
}

fn throttle(state: &State) {
    state.gate.wait_open();
    let d = *state.chunk_delay.lock().unwrap();
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}

struct StubWriter {
    path: String,
    buf: Vec<u8>,
    state: Arc<State>,
}

impl Write for StubWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        throttle(&self.state);
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// closing the data connection stores whatever arrived, partial or not
impl Drop for StubWriter {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.buf);
        self.state.files.lock().unwrap().insert(self.path.clone(), data);
    }
}

struct StubReader {
    data: Vec<u8>,
    pos: usize,
    state: Arc<State>,
}

impl Read for StubReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.data.len() {
            return Ok(0);
        }
        throttle(&self.state);
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
