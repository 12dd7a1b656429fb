use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use super::remote::{Connector, RemoteSession, Reply};

// PartialReader yields data normally for `fail_after_reads` reads, then errors,
// like a data connection dropped by the server mid-transfer
pub struct PartialReader {
    data: Vec<u8>,
    pos: usize,
    fail_after_reads: usize,
    reads: usize,
}

impl PartialReader {
    pub fn new(data: &[u8], fail_after_reads: usize) -> Self {
        Self { data: data.to_vec(), pos: 0, fail_after_reads, reads: 0 }
    }
}

impl Read for PartialReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reads >= self.fail_after_reads {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "simulated data connection reset",
            ));
        }
        self.reads += 1;
        if self.pos >= self.data.len() {
            return Ok(0);
        }
        let n = std::cmp::min(buf.len(), self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

// FailingWriter accepts `fail_after_writes` writes, then fails every write
pub struct FailingWriter {
    fail_after_writes: usize,
    writes: usize,
}

impl FailingWriter {
    pub fn new(fail_after_writes: usize) -> Self {
        Self { fail_after_writes, writes: 0 }
    }
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.writes >= self.fail_after_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated remote write failure"));
        }
        self.writes += 1;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn make_tmp_dir() -> std::path::PathBuf {
    let mut base = std::env::temp_dir();
    let uniq = format!(
        "ftpc_test_{}_{}",
        std::process::id(),
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
    );
    base.push(uniq);
    std::fs::create_dir(&base).expect("create tmp dir");
    base
}

#[derive(Default)]
struct Script {
    remote: HashMap<String, Vec<u8>>,
    refuse_finalize: bool,
    write_fail_after: Option<usize>,
    read_fail_after: Option<usize>,
    connects: usize,
    logouts: usize,
    deleted: Vec<String>,
}

/// Connector whose sessions follow a fixed script: which remote files exist,
/// when streams break and what the server says on finalize.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn with_remote(self, path: &str, data: Vec<u8>) -> Self {
        self.script.lock().unwrap().remote.insert(path.to_string(), data);
        self
    }

    pub fn with_finalize(self, ok: bool) -> Self {
        self.script.lock().unwrap().refuse_finalize = !ok;
        self
    }

    pub fn with_write_failure_after(self, writes: usize) -> Self {
        self.script.lock().unwrap().write_fail_after = Some(writes);
        self
    }

    pub fn with_read_failure_after(self, reads: usize) -> Self {
        self.script.lock().unwrap().read_fail_after = Some(reads);
        self
    }

    pub fn connects(&self) -> usize {
        self.script.lock().unwrap().connects
    }

    pub fn logouts(&self) -> usize {
        self.script.lock().unwrap().logouts
    }

    pub fn deleted(&self) -> Vec<String> {
        self.script.lock().unwrap().deleted.clone()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self) -> anyhow::Result<Box<dyn RemoteSession>> {
        self.script.lock().unwrap().connects += 1;
        Ok(Box::new(ScriptedSession { script: self.script.clone() }))
    }
}

struct ScriptedSession {
    script: Arc<Mutex<Script>>,
}

impl RemoteSession for ScriptedSession {
    fn open_write_stream(&mut self, _remote_path: &str) -> anyhow::Result<Box<dyn Write + Send>> {
        match self.script.lock().unwrap().write_fail_after {
            Some(n) => Ok(Box::new(FailingWriter::new(n))),
            None => Ok(Box::new(io::sink())),
        }
    }

    fn open_read_stream(&mut self, remote_path: &str) -> anyhow::Result<Box<dyn Read + Send>> {
        let script = self.script.lock().unwrap();
        let data = script
            .remote
            .get(remote_path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("550 {}: no such file", remote_path))?;
        match script.read_fail_after {
            Some(n) => Ok(Box::new(PartialReader::new(&data, n))),
            None => Ok(Box::new(io::Cursor::new(data))),
        }
    }

    fn complete_pending(&mut self) -> anyhow::Result<bool> {
        Ok(!self.script.lock().unwrap().refuse_finalize)
    }

    fn delete_remote(&mut self, remote_path: &str) -> anyhow::Result<bool> {
        self.script.lock().unwrap().deleted.push(remote_path.to_string());
        Ok(true)
    }

    fn size_query(&mut self, remote_path: &str) -> anyhow::Result<Reply> {
        let script = self.script.lock().unwrap();
        Ok(match script.remote.get(remote_path) {
            Some(data) => Reply { code: 213, text: format!("213 {}", data.len()) },
            None => Reply { code: 550, text: "550 No such file or directory".to_string() },
        })
    }

    fn logout(&mut self) {
        self.script.lock().unwrap().logouts += 1;
    }
}
