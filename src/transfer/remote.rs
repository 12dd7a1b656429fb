use std::io::{Read, Write};

/// Reply to a control-channel command: numeric code plus the raw reply text
/// (first line, e.g. `"213 1048576"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u32,
    pub text: String,
}

/// Remote-file session operations the transfer tasks rely on. One session is
/// owned by exactly one task for its whole lifetime. Streams are boxed so
/// tests can hand in in-memory readers/writers.
pub trait RemoteSession: Send {
    fn open_write_stream(&mut self, remote_path: &str) -> anyhow::Result<Box<dyn Write + Send>>;
    fn open_read_stream(&mut self, remote_path: &str) -> anyhow::Result<Box<dyn Read + Send>>;
    /// Read the server's verdict on the transfer whose data stream was just
    /// closed. `Ok(false)` means the server refused to confirm it.
    fn complete_pending(&mut self) -> anyhow::Result<bool>;
    fn delete_remote(&mut self, remote_path: &str) -> anyhow::Result<bool>;
    fn size_query(&mut self, remote_path: &str) -> anyhow::Result<Reply>;
    /// Log out and disconnect. Never fails; problems are only logged.
    fn logout(&mut self);
}

/// Opens fresh, logged-in sessions. Shared by every task of a manager.
pub trait Connector: Send + Sync {
    fn connect(&self) -> anyhow::Result<Box<dyn RemoteSession>>;
}
