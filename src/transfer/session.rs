use std::io::{Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use anyhow::Context;
use suppaftp::types::{FileType, FtpError};
use suppaftp::{FtpStream, Status};

use super::remote::{Connector, RemoteSession, Reply};
use crate::config::ServerConfig;

/// Opens logged-in, binary-mode control connections to one FTP server.
#[derive(Clone)]
pub struct FtpConnector {
    server: ServerConfig,
    password: String,
}

impl FtpConnector {
    pub fn new(server: ServerConfig, password: impl Into<String>) -> Self {
        Self { server, password: password.into() }
    }

    fn resolve(&self) -> anyhow::Result<SocketAddr> {
        let addr = self.server.address();
        addr.to_socket_addrs()
            .with_context(|| format!("resolve {}", addr))?
            .next()
            .ok_or_else(|| anyhow::anyhow!("no address found for {}", addr))
    }
}

impl Connector for FtpConnector {
    fn connect(&self) -> anyhow::Result<Box<dyn RemoteSession>> {
        let sock = self.resolve()?;
        let addr = self.server.address();
        let mut ftp = FtpStream::connect_timeout(
            sock,
            Duration::from_secs(self.server.connect_timeout_secs),
        )
        .with_context(|| format!("connect {}", addr))?;
        let io_timeout = Some(Duration::from_secs(self.server.io_timeout_secs));
        let _ = ftp.get_ref().set_read_timeout(io_timeout);
        let _ = ftp.get_ref().set_write_timeout(io_timeout);
        ftp.login(self.server.username.as_str(), self.password.as_str())
            .with_context(|| format!("login {}@{}", self.server.username, addr))?;
        ftp.transfer_type(FileType::Binary).context("switch to binary mode")?;
        tracing::debug!("[ftpc] session ready {}@{}", self.server.username, addr);
        Ok(Box::new(FtpSession { ftp: Some(ftp) }))
    }
}

/// One control connection. `ftp` is taken on logout so a second logout is a no-op.
pub struct FtpSession {
    ftp: Option<FtpStream>,
}

impl FtpSession {
    fn stream(&mut self) -> anyhow::Result<&mut FtpStream> {
        self.ftp.as_mut().ok_or_else(|| anyhow::anyhow!("session already logged out"))
    }
}

impl RemoteSession for FtpSession {
    fn open_write_stream(&mut self, remote_path: &str) -> anyhow::Result<Box<dyn Write + Send>> {
        let data = self.stream()?.put_with_stream(remote_path)?;
        Ok(Box::new(data))
    }

    fn open_read_stream(&mut self, remote_path: &str) -> anyhow::Result<Box<dyn Read + Send>> {
        let data = self.stream()?.retr_as_stream(remote_path)?;
        Ok(Box::new(data))
    }

    // The task has already dropped the data stream, so this only reads the
    // server's closing reply (226/250 for both STOR and RETR).
    fn complete_pending(&mut self) -> anyhow::Result<bool> {
        match self.stream()?.finalize_put_stream(std::io::sink()) {
            Ok(()) => Ok(true),
            Err(FtpError::UnexpectedResponse(resp)) => {
                tracing::debug!("[ftpc] transfer not confirmed: {}", resp.status.code());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete_remote(&mut self, remote_path: &str) -> anyhow::Result<bool> {
        match self.stream()?.rm(remote_path) {
            Ok(()) => Ok(true),
            Err(FtpError::UnexpectedResponse(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn size_query(&mut self, remote_path: &str) -> anyhow::Result<Reply> {
        let resp = match self
            .stream()?
            .custom_command(format!("SIZE {}", remote_path), &[Status::File])
        {
            Ok(r) => r,
            Err(FtpError::UnexpectedResponse(r)) => r,
            Err(e) => return Err(e.into()),
        };
        let code = resp.status.code();
        let body = String::from_utf8_lossy(&resp.body).trim_end().to_string();
        let text =
            if body.starts_with(&code.to_string()) { body } else { format!("{} {}", code, body) };
        Ok(Reply { code, text })
    }

    fn logout(&mut self) {
        if let Some(mut ftp) = self.ftp.take()
            && let Err(e) = ftp.quit()
        {
            tracing::warn!("[ftpc] logout failed: {}", e);
        }
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        self.logout();
    }
}
