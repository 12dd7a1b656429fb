use anyhow::Result;

use crate::config::{DEFAULT_FTP_PORT, ServerConfig};

/// Split `user@host[:port]`; the port defaults to 21.
pub fn parse_remote_host(input: &str) -> Result<(String, String, u16)> {
    let at_pos = input
        .rfind('@')
        .ok_or_else(|| anyhow::anyhow!("missing user name, expected user@host[:port]"))?;
    let (user_part, host_part) = input.split_at(at_pos);
    let user = user_part.trim();
    let host_port = &host_part[1..]; // skip '@'
    if user.is_empty() || host_port.is_empty() {
        return Err(anyhow::anyhow!("user name or host is empty"));
    }

    let (host, port) = if let Some(colon) = host_port.rfind(':') {
        let (h, p_str) = host_port.split_at(colon);
        let p_str = &p_str[1..]; // skip ':'
        let p: u16 = p_str.parse().map_err(|_| anyhow::anyhow!("invalid port: {}", p_str))?;
        (h.to_string(), p)
    } else {
        (host_port.to_string(), DEFAULT_FTP_PORT)
    };
    if host.is_empty() {
        return Err(anyhow::anyhow!("host is empty"));
    }

    Ok((user.to_string(), host, port))
}

/// Apply a `user@host[:port]` string on top of `base`, keeping its timeouts.
pub fn apply_server_spec(base: &ServerConfig, spec: &str) -> Result<ServerConfig> {
    let (username, host, port) = parse_remote_host(spec)?;
    Ok(ServerConfig { host, port, username, ..base.clone() })
}
