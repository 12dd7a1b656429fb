use super::remote::{RemoteSession, Reply};
use crate::TransferError;

/// FTP "213 File status" reply code.
pub const FILE_STATUS: u32 = 213;

/// Ask the server for `remote_path`'s size via `SIZE` and parse the reply.
pub fn resolve_remote_size(
    session: &mut dyn RemoteSession,
    remote_path: &str,
) -> Result<u64, TransferError> {
    let reply = session
        .size_query(remote_path)
        .map_err(|e| TransferError::SizeQueryFailed(remote_path.to_string(), format!("{:#}", e)))?;
    parse_size_reply(remote_path, &reply)
}

pub(crate) fn parse_size_reply(remote_path: &str, reply: &Reply) -> Result<u64, TransferError> {
    if reply.code != FILE_STATUS {
        return Err(TransferError::SizeQueryFailed(
            remote_path.to_string(),
            format!("size cmd response {}", reply.code),
        ));
    }
    let first_line = reply.text.lines().next().unwrap_or("");
    let payload = first_line.split_whitespace().nth(1).unwrap_or("");
    if payload.is_empty() || !payload.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TransferError::SizeParseFailed(remote_path.to_string(), first_line.to_string()));
    }
    payload
        .parse::<u64>()
        .map_err(|_| TransferError::SizeParseFailed(remote_path.to_string(), first_line.to_string()))
}
