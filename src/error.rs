/// Structured errors for transfer admission and execution.
///
/// Admission-time variants are returned synchronously from `start_*`/`cancel_*`;
/// everything else only ever shows up inside `TransferOutcome::Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// A transfer with the same token is still pending.
    DuplicateTransfer(String),
    /// The direction's pool is full: (direction, configured maximum).
    CapacityExceeded(String, usize),
    UnknownToken(String),
    InvalidRemotePath(String),
    /// (local path, reason)
    LocalFileUnreadable(String, String),
    LocalFileExists(String),
    /// (remote path, reason)
    SizeQueryFailed(String, String),
    /// (remote path, unparsable reply text)
    SizeParseFailed(String, String),
    StreamIoFailed(String),
    UploadNotConfirmed(String),
    DownloadNotConfirmed(String),
    // connect / login
    SessionFailed(String),
    SpawnFailed(String),
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use TransferError::*;
        match self {
            DuplicateTransfer(token) => write!(f, "same transfer is already running: {}", token),
            CapacityExceeded(dir, max) => {
                write!(f, "has reached max {} tasks ({} running)", dir, max)
            }
            UnknownToken(token) => write!(f, "token is wrong: {}", token),
            InvalidRemotePath(p) => write!(f, "remote path cannot be a dir: {}", p),
            LocalFileUnreadable(p, why) => write!(f, "cannot read local file {}: {}", p, why),
            LocalFileExists(p) => write!(f, "local file exists: {}", p),
            SizeQueryFailed(p, why) => write!(f, "size query failed for {}: {}", p, why),
            SizeParseFailed(p, text) => {
                write!(f, "size reply for {} is not a byte count: {:?}", p, text)
            }
            StreamIoFailed(msg) => write!(f, "transfer/IO error: {}", msg),
            UploadNotConfirmed(p) => write!(f, "{} is not uploaded successfully", p),
            DownloadNotConfirmed(p) => write!(f, "{} is not downloaded successfully", p),
            SessionFailed(msg) => write!(f, "cannot establish session: {}", msg),
            SpawnFailed(msg) => write!(f, "cannot start transfer thread: {}", msg),
        }
    }
}

impl std::error::Error for TransferError {}

impl TransferError {
    /// Stable variant name, used for machine-readable output.
    pub fn variant(&self) -> &'static str {
        use TransferError::*;
        match self {
            DuplicateTransfer(_) => "DuplicateTransfer",
            CapacityExceeded(_, _) => "CapacityExceeded",
            UnknownToken(_) => "UnknownToken",
            InvalidRemotePath(_) => "InvalidRemotePath",
            LocalFileUnreadable(_, _) => "LocalFileUnreadable",
            LocalFileExists(_) => "LocalFileExists",
            SizeQueryFailed(_, _) => "SizeQueryFailed",
            SizeParseFailed(_, _) => "SizeParseFailed",
            StreamIoFailed(_) => "StreamIoFailed",
            UploadNotConfirmed(_) => "UploadNotConfirmed",
            DownloadNotConfirmed(_) => "DownloadNotConfirmed",
            SessionFailed(_) => "SessionFailed",
            SpawnFailed(_) => "SpawnFailed",
        }
    }

    /// Whether starting the same transfer again may succeed without the caller
    /// changing anything. Network/IO trouble and a full pool are transient;
    /// path and validation problems are not.
    pub fn is_retriable(&self) -> bool {
        use TransferError::*;
        match self {
            StreamIoFailed(_)
            | SessionFailed(_)
            | UploadNotConfirmed(_)
            | DownloadNotConfirmed(_)
            | CapacityExceeded(_, _)
            | SpawnFailed(_) => true,
            DuplicateTransfer(_)
            | UnknownToken(_)
            | InvalidRemotePath(_)
            | LocalFileUnreadable(_, _)
            | LocalFileExists(_)
            | SizeQueryFailed(_, _)
            | SizeParseFailed(_, _) => false,
        }
    }
}
