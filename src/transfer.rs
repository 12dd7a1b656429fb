// transfer module: transfer identity, per-task state machine and the registry
mod helpers;
mod progress;
mod pump;
mod registry;
mod remote;
mod session;
mod size;
mod task;
mod token;

#[cfg(test)]
pub(crate) mod mock_io;

pub use helpers::{
    is_remote_dir_path, normalize_path, remote_file_name, resolve_local_destination,
    resolve_remote_destination,
};
pub use progress::ProgressThrottle;
pub use pump::{CancelFlag, PumpOutcome, pump};
pub use registry::{TransferHandle, TransferManager};
pub use remote::{Connector, RemoteSession, Reply};
pub use session::{FtpConnector, FtpSession};
pub use size::{FILE_STATUS, resolve_remote_size};
pub use task::{ProgressEvent, TransferOutcome};
pub use token::{Direction, Token};
