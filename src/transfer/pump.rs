use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::TransferError;

/// Cooperative cancellation signal shared between the registry and one task.
/// Set at most once and never cleared.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a pump run ended when no stream fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Source reached EOF; carries the bytes moved.
    Finished(u64),
    /// `should_cancel` returned true after a chunk; streams are left open.
    Interrupted(u64),
}

/// Copy `source` into `sink` in chunks of at most `chunk_size` bytes.
///
/// After every fully written chunk `on_bytes(len)` runs, then `should_cancel()`
/// is polled. Any read or write fault aborts immediately as `StreamIoFailed`.
pub fn pump<R, W, C, B>(
    source: &mut R,
    sink: &mut W,
    chunk_size: usize,
    mut should_cancel: C,
    mut on_bytes: B,
) -> Result<PumpOutcome, TransferError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    C: FnMut() -> bool,
    B: FnMut(u64),
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut moved: u64 = 0;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(TransferError::StreamIoFailed(format!("read failed: {}", e)));
            }
        };
        sink.write_all(&buf[..n])
            .map_err(|e| TransferError::StreamIoFailed(format!("write failed: {}", e)))?;
        moved += n as u64;
        on_bytes(n as u64);
        if should_cancel() {
            return Ok(PumpOutcome::Interrupted(moved));
        }
    }
    sink.flush().map_err(|e| TransferError::StreamIoFailed(format!("flush failed: {}", e)))?;
    Ok(PumpOutcome::Finished(moved))
}
