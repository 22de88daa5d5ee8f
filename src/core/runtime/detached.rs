//! Runs blocking work away from whatever async runtime the caller is on.
//!
//! A blocking HTTP transfer must not run on a thread that belongs to a
//! tokio runtime (nested `block_on` panics, and worker threads would stall).
//! `run_detached` hands the closure to a scoped thread with no ambient
//! runtime, blocks the caller until it is done and re-raises a panic on the
//! calling thread. The caller's own context is never modified, so there is
//! nothing to restore on any exit path.

use std::io;
use std::panic;
use std::thread;

/// Fails only if the helper thread cannot be spawned.
pub fn run_detached<F, T>(work: F) -> io::Result<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("qml-runtime-transfer".to_string())
            .spawn_scoped(scope, work)?;

        match handle.join() {
            Ok(value) => Ok(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}

/// True when the calling thread is inside a tokio runtime.
pub fn in_async_context() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}
