//! Async runtime helpers for blocking callers.
//!
//! This module provides a single entry point for executing async futures from
//! synchronous code paths, reusing the current Tokio runtime when available.

use std::future::Future;

use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tokio::task;

/// Execute an async future from synchronous code.
///
/// # Returns
/// Returns the future's output or the I/O error raised while building a
/// runtime.
///
/// # Notes
/// - Reuses the current multi-thread runtime when available.
/// - Inside a current-thread runtime the future runs on a scoped helper
///   thread with its own runtime, since that flavor cannot block in place.
/// - Falls back to a single-threaded runtime for call sites outside Tokio.
pub fn block_on_future<F>(future: F) -> std::io::Result<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(task::block_in_place(|| handle.block_on(future)))
        }
        Ok(_) => std::thread::scope(|scope| {
            scope
                .spawn(|| run_on_fresh_runtime(future))
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("blocking helper thread panicked")))
        }),
        Err(_) => run_on_fresh_runtime(future),
    }
}

fn run_on_fresh_runtime<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
