// Async runtime that owns the server process

use std::future::Future;
use std::io;
use std::time::Duration;

/// How long shutdown waits on blocking tasks before leaving them behind.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Drive `future` to completion on a fresh multi-threaded runtime.
///
/// Tokio reads stdin on a blocking thread that cannot be interrupted, and a
/// plain runtime drop waits for it until the client closes the pipe. This
/// shuts the runtime down with a bounded `grace` instead, so the process can
/// exit as soon as `future` returns.
pub fn block_on<F: Future>(future: F, grace: Duration) -> io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}
