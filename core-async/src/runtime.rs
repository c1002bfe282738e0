//! Runtime entry points.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs `future` to completion on a fresh multi-threaded runtime.
///
/// Backs the `#[core_async::main]` and `#[core_async::test]` macros. Panics if
/// the runtime cannot be built, which only happens when the OS refuses to
/// spawn threads.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build runtime")
        .block_on(future)
}
