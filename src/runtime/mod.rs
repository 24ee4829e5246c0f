//! Single-thread executor for namespace-sensitive work.
//!
//! Namespace membership belongs to the kernel thread, so every future that
//! touches a namespace must be polled on one fixed OS thread. A current-thread
//! tokio runtime never moves tasks between threads, and this wrapper is
//! `!Send`, so it cannot leave the thread that built it.

use std::future::Future;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::debug;

use crate::error::Result;

/// Runtime pinned to the thread that created it.
pub struct PinnedRuntime {
    runtime: tokio::runtime::Runtime,
    _pinned: PhantomData<Rc<()>>,
}

impl PinnedRuntime {
    /// Build the runtime. Call once at process start, on the main thread.
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        debug!(thread = ?std::thread::current().id(), "pinned runtime to thread");
        Ok(Self {
            runtime,
            _pinned: PhantomData,
        })
    }

    /// Drive `fut` to completion on the pinned thread.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_tasks_stay_on_the_pinned_thread() {
        let rt = PinnedRuntime::new().unwrap();
        let outer = std::thread::current().id();
        let inner = rt.block_on(async {
            tokio::spawn(async { std::thread::current().id() })
                .await
                .unwrap()
        });
        assert_eq!(outer, inner);
    }
}
