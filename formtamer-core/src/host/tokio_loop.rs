//! A tokio-backed [`EventLoop`].
//!
//! All work is spawned onto a single `LocalSet`, which gives the engine the
//! cooperative, single-threaded turn model it expects. The set is only driven
//! while [`TokioEventLoop::run_until`] is awaited.

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::LocalSet;
use tokio::time::{self, Instant};

use crate::host::{EventLoop, LocalFuture, Task};

/// Length of one rendering frame (60 Hz).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Clone)]
pub struct TokioEventLoop {
    local: Rc<LocalSet>,
}

impl std::fmt::Debug for TokioEventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioEventLoop")
         .field("local", &"<LocalSet>")
         .finish()
    }
}

impl Default for TokioEventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioEventLoop {
    pub fn new() -> Self {
        Self {
            local: Rc::new(LocalSet::new()),
        }
    }

    /// Drives the loop until `future` completes. Must be called from within a
    /// tokio runtime.
    pub async fn run_until<F: Future>(&self, future: F) -> F::Output {
        self.local.run_until(future).await
    }
}

impl EventLoop for TokioEventLoop {
    fn request_animation_frame(&self, task: Task) {
        self.local.spawn_local(async move {
            time::sleep(FRAME_INTERVAL).await;
            task();
        });
    }

    fn defer(&self, task: Task) {
        self.local.spawn_local(async move {
            task();
        });
    }

    fn set_timeout(&self, delay: Duration, task: Task) {
        self.local.spawn_local(async move {
            time::sleep(delay).await;
            task();
        });
    }

    fn spawn(&self, future: LocalFuture) {
        self.local.spawn_local(future);
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test(start_paused = true)]
    async fn test_deferred_tasks_run_after_current_turn() {
        let event_loop = TokioEventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner = event_loop.clone();
        let l = log.clone();
        event_loop
            .run_until(async move {
                let l2 = l.clone();
                inner.defer(Box::new(move || l2.borrow_mut().push("deferred")));
                l.borrow_mut().push("current");
                time::sleep(Duration::from_millis(1)).await;
            })
            .await;

        assert_eq!(*log.borrow(), vec!["current", "deferred"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_fire_in_deadline_order() {
        let event_loop = TokioEventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner = event_loop.clone();
        let l = log.clone();
        event_loop
            .run_until(async move {
                let a = l.clone();
                inner.set_timeout(Duration::from_millis(200), Box::new(move || a.borrow_mut().push("cooldown")));
                let b = l.clone();
                inner.request_animation_frame(Box::new(move || b.borrow_mut().push("frame")));
                time::sleep(Duration::from_millis(250)).await;
            })
            .await;

        assert_eq!(*log.borrow(), vec!["frame", "cooldown"]);
    }
}
