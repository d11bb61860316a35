//! Frame-aligned coalescing of re-application requests.
//!
//! Mutation observers can fire hundreds of times while a page renders. The
//! scheduler folds every notification that arrives while a re-application is
//! pending into that single pending run, so the pipeline runs at most once per
//! animation frame. The pending flag is cleared before the target runs, so
//! mutations the target itself causes schedule the next frame.

use std::cell::Cell;
use std::rc::Rc;

use log::debug;

use crate::host::EventLoop;

const TARGET: &str = "formtamer_core::scheduler";

pub struct ScanScheduler {
    event_loop: Rc<dyn EventLoop>,
    scheduled: Rc<Cell<bool>>,
    target: Rc<dyn Fn()>,
}

impl std::fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanScheduler")
            .field("scheduled", &self.scheduled.get())
            .finish()
    }
}

impl ScanScheduler {
    pub fn new(event_loop: Rc<dyn EventLoop>, target: Rc<dyn Fn()>) -> Self {
        Self {
            event_loop,
            scheduled: Rc::new(Cell::new(false)),
            target,
        }
    }

    /// Requests a re-application on the next frame. Returns false when one is
    /// already pending and this request was absorbed.
    pub fn notify(&self) -> bool {
        if self.scheduled.replace(true) {
            debug!(target: TARGET, "Re-application already pending; absorbed notification.");
            return false;
        }
        let scheduled = self.scheduled.clone();
        let target = self.target.clone();
        self.event_loop.request_animation_frame(Box::new(move || {
            scheduled.set(false);
            debug!(target: TARGET, "Frame tick; re-applying.");
            target();
        }));
        true
    }

    pub fn is_pending(&self) -> bool {
        self.scheduled.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{TokioEventLoop, FRAME_INTERVAL};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_call() {
        let tokio_loop = TokioEventLoop::new();
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let scheduler = Rc::new(ScanScheduler::new(
            Rc::new(tokio_loop.clone()),
            Rc::new(move || c.set(c.get() + 1)),
        ));

        let s = scheduler.clone();
        let counted = calls.clone();
        tokio_loop
            .run_until(async move {
                assert!(s.notify());
                for _ in 0..50 {
                    assert!(!s.notify());
                }
                assert!(s.is_pending());
                tokio::time::sleep(FRAME_INTERVAL + Duration::from_millis(1)).await;
                assert_eq!(counted.get(), 1);
                assert!(!s.is_pending());

                assert!(s.notify());
                tokio::time::sleep(FRAME_INTERVAL + Duration::from_millis(1)).await;
                assert_eq!(counted.get(), 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_can_reschedule_itself() {
        let tokio_loop = TokioEventLoop::new();
        let calls = Rc::new(Cell::new(0));
        let slot: Rc<Cell<Option<Rc<ScanScheduler>>>> = Rc::new(Cell::new(None));

        let c = calls.clone();
        let inner = slot.clone();
        let scheduler = Rc::new(ScanScheduler::new(
            Rc::new(tokio_loop.clone()),
            Rc::new(move || {
                c.set(c.get() + 1);
                if c.get() == 1 {
                    if let Some(s) = inner.take() {
                        assert!(s.notify());
                    }
                }
            }),
        ));
        slot.set(Some(scheduler.clone()));

        let s = scheduler.clone();
        let counted = calls.clone();
        tokio_loop
            .run_until(async move {
                s.notify();
                tokio::time::sleep(FRAME_INTERVAL * 3).await;
                assert_eq!(counted.get(), 2);
            })
            .await;
    }
}
