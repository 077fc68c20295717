use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Two-stage stop request shared between a signal handler and the trainer.
///
/// A graceful stop lets the current epoch finish and the network be saved.
/// An immediate stop aborts at the next sample or part boundary without
/// saving. Clones share the same flags.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Flags>,
}

#[derive(Debug, Default)]
struct Flags {
    stop: AtomicBool,
    stop_now: AtomicBool,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Escalating interrupt: the first call requests a graceful stop, any
    /// later call an immediate one.
    pub fn interrupt(&self) {
        if self.inner.stop.swap(true, Ordering::SeqCst) {
            log::info!("second interrupt received, stopping now without saving");
            self.inner.stop_now.store(true, Ordering::SeqCst);
        } else {
            log::info!("interrupt received, training will stop after the current epoch (interrupt again to force)");
        }
    }

    pub fn request_stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
    }

    /// Implies a graceful stop.
    pub fn request_stop_now(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        self.inner.stop_now.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    pub fn is_stop_now_requested(&self) -> bool {
        self.inner.stop_now.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.inner.stop.store(false, Ordering::SeqCst);
        self.inner.stop_now.store(false, Ordering::SeqCst);
    }
}
