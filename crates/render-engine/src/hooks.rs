//! Collaborator callbacks for a running job.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Progress callback, called with an integer percentage.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Log callback for human-readable status lines.
pub type LogFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Cancellation predicate, polled by the supervisor.
pub type CancelFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Callbacks attached to one job. All are optional.
#[derive(Clone, Default)]
pub struct JobHooks {
    progress: Option<ProgressFn>,
    log: Option<LogFn>,
    cancel: Option<CancelFn>,
}

impl fmt::Debug for JobHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHooks")
            .field("progress", &self.progress.is_some())
            .field("log", &self.log.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

impl JobHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f));
        self
    }

    pub fn with_log(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log = Some(Arc::new(f));
        self
    }

    pub fn with_cancel(mut self, f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.cancel = Some(Arc::new(f));
        self
    }

    /// Cancel when `flag` becomes true.
    pub fn with_cancel_flag(self, flag: Arc<AtomicBool>) -> Self {
        self.with_cancel(move || flag.load(Ordering::SeqCst))
    }

    pub(crate) fn with_shared(
        progress: Option<ProgressFn>,
        log: Option<LogFn>,
        cancel: Option<CancelFn>,
    ) -> Self {
        Self {
            progress,
            log,
            cancel,
        }
    }

    pub fn report_progress(&self, percent: u8) {
        if let Some(f) = &self.progress {
            f(percent.min(100));
        }
    }

    pub fn log(&self, message: &str) {
        if let Some(f) = &self.log {
            f(message);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|f| f())
    }

    pub(crate) fn log_fn(&self) -> Option<LogFn> {
        self.log.clone()
    }

    pub(crate) fn cancel_fn(&self) -> Option<CancelFn> {
        self.cancel.clone()
    }
}

#[derive(Debug, Default)]
struct SlotState {
    value: Option<u8>,
    closed: bool,
}

/// Single-slot, last-value-wins progress hand-off between a worker and a
/// display loop. Publishing never blocks; unread values are overwritten.
#[derive(Debug, Default)]
pub struct ProgressSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl ProgressSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, percent: u8) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.value = Some(percent);
        self.ready.notify_one();
    }

    /// Take the latest unread value, if any.
    pub fn take(&self) -> Option<u8> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .value
            .take()
    }

    /// Wait up to `timeout` for a value. Returns `None` on timeout or
    /// once the slot is closed and drained.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<u8> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.value.is_none() && !s.closed)
            .unwrap_or_else(|e| e.into_inner());
        state.value.take()
    }

    /// Wake any waiter; no further values are expected.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_hooks_default_to_noops() {
        let hooks = JobHooks::new();
        hooks.report_progress(50);
        hooks.log("nothing listens");
        assert!(!hooks.is_cancelled());
    }

    #[test]
    fn test_cancel_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let hooks = JobHooks::new().with_cancel_flag(flag.clone());
        assert!(!hooks.is_cancelled());
        flag.store(true, Ordering::SeqCst);
        assert!(hooks.is_cancelled());
    }

    #[test]
    fn test_progress_is_clamped() {
        let seen = Arc::new(AtomicU32::new(0));
        let sink = seen.clone();
        let hooks = JobHooks::new().with_progress(move |p| sink.store(p as u32, Ordering::SeqCst));
        hooks.report_progress(140);
        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_slot_keeps_only_latest() {
        let slot = ProgressSlot::new();
        slot.publish(10);
        slot.publish(20);
        slot.publish(30);
        assert_eq!(slot.take(), Some(30));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_slot_wait_across_threads() {
        let slot = ProgressSlot::new();
        let producer = slot.clone();
        let handle = std::thread::spawn(move || {
            producer.publish(42);
            producer.close();
        });
        handle.join().unwrap();
        assert_eq!(slot.wait_timeout(Duration::from_secs(1)), Some(42));
        assert!(slot.is_closed());
        assert_eq!(slot.wait_timeout(Duration::from_millis(10)), None);
    }
}
