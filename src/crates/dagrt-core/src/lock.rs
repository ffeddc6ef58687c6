//! Lock Orchestrator: per-node `Event` (one-shot sticky signal) and
//! `Condition` (broadcast predicate wait) primitives, keyed by arbitrary
//! identifier. Built on `tokio::sync::Notify` so waits are cooperative —
//! never holding an OS lock across an `.await`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// One-shot, sticky signal. The first `set()` wakes every current and
/// future waiter; subsequent `wait()`s return immediately.
#[derive(Default)]
pub struct Event {
    notify: Notify,
    fired: AtomicBool,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_set(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Blocks until `set()` has been called at least once. Registers for
    /// notification before re-checking the flag, so a `set()` racing with
    /// the check can never be missed (tokio's documented `Notify` pattern).
    pub async fn wait(&self) {
        loop {
            if self.fired.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.notify.notified();
            if self.fired.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// Repeatedly signallable predicate wait. `wait_for` re-evaluates its
/// predicate on every `notify_all` broadcast (and tolerates spurious
/// wake-ups by simply re-checking).
#[derive(Default)]
pub struct Condition {
    notify: Notify,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_all(&self) {
        self.notify.notify_waiters();
    }

    pub async fn wait_for(&self, mut predicate: impl FnMut() -> bool) {
        loop {
            if predicate() {
                return;
            }
            let notified = self.notify.notified();
            if predicate() {
                return;
            }
            notified.await;
        }
    }
}

/// Lazily-created, keyed `Event`s and `Condition`s shared by one pipeline
/// run's dispatch context and its spawned node tasks.
#[derive(Default)]
pub struct LockOrchestrator {
    events: Mutex<HashMap<String, Arc<Event>>>,
    conditions: Mutex<HashMap<String, Arc<Condition>>>,
}

impl LockOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(&self, key: &str) -> Arc<Event> {
        self.events.lock().entry(key.to_string()).or_insert_with(|| Arc::new(Event::new())).clone()
    }

    pub fn condition(&self, key: &str) -> Arc<Condition> {
        self.conditions.lock().entry(key.to_string()).or_insert_with(|| Arc::new(Condition::new())).clone()
    }

    /// Drop a keyed `Event` so a later recurrent iteration can claim the
    /// node again via a fresh one-shot signal.
    pub fn reset_event(&self, key: &str) {
        self.events.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn event_wait_returns_immediately_after_set() {
        let e = Event::new();
        e.set();
        tokio::time::timeout(Duration::from_millis(50), e.wait()).await.expect("should not block");
    }

    #[tokio::test]
    async fn event_wakes_a_waiter_on_set() {
        let e = Arc::new(Event::new());
        let e2 = e.clone();
        let handle = tokio::spawn(async move {
            e2.wait().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        e.set();
        tokio::time::timeout(Duration::from_millis(200), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn condition_wait_for_unblocks_on_notify() {
        let cond = Arc::new(Condition::new());
        let flag = Arc::new(AtomicBool::new(false));
        let cond2 = cond.clone();
        let flag2 = flag.clone();
        let handle = tokio::spawn(async move {
            cond2.wait_for(|| flag2.load(Ordering::SeqCst)).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        flag.store(true, Ordering::SeqCst);
        cond.notify_all();
        tokio::time::timeout(Duration::from_millis(200), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn condition_tolerates_spurious_wakeups() {
        let cond = Condition::new();
        let counter = AtomicUsize::new(0);
        cond.wait_for(|| counter.fetch_add(1, Ordering::SeqCst) > 2).await;
    }

    #[test]
    fn orchestrator_reuses_the_same_event_for_a_key() {
        let lo = LockOrchestrator::new();
        let a = lo.event("n");
        let b = lo.event("n");
        a.set();
        assert!(b.is_set());
    }
}
