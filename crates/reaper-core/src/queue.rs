//! Reconciliation request queue.
//!
//! [`WorkQueue`] is the seam between event intake and the worker pool.
//! [`MemoryWorkQueue`] is the in-process implementation:
//! - a key pending in the queue is held once, however often it is added
//! - a key handed to a worker is not handed out again until `done`; adds
//!   that arrive meanwhile are replayed when the worker acks
//! - delayed adds keep one timer per key, holding the earliest deadline;
//!   timers enqueue on expiry and die with shutdown
//! - after `shut_down`, adds are ignored and `dequeue` drains what is left,
//!   then yields `None`

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reaper_state::ObjectKey;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Injectable queue of reconciliation requests.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Add a key for immediate processing.
    fn enqueue(&self, key: ObjectKey);

    /// Add a key once `delay` has elapsed.
    fn enqueue_after(&self, key: ObjectKey, delay: Duration);

    /// Wait for the next key, `None` once shut down and drained.
    async fn dequeue(&self) -> Option<ObjectKey>;

    /// Acknowledge that processing of `key` finished.
    fn done(&self, key: &ObjectKey);

    fn shut_down(&self);

    fn is_shutting_down(&self) -> bool;

    /// Number of keys ready to be dequeued.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<ObjectKey>,
    /// Keys waiting to be processed, whether queued or parked behind an in-flight attempt.
    dirty: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    /// Armed delayed adds: deadline and the timer task that fires it.
    waiting: HashMap<ObjectKey, (Instant, AbortHandle)>,
    shutting_down: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
    shutdown: CancellationToken,
}

/// In-memory deduplicating work queue.
#[derive(Debug, Clone)]
pub struct MemoryWorkQueue {
    inner: Arc<Inner>,
}

impl Default for MemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Number of keys currently handed out to workers.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().processing.len()
    }

    /// Number of keys with an armed delayed add.
    pub fn delayed(&self) -> usize {
        self.inner.lock().waiting.len()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, key: ObjectKey) {
        let mut state = self.lock();
        if state.shutting_down || !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Fire the delayed add for `key` if `deadline` is still the armed one.
    fn fire(&self, key: ObjectKey, deadline: Instant) {
        {
            let mut state = self.lock();
            let armed = state.waiting.get(&key).map(|(at, _)| *at);
            if armed != Some(deadline) {
                return;
            }
            state.waiting.remove(&key);
        }
        self.add(key);
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    fn enqueue(&self, key: ObjectKey) {
        self.inner.add(key);
    }

    fn enqueue_after(&self, key: ObjectKey, delay: Duration) {
        if delay.is_zero() {
            self.inner.add(key);
            return;
        }
        let deadline = Instant::now() + delay;
        let mut state = self.inner.lock();
        if state.shutting_down {
            return;
        }
        if let Some((armed, _)) = state.waiting.get(&key) {
            if *armed <= deadline {
                return;
            }
        }

        let sleep = tokio::time::sleep_until(deadline);
        let inner = Arc::clone(&self.inner);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => {}
                _ = sleep => inner.fire(timer_key, deadline),
            }
        });
        if let Some((_, earlier)) = state.waiting.insert(key, (deadline, timer.abort_handle())) {
            earlier.abort();
        }
    }

    async fn dequeue(&self) -> Option<ObjectKey> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.inner.notify.notify_one();
                    }
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    fn done(&self, key: &ObjectKey) {
        let mut state = self.inner.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    fn shut_down(&self) {
        {
            let mut state = self.inner.lock();
            state.shutting_down = true;
            state.waiting.clear();
        }
        self.inner.shutdown.cancel();
        self.inner.notify.notify_waiters();
    }

    fn is_shutting_down(&self) -> bool {
        self.inner.lock().shutting_down
    }

    fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }
}
