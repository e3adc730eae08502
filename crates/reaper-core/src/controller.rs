//! Change feed → filter → work queue → worker pool.
//!
//! A [`Controller`] owns one queue and one reconciler. Its intake loop
//! classifies every notification from the change feed and enqueues admitted
//! keys; its workers pull keys, run one bounded attempt each and translate
//! the result into a queue directive. Errors are never retried in place:
//! the key is acked and handed back with the configured retry delay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reaper_state::{ObjectKey, WatchEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::classifier::{Classification, EventFilter};
use crate::config::ControllerConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::metrics::METRICS;
use crate::obs;
use crate::queue::WorkQueue;
use crate::scheduling::{Action, Directive};

/// One reconciliation strategy keyed by [`ObjectKey`].
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Short name used in logs and spans.
    fn name(&self) -> &'static str;

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<Action>;

    /// Keys to enqueue on start and after the change feed lagged.
    async fn resync(&self) -> ReconcileResult<Vec<ObjectKey>> {
        Ok(Vec::new())
    }
}

pub struct Controller {
    name: &'static str,
    filter: Arc<dyn EventFilter>,
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<dyn WorkQueue>,
    workers: usize,
    reconcile_timeout: Duration,
    retry_delay: Duration,
    resync_on_start: bool,
}

impl Controller {
    pub fn new(
        filter: Arc<dyn EventFilter>,
        reconciler: Arc<dyn Reconciler>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        let defaults = ControllerConfig::default();
        Self {
            name: reconciler.name(),
            filter,
            reconciler,
            queue,
            workers: 1,
            reconcile_timeout: defaults.reconcile_timeout,
            retry_delay: defaults.retry_delay,
            resync_on_start: defaults.resync_on_start,
        }
    }

    /// Number of concurrent workers; 0 is treated as 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_reconcile_timeout(mut self, timeout: Duration) -> Self {
        self.reconcile_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_resync_on_start(mut self, enabled: bool) -> Self {
        self.resync_on_start = enabled;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.queue
    }

    /// Classify one notification and enqueue its key when admitted.
    pub fn ingest(&self, event: &WatchEvent) -> Classification {
        let classification = self.filter.classify(event);
        obs::emit_event_classified(
            self.name,
            event.kind(),
            classification.key(),
            classification.is_admitted(),
        );
        match &classification {
            Classification::Admit(key) => {
                METRICS.inc_events_admitted();
                self.queue.enqueue(key.clone());
            }
            Classification::Drop => METRICS.inc_events_dropped(),
        }
        classification
    }

    /// Enqueue every key the reconciler reports for resync.
    pub async fn resync(&self) -> usize {
        match self.reconciler.resync().await {
            Ok(keys) => {
                let count = keys.len();
                for key in keys {
                    self.queue.enqueue(key);
                }
                info!(controller = self.name, keys = count, "resync enqueued");
                count
            }
            Err(e) => {
                warn!(controller = self.name, error = %e, "resync failed");
                0
            }
        }
    }

    /// Run one attempt for `key` and apply the resulting directive to the queue.
    ///
    /// The caller must have obtained `key` from this controller's queue.
    pub async fn process(&self, key: ObjectKey) -> Directive {
        let result = self
            .attempt(&key)
            .instrument(obs::reconcile_span(self.name, &key))
            .await;
        let directive = Directive::from_result(&result);

        self.queue.done(&key);
        match directive {
            Directive::Done => {
                if let Err(e) = &result {
                    debug!(controller = self.name, key = %key, error = %e, "absorbed");
                }
            }
            Directive::RequeueAfter(after) => {
                METRICS.inc_requeues();
                obs::emit_requeue_scheduled(self.name, &key, after);
                self.queue.enqueue_after(key, after);
            }
            Directive::Retry(kind) => {
                METRICS.inc_reconcile_errors();
                if let Err(e) = &result {
                    obs::emit_reconcile_error(self.name, &key, kind, e);
                }
                self.queue.enqueue_after(key, self.retry_delay);
            }
        }
        directive
    }

    async fn attempt(&self, key: &ObjectKey) -> ReconcileResult<Action> {
        obs::emit_reconcile_started(self.name, key);
        if self.reconcile_timeout.is_zero() {
            return self.reconciler.reconcile(key).await;
        }
        match tokio::time::timeout(self.reconcile_timeout, self.reconciler.reconcile(key)).await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Timeout {
                key: key.clone(),
                budget: self.reconcile_timeout,
            }),
        }
    }

    async fn worker_loop(self: Arc<Self>, worker: usize) {
        debug!(controller = self.name, worker, "worker started");
        while let Some(key) = self.queue.dequeue().await {
            self.process(key).await;
        }
        debug!(controller = self.name, worker, "worker stopped");
    }

    /// Run intake and workers until `cancel` fires.
    ///
    /// On cancellation the queue is shut down, workers drain what is already
    /// queued, and counters are flushed.
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<WatchEvent>,
        cancel: CancellationToken,
    ) {
        info!(controller = self.name, workers = self.workers, "controller starting");
        if self.resync_on_start {
            self.resync().await;
        }

        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            workers.spawn(Arc::clone(&self).worker_loop(worker));
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        self.ingest(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(controller = self.name, skipped, "change feed lagged; resyncing");
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        info!(controller = self.name, "change feed closed");
                        cancel.cancelled().await;
                        break;
                    }
                },
            }
        }

        self.queue.shut_down();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(controller = self.name, error = %e, "worker task failed");
            }
        }
        METRICS.flush();
        info!(controller = self.name, "controller stopped");
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("reconcile_timeout", &self.reconcile_timeout)
            .field("retry_delay", &self.retry_delay)
            .field("resync_on_start", &self.resync_on_start)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TtlCleanupFilter;
    use crate::error::ErrorKind;
    use crate::queue::MemoryWorkQueue;
    use reaper_state::StoreError;
    use std::sync::Mutex;

    /// Replays a fixed script of results, one per call.
    struct Scripted {
        script: Mutex<Vec<ReconcileResult<Action>>>,
        delay: Option<Duration>,
    }

    impl Scripted {
        fn new(mut script: Vec<ReconcileResult<Action>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl Reconciler for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn reconcile(&self, _key: &ObjectKey) -> ReconcileResult<Action> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script.lock().unwrap().pop().unwrap_or(Ok(Action::Done))
        }
    }

    fn controller(reconciler: Scripted) -> (Controller, MemoryWorkQueue) {
        let queue = MemoryWorkQueue::new();
        let controller = Controller::new(
            Arc::new(TtlCleanupFilter),
            Arc::new(reconciler),
            Arc::new(queue.clone()),
        )
        .with_retry_delay(Duration::from_secs(5));
        (controller, queue)
    }

    fn key() -> ObjectKey {
        ObjectKey::new("ci", "run-1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_directive_schedules_delayed_add() {
        let (controller, queue) =
            controller(Scripted::new(vec![Ok(Action::RequeueAfter(Duration::from_secs(60)))]));
        queue.enqueue(key());
        let k = queue.dequeue().await.unwrap();

        let directive = controller.process(k).await;
        assert_eq!(directive, Directive::RequeueAfter(Duration::from_secs(60)));
        assert!(queue.is_empty());
        assert_eq!(queue.in_flight(), 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_error_is_handed_back_with_retry_delay() {
        let (controller, queue) = controller(Scripted::new(vec![Err(ReconcileError::Store(
            StoreError::Backend("unavailable".into()),
        ))]));
        queue.enqueue(key());
        let k = queue.dequeue().await.unwrap();

        assert_eq!(controller.process(k).await, Directive::Retry(ErrorKind::Store));
        assert!(queue.is_empty());

        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retryable() {
        let mut scripted = Scripted::new(vec![Ok(Action::Done)]);
        scripted.delay = Some(Duration::from_secs(30));
        let (controller, queue) = controller(scripted);
        let controller = controller.with_reconcile_timeout(Duration::from_secs(1));

        queue.enqueue(key());
        let k = queue.dequeue().await.unwrap();
        assert_eq!(controller.process(k).await, Directive::Retry(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_ingest_enqueues_admitted_keys_only() {
        use chrono::Utc;
        use reaper_state::{ChangeEvent, ExecutionResource, Outcome};

        let (controller, queue) = controller(Scripted::new(vec![]));
        let running = ExecutionResource::new("ci", "run-1").running();
        let done = running.clone().completed(Outcome::Succeeded, Utc::now());

        let created = WatchEvent::Execution(ChangeEvent::Created(running.clone()));
        assert_eq!(controller.ingest(&created), Classification::Drop);
        assert!(queue.is_empty());

        let completed = WatchEvent::Execution(ChangeEvent::Updated {
            old: running,
            new: done,
        });
        assert!(controller.ingest(&completed).is_admitted());
        assert!(controller.ingest(&completed).is_admitted());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_zero_workers_means_one() {
        let (controller, _) = controller(Scripted::new(vec![]));
        assert_eq!(controller.with_workers(0).workers(), 1);
    }
}
