//! Wires store, clock and configuration into running controllers.

use std::sync::Arc;

use reaper_state::{ChangeFeed, ResourceStore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classifier::{LimitCleanupFilter, TtlCleanupFilter};
use crate::clock::{Clock, SystemClock};
use crate::config::ControllerConfig;
use crate::controller::{Controller, Reconciler};
use crate::queue::MemoryWorkQueue;
use crate::ttl::TtlReconciler;

/// Runs the TTL controller and, when a count reconciler is supplied, the
/// count-limit controller, side by side over one store.
pub struct RetentionManager {
    store: Arc<dyn ResourceStore>,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
    config: ControllerConfig,
    limit_reconciler: Option<Arc<dyn Reconciler>>,
}

impl RetentionManager {
    pub fn new<S>(store: Arc<S>, config: ControllerConfig) -> Self
    where
        S: ResourceStore + ChangeFeed + 'static,
    {
        Self {
            store: store.clone(),
            feed: store,
            clock: Arc::new(SystemClock),
            config,
            limit_reconciler: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Also run a count-limit controller driven by `reconciler`.
    pub fn with_limit_reconciler(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.limit_reconciler = Some(reconciler);
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Build the TTL controller with its own queue.
    pub fn ttl_controller(&self) -> Controller {
        let reconciler = TtlReconciler::new(Arc::clone(&self.store), Arc::clone(&self.clock));
        Controller::new(
            Arc::new(TtlCleanupFilter),
            Arc::new(reconciler),
            Arc::new(MemoryWorkQueue::new()),
        )
        .with_workers(self.config.execution_workers())
        .with_reconcile_timeout(self.config.reconcile_timeout)
        .with_retry_delay(self.config.retry_delay)
        .with_resync_on_start(self.config.resync_on_start)
    }

    /// Build the count-limit controller, if one was configured.
    pub fn limit_controller(&self) -> Option<Controller> {
        let reconciler = self.limit_reconciler.as_ref()?;
        Some(
            Controller::new(
                Arc::new(LimitCleanupFilter),
                Arc::clone(reconciler),
                Arc::new(MemoryWorkQueue::new()),
            )
            .with_workers(self.config.managed_workers())
            .with_reconcile_timeout(self.config.reconcile_timeout)
            .with_retry_delay(self.config.retry_delay)
            .with_resync_on_start(self.config.resync_on_start),
        )
    }

    /// Run every controller until `cancel` fires and all have stopped.
    pub async fn run(self, cancel: CancellationToken) {
        let mut controllers = vec![self.ttl_controller()];
        controllers.extend(self.limit_controller());

        let mut tasks = JoinSet::new();
        for controller in controllers {
            // Subscribe before spawning so no notification falls in between.
            let events = self.feed.subscribe();
            tasks.spawn(Arc::new(controller).run(events, cancel.clone()));
        }
        info!(controllers = tasks.len(), "retention manager started");

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "controller task failed");
            }
        }
        info!("retention manager stopped");
    }
}

impl std::fmt::Debug for RetentionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionManager")
            .field("config", &self.config)
            .field("limit_controller", &self.limit_reconciler.is_some())
            .finish_non_exhaustive()
    }
}
