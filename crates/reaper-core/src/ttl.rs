//! Time-to-live reconciliation for executions.
//!
//! Each invocation reloads the execution, resolves its effective TTL, and
//! either deletes it (deadline reached) or asks to be called again exactly
//! when the deadline falls due. Nothing here blocks until the deadline.
//!
//! Safe under duplicate and concurrent delivery: state is always reloaded
//! and a delete racing another actor's delete is reported as success.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reaper_state::{ExecutionResource, ObjectKey, ResourceKind, ResourceStore, StoreResult};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::controller::Reconciler;
use crate::error::ReconcileResult;
use crate::metrics::METRICS;
use crate::obs;
use crate::policy;
use crate::scheduling::Action;

/// Pure TTL verdict for one execution at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlDecision {
    /// Condition absent or still `Unknown`.
    NotTerminal,
    /// No TTL applies to the run's outcome, or no completion instant is recorded.
    NoTtl,
    Pending {
        deadline: DateTime<Utc>,
        remaining: Duration,
    },
    Expired {
        deadline: DateTime<Utc>,
    },
}

/// Evaluate `run` against `now`.
///
/// `deadline = completed_at + ttl`; the run is expired once `now >= deadline`.
pub fn evaluate(run: &ExecutionResource, now: DateTime<Utc>) -> TtlDecision {
    let Some(outcome) = run.outcome() else {
        return TtlDecision::NotTerminal;
    };
    let Some(ttl) = policy::resolve(run).for_outcome(outcome) else {
        return TtlDecision::NoTtl;
    };
    let Some(completed_at) = run.completed_at() else {
        warn!(
            run = %run.key(),
            outcome = %outcome,
            "terminal execution has no completion time; skipping TTL"
        );
        return TtlDecision::NoTtl;
    };

    let deadline = deadline(completed_at, ttl);
    if now >= deadline {
        TtlDecision::Expired { deadline }
    } else {
        let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
        TtlDecision::Pending {
            deadline,
            remaining,
        }
    }
}

/// Saturates at the latest representable instant instead of overflowing.
fn deadline(completed_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| completed_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Terminal states of one TTL reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlOutcome {
    /// The execution no longer exists.
    NotFound,
    NotTerminal,
    NoTtl,
    /// Deadline not reached; call again after the given duration.
    Requeue(Duration),
    Deleted,
    /// Deadline reached but someone else deleted it first.
    AlreadyGone,
}

/// Per-request TTL state machine over a [`ResourceStore`].
#[derive(Clone)]
pub struct TtlReconciler {
    store: Arc<dyn ResourceStore>,
    clock: Arc<dyn Clock>,
}

impl TtlReconciler {
    pub fn new(store: Arc<dyn ResourceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reconcile the execution at `key`.
    pub async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<TtlOutcome> {
        let run = match self.store.get_execution(key).await {
            Ok(run) => run,
            Err(e) if e.is_not_found() => {
                debug!(run = %key, "execution already gone");
                return Ok(TtlOutcome::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        match evaluate(&run, self.clock.now()) {
            TtlDecision::NotTerminal => Ok(TtlOutcome::NotTerminal),
            TtlDecision::NoTtl => Ok(TtlOutcome::NoTtl),
            TtlDecision::Pending { deadline, remaining } => {
                debug!(run = %key, deadline = %deadline, "TTL not yet reached");
                Ok(TtlOutcome::Requeue(remaining))
            }
            TtlDecision::Expired { deadline } => {
                match self.store.delete(ResourceKind::Execution, key).await {
                    Ok(()) => {
                        METRICS.inc_resources_deleted();
                        obs::emit_resource_deleted(key, run.outcome(), deadline);
                        Ok(TtlOutcome::Deleted)
                    }
                    Err(e) if e.is_not_found() => {
                        debug!(run = %key, "execution deleted concurrently");
                        Ok(TtlOutcome::AlreadyGone)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Keys of executions that are already terminal and carry a TTL.
    ///
    /// Used to catch up on completions that happened while no controller
    /// was watching.
    pub async fn pending_keys(&self) -> StoreResult<Vec<ObjectKey>> {
        let runs = self.store.list_executions(None).await?;
        Ok(runs
            .iter()
            .filter(|run| run.outcome().is_some() && policy::has_ttl_policy(run))
            .map(ExecutionResource::key)
            .collect())
    }
}

#[async_trait]
impl Reconciler for TtlReconciler {
    fn name(&self) -> &'static str {
        "ttl"
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<Action> {
        TtlReconciler::reconcile(self, key).await.map(Action::from)
    }

    async fn resync(&self) -> ReconcileResult<Vec<ObjectKey>> {
        Ok(self.pending_keys().await?)
    }
}

impl std::fmt::Debug for TtlReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlReconciler").finish_non_exhaustive()
    }
}
