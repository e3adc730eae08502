//! Event classification.
//!
//! Decides which change notifications require reconciliation and which key
//! the resulting request carries. All functions here are pure: they look
//! only at the (old, new) snapshots they are given and never fail.
//! Partial snapshots (missing condition, empty owner reference) are dropped.
//!
//! Two predicate sets exist per kind:
//! - managed resources are admitted when their count limits appear or tighten
//! - executions are admitted exactly once, on the Unknown -> terminal edge
//!
//! Two filters compose them for the two cleanup paths:
//! - [`TtlCleanupFilter`] keys execution events by the execution itself
//! - [`LimitCleanupFilter`] keys execution events by their owner

use reaper_state::{
    ChangeEvent, ConditionStatus, ExecutionResource, ManagedResource, ManagedRetention, ObjectKey,
    WatchEvent,
};

/// Outcome of a single predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Drop,
}

impl Decision {
    pub fn is_admit(self) -> bool {
        self == Decision::Admit
    }
}

impl From<bool> for Decision {
    fn from(admit: bool) -> Self {
        if admit {
            Decision::Admit
        } else {
            Decision::Drop
        }
    }
}

/// Create/update/delete hooks over snapshots of one kind.
pub trait Predicates<T> {
    fn on_create(&self, obj: &T) -> Decision;

    fn on_update(&self, old: &T, new: &T) -> Decision;

    /// Deletions never need cleanup.
    fn on_delete(&self, _obj: &T) -> Decision {
        Decision::Drop
    }

    fn on_event(&self, event: &ChangeEvent<T>) -> Decision {
        match event {
            ChangeEvent::Created(obj) => self.on_create(obj),
            ChangeEvent::Updated { old, new } => self.on_update(old, new),
            ChangeEvent::Deleted(obj) => self.on_delete(obj),
        }
    }
}

// ---------------------------------------------------------------------------
// Managed resource predicates
// ---------------------------------------------------------------------------

/// Admits direct edits that can increase how many runs must be pruned.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagedRetentionPredicates;

impl Predicates<ManagedResource> for ManagedRetentionPredicates {
    fn on_create(&self, obj: &ManagedResource) -> Decision {
        obj.retention().is_some_and(ManagedRetention::has_limits).into()
    }

    fn on_update(&self, old: &ManagedResource, new: &ManagedResource) -> Decision {
        limits_tightened(old.retention(), new.retention()).into()
    }
}

/// A policy appeared with limits, a limit appeared, or a limit decreased.
fn limits_tightened(old: Option<&ManagedRetention>, new: Option<&ManagedRetention>) -> bool {
    match (old, new) {
        (None, Some(new)) => new.has_limits(),
        (Some(old), Some(new)) => {
            limit_tightened(old.failed_limit, new.failed_limit)
                || limit_tightened(old.succeeded_limit, new.succeeded_limit)
        }
        _ => false,
    }
}

fn limit_tightened(old: Option<u32>, new: Option<u32>) -> bool {
    match (old, new) {
        (None, Some(_)) => true,
        (Some(old), Some(new)) => new < old,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Execution predicates
// ---------------------------------------------------------------------------

/// True only on the single Unknown -> True/False transition.
///
/// Both snapshots must carry the condition; an absent condition on either
/// side is a partial event and does not count as the edge.
pub fn completion_edge(old: &ExecutionResource, new: &ExecutionResource) -> bool {
    matches!(
        (old.completion_status(), new.completion_status()),
        (Some(ConditionStatus::Unknown), Some(status)) if status.is_terminal()
    )
}

/// Execution predicates feeding the TTL path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionTtlPredicates;

impl Predicates<ExecutionResource> for ExecutionTtlPredicates {
    fn on_create(&self, _obj: &ExecutionResource) -> Decision {
        Decision::Drop
    }

    fn on_update(&self, old: &ExecutionResource, new: &ExecutionResource) -> Decision {
        completion_edge(old, new).into()
    }
}

/// Execution predicates feeding the count-limit path; runs without an owner
/// are never admitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionCompletionPredicates;

impl Predicates<ExecutionResource> for ExecutionCompletionPredicates {
    fn on_create(&self, _obj: &ExecutionResource) -> Decision {
        Decision::Drop
    }

    fn on_update(&self, old: &ExecutionResource, new: &ExecutionResource) -> Decision {
        (new.owner_name().is_some() && completion_edge(old, new)).into()
    }
}

// ---------------------------------------------------------------------------
// Key mapping
// ---------------------------------------------------------------------------

/// Request for the execution itself.
pub fn request_for(run: &ExecutionResource) -> ObjectKey {
    run.key()
}

/// Request for the owning managed resource, `None` when the owner reference is empty.
pub fn owner_request(run: &ExecutionResource) -> Option<ObjectKey> {
    run.owner_name()
        .map(|owner| ObjectKey::new(run.metadata.namespace.clone(), owner))
}

/// The snapshot a request should be derived from.
fn latest<T>(event: &ChangeEvent<T>) -> &T {
    match event {
        ChangeEvent::Created(obj) | ChangeEvent::Deleted(obj) => obj,
        ChangeEvent::Updated { new, .. } => new,
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Result of classifying one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Admit(ObjectKey),
    Drop,
}

impl Classification {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Classification::Admit(_))
    }

    pub fn key(&self) -> Option<&ObjectKey> {
        match self {
            Classification::Admit(key) => Some(key),
            Classification::Drop => None,
        }
    }

    fn admit_if(decision: Decision, key: impl FnOnce() -> Option<ObjectKey>) -> Self {
        match decision {
            Decision::Admit => key().map_or(Classification::Drop, Classification::Admit),
            Decision::Drop => Classification::Drop,
        }
    }
}

/// Turns change notifications into reconciliation requests for one controller.
pub trait EventFilter: Send + Sync {
    fn classify(&self, event: &WatchEvent) -> Classification;
}

/// Filter for the TTL controller: execution completions, keyed by the execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct TtlCleanupFilter;

impl EventFilter for TtlCleanupFilter {
    fn classify(&self, event: &WatchEvent) -> Classification {
        match event {
            WatchEvent::Managed(_) => Classification::Drop,
            WatchEvent::Execution(change) => {
                Classification::admit_if(ExecutionTtlPredicates.on_event(change), || {
                    Some(request_for(latest(change)))
                })
            }
        }
    }
}

/// Filter for the count-limit controller: limit edits keyed by the managed
/// resource, execution completions remapped to their owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitCleanupFilter;

impl EventFilter for LimitCleanupFilter {
    fn classify(&self, event: &WatchEvent) -> Classification {
        match event {
            WatchEvent::Managed(change) => {
                Classification::admit_if(ManagedRetentionPredicates.on_event(change), || {
                    Some(latest(change).key())
                })
            }
            WatchEvent::Execution(change) => {
                Classification::admit_if(ExecutionCompletionPredicates.on_event(change), || {
                    owner_request(latest(change))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reaper_state::Outcome;

    fn managed(failed: Option<u32>, succeeded: Option<u32>) -> ManagedResource {
        ManagedResource::new("ci", "build-a").with_retention(ManagedRetention {
            failed_limit: failed,
            succeeded_limit: succeeded,
            ..Default::default()
        })
    }

    fn update(old: ManagedResource, new: ManagedResource) -> Decision {
        ManagedRetentionPredicates.on_update(&old, &new)
    }

    #[test]
    fn test_managed_create_requires_a_limit() {
        let p = ManagedRetentionPredicates;
        assert_eq!(p.on_create(&managed(Some(1), None)), Decision::Admit);
        assert_eq!(p.on_create(&managed(None, Some(1))), Decision::Admit);
        assert_eq!(p.on_create(&managed(None, None)), Decision::Drop);
        assert_eq!(p.on_create(&ManagedResource::new("ci", "b")), Decision::Drop);
    }

    #[test]
    fn test_managed_policy_appears() {
        let bare = ManagedResource::new("ci", "build-a");
        assert_eq!(update(bare.clone(), managed(None, Some(3))), Decision::Admit);
        assert_eq!(update(bare, managed(None, None)), Decision::Drop);
    }

    #[test]
    fn test_managed_limit_newly_set() {
        assert_eq!(update(managed(None, Some(3)), managed(Some(2), Some(3))), Decision::Admit);
        assert_eq!(update(managed(Some(2), None), managed(Some(2), Some(9))), Decision::Admit);
    }

    #[test]
    fn test_managed_limit_decrease_admits_increase_drops() {
        assert_eq!(update(managed(None, Some(5)), managed(None, Some(3))), Decision::Admit);
        assert_eq!(update(managed(None, Some(3)), managed(None, Some(5))), Decision::Drop);
        assert_eq!(update(managed(Some(4), None), managed(Some(1), None)), Decision::Admit);
        assert_eq!(update(managed(Some(4), Some(4)), managed(Some(4), Some(4))), Decision::Drop);
    }

    #[test]
    fn test_managed_policy_removed_drops() {
        assert_eq!(
            update(managed(Some(1), Some(1)), ManagedResource::new("ci", "build-a")),
            Decision::Drop
        );
        assert_eq!(update(managed(Some(1), Some(1)), managed(None, None)), Decision::Drop);
    }

    #[test]
    fn test_managed_delete_drops() {
        assert_eq!(
            ManagedRetentionPredicates.on_delete(&managed(Some(1), Some(1))),
            Decision::Drop
        );
    }

    #[test]
    fn test_completion_edge() {
        let running = ExecutionResource::new("ci", "run-1").running();
        let done = ExecutionResource::new("ci", "run-1").completed(Outcome::Failed, Utc::now());
        let bare = ExecutionResource::new("ci", "run-1");

        assert!(completion_edge(&running, &done));
        assert!(!completion_edge(&done, &done));
        assert!(!completion_edge(&running, &running));
        assert!(!completion_edge(&bare, &done));
        assert!(!completion_edge(&running, &bare));
    }

    #[test]
    fn test_ttl_filter_keys_by_execution() {
        let running = ExecutionResource::new("ci", "run-1").with_owner("build-a").running();
        let done = running.clone().completed(Outcome::Succeeded, Utc::now());

        let event = WatchEvent::Execution(ChangeEvent::Updated {
            old: running.clone(),
            new: done.clone(),
        });
        assert_eq!(
            TtlCleanupFilter.classify(&event),
            Classification::Admit(ObjectKey::new("ci", "run-1"))
        );

        let created = WatchEvent::Execution(ChangeEvent::Created(done.clone()));
        assert_eq!(TtlCleanupFilter.classify(&created), Classification::Drop);
        let deleted = WatchEvent::Execution(ChangeEvent::Deleted(done));
        assert_eq!(TtlCleanupFilter.classify(&deleted), Classification::Drop);
        let managed_event = WatchEvent::Managed(ChangeEvent::Created(managed(Some(1), None)));
        assert_eq!(TtlCleanupFilter.classify(&managed_event), Classification::Drop);
    }

    #[test]
    fn test_limit_filter_remaps_to_owner() {
        let running = ExecutionResource::new("ci", "run-1").with_owner("build-a").running();
        let done = running.clone().completed(Outcome::Failed, Utc::now());
        let event = WatchEvent::Execution(ChangeEvent::Updated {
            old: running,
            new: done,
        });

        let classification = LimitCleanupFilter.classify(&event);
        assert!(classification.is_admitted());
        assert_eq!(classification.key(), Some(&ObjectKey::new("ci", "build-a")));
    }

    #[test]
    fn test_limit_filter_drops_ownerless_runs() {
        let running = ExecutionResource::new("ci", "run-1").with_owner("").running();
        let done = running.clone().completed(Outcome::Failed, Utc::now());
        let event = WatchEvent::Execution(ChangeEvent::Updated {
            old: running,
            new: done,
        });
        assert_eq!(LimitCleanupFilter.classify(&event), Classification::Drop);
    }

    #[test]
    fn test_limit_filter_keys_managed_by_itself() {
        let event = WatchEvent::Managed(ChangeEvent::Created(managed(None, Some(2))));
        assert_eq!(
            LimitCleanupFilter.classify(&event),
            Classification::Admit(ObjectKey::new("ci", "build-a"))
        );
    }

    #[test]
    fn test_owner_request_same_namespace() {
        let run = ExecutionResource::new("team-a", "run-9").with_owner("nightly");
        assert_eq!(owner_request(&run), Some(ObjectKey::new("team-a", "nightly")));
        assert_eq!(owner_request(&ExecutionResource::new("team-a", "run-9")), None);
        assert_eq!(request_for(&run), ObjectKey::new("team-a", "run-9"));
    }
}
