//! Resource model for the retention controller
//!
//! Two kinds are watched:
//! - `ManagedResource`: the template that owns runs and carries a retention policy
//! - `ExecutionResource`: a single run, owned by a managed resource, that reaches a
//!   terminal condition exactly once
//!
//! Only the fields that retention decisions read are modelled here.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The two resource kinds the controller watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Managed,
    Execution,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Managed => "managed",
            ResourceKind::Execution => "execution",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespaced identity of a resource; also the reconciliation request key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Object metadata. `uid` and `created_at` are assigned by the store on first apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: None,
            created_at: None,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Assign a fresh identity on create, or carry over `existing` on update.
    pub fn assign_identity(&mut self, existing: Option<&ObjectMeta>) {
        match existing {
            Some(prev) => {
                self.uid = prev.uid.clone();
                self.created_at = prev.created_at;
            }
            None => {
                self.uid = Some(uuid::Uuid::new_v4().to_string());
                self.created_at = Some(Utc::now());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ManagedResource
// ---------------------------------------------------------------------------

/// Retention configuration declared on a managed resource.
///
/// The limits bound how many finished runs are kept; the TTLs are copied into
/// each run's status snapshot when the run starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedRetention {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded_limit: Option<u32>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub ttl_after_failed: Option<Duration>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub ttl_after_succeeded: Option<Duration>,
}

impl ManagedRetention {
    /// Whether either count limit is set.
    pub fn has_limits(&self) -> bool {
        self.failed_limit.is_some() || self.succeeded_limit.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<ManagedRetention>,
}

/// Template-level resource that owns executions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedResource {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ManagedSpec,
}

impl ManagedResource {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: ManagedSpec::default(),
        }
    }

    pub fn with_retention(mut self, retention: ManagedRetention) -> Self {
        self.spec.retention = Some(retention);
        self
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn retention(&self) -> Option<&ManagedRetention> {
        self.spec.retention.as_ref()
    }
}

// ---------------------------------------------------------------------------
// ExecutionResource
// ---------------------------------------------------------------------------

/// Status of the `Succeeded` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    Unknown,
    True,
    False,
}

impl ConditionStatus {
    /// Terminal outcome, if any. `Unknown` has none.
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            ConditionStatus::Unknown => None,
            ConditionStatus::True => Some(Outcome::Succeeded),
            ConditionStatus::False => Some(Outcome::Failed),
        }
    }

    pub fn is_terminal(self) -> bool {
        self.outcome().is_some()
    }
}

/// Terminal outcome of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => f.write_str("succeeded"),
            Outcome::Failed => f.write_str("failed"),
        }
    }
}

/// The `Succeeded` condition of an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionCondition {
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl CompletionCondition {
    pub fn new(status: ConditionStatus) -> Self {
        Self {
            status,
            reason: None,
            message: None,
            last_transition_time: None,
        }
    }
}

/// Reference to the owning managed resource (same namespace).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    #[serde(default)]
    pub name: String,
}

/// TTLs declared directly on an execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRetention {
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub ttl_after_failed: Option<Duration>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub ttl_after_succeeded: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<ExecutionRetention>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    /// Snapshot of the owner's spec, captured when the run was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_snapshot: Option<ManagedSpec>,
}

/// A single run owned by a managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResource {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ExecutionSpec,
    #[serde(default)]
    pub status: ExecutionStatus,
}

impl ExecutionResource {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: ExecutionSpec::default(),
            status: ExecutionStatus::default(),
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.spec.owner = Some(OwnerRef { name: owner.into() });
        self
    }

    pub fn with_retention(mut self, retention: ExecutionRetention) -> Self {
        self.spec.retention = Some(retention);
        self
    }

    pub fn with_policy_snapshot(mut self, retention: ManagedRetention) -> Self {
        self.status.policy_snapshot = Some(ManagedSpec {
            retention: Some(retention),
        });
        self
    }

    /// Mark the run as started: condition present with status `Unknown`.
    pub fn running(mut self) -> Self {
        self.status.completion = Some(CompletionCondition::new(ConditionStatus::Unknown));
        self.status.completion_time = None;
        self
    }

    /// Mark the run as finished with the given outcome at `at`.
    pub fn completed(mut self, outcome: Outcome, at: DateTime<Utc>) -> Self {
        let status = match outcome {
            Outcome::Succeeded => ConditionStatus::True,
            Outcome::Failed => ConditionStatus::False,
        };
        self.status.completion = Some(CompletionCondition {
            status,
            reason: None,
            message: None,
            last_transition_time: Some(at),
        });
        self.status.completion_time = Some(at);
        self
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    /// Status of the completion condition, `None` when the condition is absent.
    pub fn completion_status(&self) -> Option<ConditionStatus> {
        self.status.completion.as_ref().map(|c| c.status)
    }

    /// Terminal outcome, `None` while running or when no condition is recorded.
    pub fn outcome(&self) -> Option<Outcome> {
        self.completion_status().and_then(ConditionStatus::outcome)
    }

    /// Instant the run reached its terminal condition.
    ///
    /// Falls back to the condition's transition time when `completion_time`
    /// was never written.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.outcome()?;
        self.status.completion_time.or_else(|| {
            self.status
                .completion
                .as_ref()
                .and_then(|c| c.last_transition_time)
        })
    }

    /// Name of the owning managed resource; empty references count as absent.
    pub fn owner_name(&self) -> Option<&str> {
        self.spec
            .owner
            .as_ref()
            .map(|o| o.name.as_str())
            .filter(|n| !n.is_empty())
    }

    /// Retention inherited from the owner snapshot, if one was captured.
    pub fn inherited_retention(&self) -> Option<&ManagedRetention> {
        self.status
            .policy_snapshot
            .as_ref()
            .and_then(|s| s.retention.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Resource + change events
// ---------------------------------------------------------------------------

/// A resource of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    Managed(ManagedResource),
    Execution(ExecutionResource),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Managed(_) => ResourceKind::Managed,
            Resource::Execution(_) => ResourceKind::Execution,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::Managed(r) => &r.metadata,
            Resource::Execution(r) => &r.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Resource::Managed(r) => &mut r.metadata,
            Resource::Execution(r) => &mut r.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata().key()
    }
}

impl From<ManagedResource> for Resource {
    fn from(r: ManagedResource) -> Self {
        Resource::Managed(r)
    }
}

impl From<ExecutionResource> for Resource {
    fn from(r: ExecutionResource) -> Self {
        Resource::Execution(r)
    }
}

/// A single change to one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent<T> {
    Created(T),
    Updated { old: T, new: T },
    Deleted(T),
}

impl<T> ChangeEvent<T> {
    /// Snapshot before the change (`None` for creations).
    pub fn before(&self) -> Option<&T> {
        match self {
            ChangeEvent::Created(_) => None,
            ChangeEvent::Updated { old, .. } => Some(old),
            ChangeEvent::Deleted(obj) => Some(obj),
        }
    }

    /// Snapshot after the change (`None` for deletions).
    pub fn after(&self) -> Option<&T> {
        match self {
            ChangeEvent::Created(obj) => Some(obj),
            ChangeEvent::Updated { new, .. } => Some(new),
            ChangeEvent::Deleted(_) => None,
        }
    }
}

/// A change notification as delivered by a change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Managed(ChangeEvent<ManagedResource>),
    Execution(ChangeEvent<ExecutionResource>),
}

impl WatchEvent {
    pub fn kind(&self) -> ResourceKind {
        match self {
            WatchEvent::Managed(_) => ResourceKind::Managed,
            WatchEvent::Execution(_) => ResourceKind::Execution,
        }
    }

    /// Identity of the changed object.
    pub fn key(&self) -> Option<ObjectKey> {
        match self {
            WatchEvent::Managed(e) => e.after().or(e.before()).map(ManagedResource::key),
            WatchEvent::Execution(e) => e.after().or(e.before()).map(ExecutionResource::key),
        }
    }

    /// Build the event that takes `old` to `new` (either may be absent).
    pub fn from_snapshots(old: Option<Resource>, new: Option<Resource>) -> Option<Self> {
        use Resource::{Execution, Managed};
        let event = match (old, new) {
            (None, Some(Managed(n))) => WatchEvent::Managed(ChangeEvent::Created(n)),
            (None, Some(Execution(n))) => WatchEvent::Execution(ChangeEvent::Created(n)),
            (Some(Managed(o)), Some(Managed(n))) => {
                WatchEvent::Managed(ChangeEvent::Updated { old: o, new: n })
            }
            (Some(Execution(o)), Some(Execution(n))) => {
                WatchEvent::Execution(ChangeEvent::Updated { old: o, new: n })
            }
            (Some(Managed(o)), None) => WatchEvent::Managed(ChangeEvent::Deleted(o)),
            (Some(Execution(o)), None) => WatchEvent::Execution(ChangeEvent::Deleted(o)),
            _ => return None,
        };
        Some(event)
    }
}
