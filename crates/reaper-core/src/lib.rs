//! Reaper Core Library
//!
//! Retention enforcement for managed resources and their executions:
//! event classification, TTL reconciliation and the controller runtime
//! that drives them.

pub mod classifier;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod obs;
pub mod policy;
pub mod queue;
pub mod scheduling;
pub mod telemetry;
pub mod ttl;

pub use classifier::{
    completion_edge, owner_request, request_for, Classification, Decision, EventFilter,
    ExecutionCompletionPredicates, ExecutionTtlPredicates, LimitCleanupFilter,
    ManagedRetentionPredicates, Predicates, TtlCleanupFilter,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ControllerConfig;
pub use controller::{Controller, Reconciler};
pub use error::{ConfigError, ErrorKind, ReconcileError, ReconcileResult};
pub use manager::RetentionManager;
pub use metrics::METRICS;
pub use policy::{has_ttl_policy, resolve, EffectiveTtl};
pub use queue::{MemoryWorkQueue, WorkQueue};
pub use scheduling::{Action, Directive};
pub use ttl::{evaluate, TtlDecision, TtlOutcome, TtlReconciler};

pub use reaper_state::{
    ChangeEvent, ChangeFeed, ExecutionResource, ManagedResource, ObjectKey, Outcome,
    ResourceKind, ResourceStore, StoreError, WatchEvent,
};
