//! Structured observability hooks for reconciliation lifecycle events.
//!
//! This module provides:
//! - Request-scoped tracing spans via the `ReconcileSpan` RAII guard
//! - Emission functions for classification, reconcile start, deletion,
//!   requeue and error
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).
//! Errors are emitted at `warn!`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reaper_state::{ObjectKey, Outcome, ResourceKind};
use tracing::info;

use crate::error::ErrorKind;

/// RAII guard that enters a request-scoped span for the duration of one attempt.
///
/// # Example
///
/// ```ignore
/// let _span = ReconcileSpan::enter("ttl", &key);
/// // all tracing calls are now tagged with controller = "ttl", key = "ns/name"
/// ```
pub struct ReconcileSpan {
    _span: tracing::span::EnteredSpan,
}

impl ReconcileSpan {
    pub fn enter(controller: &str, key: &ObjectKey) -> Self {
        Self {
            _span: reconcile_span(controller, key).entered(),
        }
    }
}

/// Span for one attempt, for use with `Instrument` across `.await` points.
pub fn reconcile_span(controller: &str, key: &ObjectKey) -> tracing::Span {
    tracing::info_span!("reaper.reconcile", controller = %controller, key = %key)
}

/// Emit event: a change notification was admitted or dropped.
pub fn emit_event_classified(
    controller: &str,
    kind: ResourceKind,
    key: Option<&ObjectKey>,
    admitted: bool,
) {
    match key {
        Some(key) => tracing::debug!(
            event = "event.classified",
            controller = %controller,
            kind = %kind,
            key = %key,
            admitted = admitted,
        ),
        None => tracing::debug!(
            event = "event.classified",
            controller = %controller,
            kind = %kind,
            admitted = admitted,
        ),
    }
}

/// Emit event: a worker picked up a request.
pub fn emit_reconcile_started(controller: &str, key: &ObjectKey) {
    info!(event = "reconcile.started", controller = %controller, key = %key);
}

/// Emit event: an expired execution was deleted.
pub fn emit_resource_deleted(key: &ObjectKey, outcome: Option<Outcome>, deadline: DateTime<Utc>) {
    let outcome = outcome.map(|o| o.to_string()).unwrap_or_default();
    info!(
        event = "resource.deleted",
        key = %key,
        outcome = %outcome,
        deadline = %deadline.to_rfc3339(),
    );
}

/// Emit event: a request will be redelivered after `after`.
pub fn emit_requeue_scheduled(controller: &str, key: &ObjectKey, after: Duration) {
    info!(
        event = "reconcile.requeue",
        controller = %controller,
        key = %key,
        after_ms = after.as_millis() as u64,
    );
}

/// Emit event: a reconcile attempt failed (warning level).
pub fn emit_reconcile_error(
    controller: &str,
    key: &ObjectKey,
    kind: ErrorKind,
    error: &dyn std::fmt::Display,
) {
    tracing::warn!(
        event = "reconcile.error",
        controller = %controller,
        key = %key,
        kind = %kind,
        error = %error,
    );
}
