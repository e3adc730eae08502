//! Translation of reconcile results into queue directives.

use std::time::Duration;

use crate::error::{ErrorKind, ReconcileError};
use crate::ttl::TtlOutcome;

/// What a reconciler asks of the scheduler after a successful attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Done,
    RequeueAfter(Duration),
}

impl From<TtlOutcome> for Action {
    fn from(outcome: TtlOutcome) -> Self {
        match outcome {
            TtlOutcome::Requeue(remaining) => Action::RequeueAfter(remaining),
            TtlOutcome::NotFound
            | TtlOutcome::NotTerminal
            | TtlOutcome::NoTtl
            | TtlOutcome::Deleted
            | TtlOutcome::AlreadyGone => Action::Done,
        }
    }
}

/// Final instruction handed to the work queue for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Done,
    RequeueAfter(Duration),
    Retry(ErrorKind),
}

impl Directive {
    pub fn from_result(result: &Result<Action, ReconcileError>) -> Self {
        match result {
            Ok(Action::Done) => Directive::Done,
            Ok(Action::RequeueAfter(after)) => Directive::RequeueAfter(*after),
            Err(e) if !e.is_retryable() => Directive::Done,
            Err(e) => Directive::Retry(e.kind()),
        }
    }
}
