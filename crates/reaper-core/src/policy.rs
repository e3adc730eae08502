//! Effective TTL resolution.
//!
//! An execution can carry its own TTLs and may also inherit TTLs from the
//! snapshot of its owner's policy taken when it was created. Resolution is
//! per outcome: an own TTL for an outcome always wins, otherwise the
//! inherited TTL for that same outcome applies. An absent TTL means no
//! time-based cleanup for that outcome.

use std::time::Duration;

use reaper_state::{ExecutionResource, Outcome};
use serde::{Deserialize, Serialize};

/// TTLs that apply to one execution after resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveTtl {
    #[serde(default, with = "humantime_serde")]
    pub after_failed: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub after_succeeded: Option<Duration>,
}

impl EffectiveTtl {
    /// TTL for the given outcome, if any.
    pub fn for_outcome(&self, outcome: Outcome) -> Option<Duration> {
        match outcome {
            Outcome::Succeeded => self.after_succeeded,
            Outcome::Failed => self.after_failed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.after_failed.is_none() && self.after_succeeded.is_none()
    }
}

/// Resolve the TTLs that govern `run`.
pub fn resolve(run: &ExecutionResource) -> EffectiveTtl {
    let inherited = run.inherited_retention();
    let inherited_failed = inherited.and_then(|r| r.ttl_after_failed);
    let inherited_succeeded = inherited.and_then(|r| r.ttl_after_succeeded);

    match run.spec.retention.as_ref() {
        None => EffectiveTtl {
            after_failed: inherited_failed,
            after_succeeded: inherited_succeeded,
        },
        Some(own) => EffectiveTtl {
            after_failed: own.ttl_after_failed.or(inherited_failed),
            after_succeeded: own.ttl_after_succeeded.or(inherited_succeeded),
        },
    }
}

/// Whether any TTL (own or inherited) is configured for `run`.
pub fn has_ttl_policy(run: &ExecutionResource) -> bool {
    !resolve(run).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reaper_state::{ExecutionRetention, ManagedRetention};

    const TEN_MIN: Duration = Duration::from_secs(600);
    const ONE_HOUR: Duration = Duration::from_secs(3600);
    const TWO_HOURS: Duration = Duration::from_secs(7200);

    #[test]
    fn test_no_policy_anywhere() {
        let run = ExecutionResource::new("ci", "run-1");
        assert!(resolve(&run).is_empty());
        assert!(!has_ttl_policy(&run));
    }

    #[test]
    fn test_inherited_only() {
        let run = ExecutionResource::new("ci", "run-1").with_policy_snapshot(ManagedRetention {
            ttl_after_failed: Some(TWO_HOURS),
            ttl_after_succeeded: Some(ONE_HOUR),
            ..Default::default()
        });
        let ttl = resolve(&run);
        assert_eq!(ttl.for_outcome(Outcome::Failed), Some(TWO_HOURS));
        assert_eq!(ttl.for_outcome(Outcome::Succeeded), Some(ONE_HOUR));
    }

    #[test]
    fn test_own_absent_falls_back_per_outcome() {
        let run = ExecutionResource::new("ci", "run-1")
            .with_retention(ExecutionRetention {
                ttl_after_failed: None,
                ttl_after_succeeded: Some(TEN_MIN),
            })
            .with_policy_snapshot(ManagedRetention {
                ttl_after_failed: Some(TWO_HOURS),
                ttl_after_succeeded: Some(ONE_HOUR),
                ..Default::default()
            });
        let ttl = resolve(&run);
        assert_eq!(ttl.after_failed, Some(TWO_HOURS));
        assert_eq!(ttl.after_succeeded, Some(TEN_MIN));
    }

    #[test]
    fn test_own_overrides_inherited() {
        let run = ExecutionResource::new("ci", "run-1")
            .with_retention(ExecutionRetention {
                ttl_after_failed: Some(TEN_MIN),
                ttl_after_succeeded: None,
            })
            .with_policy_snapshot(ManagedRetention {
                ttl_after_failed: Some(TWO_HOURS),
                ..Default::default()
            });
        let ttl = resolve(&run);
        assert_eq!(ttl.after_failed, Some(TEN_MIN));
        assert_eq!(ttl.after_succeeded, None);
    }

    #[test]
    fn test_snapshot_with_only_limits_has_no_ttl() {
        let run = ExecutionResource::new("ci", "run-1").with_policy_snapshot(ManagedRetention {
            failed_limit: Some(2),
            succeeded_limit: Some(5),
            ..Default::default()
        });
        assert!(!has_ttl_policy(&run));
    }
}
