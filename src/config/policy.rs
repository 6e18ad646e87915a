// src/config/policy.rs
//! Global filter policy: thresholds, fixed bonuses and the external-service gates.
//!
//! Admin input arrives as a `PolicyPatch`; it is applied to a copy, validated,
//! and only then swapped in. A rejected patch leaves the previous policy intact.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpamError};
use crate::strategy::MAX_KARMA_POINTS;

pub const MAX_STRATEGY_TIMEOUT_MS: u64 = 60_000;
/// One hundred years.
pub const MAX_PURGE_AGE_DAYS: u32 = 36_500;
/// Bound for `min_karma` and the fixed seeds.
pub const MAX_POLICY_KARMA: i32 = MAX_KARMA_POINTS * 100;

fn karma_in_range(v: i32) -> bool {
    (-MAX_POLICY_KARMA..=MAX_POLICY_KARMA).contains(&v)
}

fn default_authenticated_karma() -> i32 {
    10
}
fn default_true() -> bool {
    true
}
fn default_purge_age_days() -> u32 {
    7
}
fn default_strategy_timeout_ms() -> u64 {
    5_000
}
fn default_slow_strategy_warn_ms() -> u64 {
    3_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Minimum score for a submission to be accepted.
    #[serde(default)]
    pub min_karma: i32,
    /// Given to authenticated users when they are not trusted outright.
    #[serde(default = "default_authenticated_karma")]
    pub authenticated_karma: i32,
    #[serde(default)]
    pub attachment_karma: i32,
    /// Skip the panel entirely for authenticated users.
    #[serde(default = "default_true")]
    pub trust_authenticated: bool,
    #[serde(default = "default_true")]
    pub logging_enabled: bool,
    #[serde(default = "default_purge_age_days")]
    pub purge_age_days: u32,
    /// Allow strategies that disclose content to third parties.
    #[serde(default = "default_true")]
    pub use_external: bool,
    #[serde(default = "default_true")]
    pub train_external: bool,
    /// Take the source IP from `X-Forwarded-For`.
    #[serde(default)]
    pub is_forwarded: bool,
    /// Hard per-call budget; a strategy exceeding it abstains.
    #[serde(default = "default_strategy_timeout_ms")]
    pub strategy_timeout_ms: u64,
    #[serde(default = "default_slow_strategy_warn_ms")]
    pub slow_strategy_warn_ms: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_karma: 0,
            authenticated_karma: default_authenticated_karma(),
            attachment_karma: 0,
            trust_authenticated: true,
            logging_enabled: true,
            purge_age_days: default_purge_age_days(),
            use_external: true,
            train_external: true,
            is_forwarded: false,
            strategy_timeout_ms: default_strategy_timeout_ms(),
            slow_strategy_warn_ms: default_slow_strategy_warn_ms(),
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_PURGE_AGE_DAYS).contains(&self.purge_age_days) {
            return Err(SpamError::Config(format!(
                "purge_age_days must be within 1..={MAX_PURGE_AGE_DAYS}"
            )));
        }
        for (name, v) in [
            ("min_karma", self.min_karma),
            ("authenticated_karma", self.authenticated_karma),
            ("attachment_karma", self.attachment_karma),
        ] {
            if !karma_in_range(v) {
                return Err(SpamError::Config(format!(
                    "{name} must be within -{MAX_POLICY_KARMA}..={MAX_POLICY_KARMA}"
                )));
            }
        }
        if !(1..=MAX_STRATEGY_TIMEOUT_MS).contains(&self.strategy_timeout_ms) {
            return Err(SpamError::Config(format!(
                "strategy_timeout_ms must be within 1..={MAX_STRATEGY_TIMEOUT_MS}"
            )));
        }
        if self.slow_strategy_warn_ms > self.strategy_timeout_ms {
            return Err(SpamError::Config(
                "slow_strategy_warn_ms must not exceed strategy_timeout_ms".into(),
            ));
        }
        Ok(())
    }

    /// Replace out-of-range values with defaults (used at load time only).
    pub fn sanitized(mut self) -> Self {
        let d = Policy::default();
        if !(1..=MAX_PURGE_AGE_DAYS).contains(&self.purge_age_days) {
            self.purge_age_days = d.purge_age_days;
        }
        if !karma_in_range(self.min_karma) {
            self.min_karma = d.min_karma;
        }
        if !karma_in_range(self.authenticated_karma) {
            self.authenticated_karma = d.authenticated_karma;
        }
        if !karma_in_range(self.attachment_karma) {
            self.attachment_karma = d.attachment_karma;
        }
        if !(1..=MAX_STRATEGY_TIMEOUT_MS).contains(&self.strategy_timeout_ms) {
            self.strategy_timeout_ms = d.strategy_timeout_ms;
        }
        if self.slow_strategy_warn_ms > self.strategy_timeout_ms {
            self.slow_strategy_warn_ms = self.strategy_timeout_ms;
        }
        self
    }

    /// Returns the patched policy, or an error with `self` untouched.
    pub fn patched(&self, patch: &PolicyPatch) -> Result<Policy> {
        let mut next = self.clone();
        macro_rules! apply {
            ($($field:ident),*) => {
                $(if let Some(v) = patch.$field { next.$field = v; })*
            };
        }
        apply!(
            min_karma,
            authenticated_karma,
            attachment_karma,
            trust_authenticated,
            logging_enabled,
            purge_age_days,
            use_external,
            train_external,
            is_forwarded,
            strategy_timeout_ms,
            slow_strategy_warn_ms
        );
        next.validate()?;
        Ok(next)
    }
}

/// Partial policy update from the admin surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyPatch {
    pub min_karma: Option<i32>,
    pub authenticated_karma: Option<i32>,
    pub attachment_karma: Option<i32>,
    pub trust_authenticated: Option<bool>,
    pub logging_enabled: Option<bool>,
    pub purge_age_days: Option<u32>,
    pub use_external: Option<bool>,
    pub train_external: Option<bool>,
    pub is_forwarded: Option<bool>,
    pub strategy_timeout_ms: Option<u64>,
    pub slow_strategy_warn_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_patch_applies_only_given_fields() {
        let p = Policy::default();
        let next = p
            .patched(&PolicyPatch {
                min_karma: Some(3),
                use_external: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(next.min_karma, 3);
        assert!(!next.use_external);
        assert_eq!(next.authenticated_karma, p.authenticated_karma);
    }

    #[test]
    fn invalid_patch_is_rejected_and_leaves_original() {
        let p = Policy::default();
        let err = p
            .patched(&PolicyPatch {
                min_karma: Some(42),
                purge_age_days: Some(0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SpamError::Config(_)));
        assert_eq!(p.min_karma, 0);
        assert_eq!(p.purge_age_days, 7);
    }

    #[test]
    fn warn_budget_cannot_exceed_hard_timeout() {
        let p = Policy::default();
        assert!(p
            .patched(&PolicyPatch {
                strategy_timeout_ms: Some(1_000),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn sanitize_repairs_out_of_range_values() {
        let p = Policy {
            purge_age_days: 0,
            strategy_timeout_ms: 0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(p.purge_age_days, 7);
        assert_eq!(p.strategy_timeout_ms, 5_000);
        assert!(p.validate().is_ok());

        let p = Policy {
            purge_age_days: u32::MAX,
            authenticated_karma: i32::MAX,
            min_karma: i32::MIN,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(p.purge_age_days, 7);
        assert_eq!(p.authenticated_karma, 10);
        assert_eq!(p.min_karma, 0);
    }

    #[test]
    fn retention_beyond_a_century_is_rejected() {
        let p = Policy::default();
        for days in [MAX_PURGE_AGE_DAYS + 1, u32::MAX] {
            let err = p
                .patched(&PolicyPatch {
                    purge_age_days: Some(days),
                    ..Default::default()
                })
                .unwrap_err();
            assert!(matches!(err, SpamError::Config(_)));
        }
        assert!(p
            .patched(&PolicyPatch {
                purge_age_days: Some(MAX_PURGE_AGE_DAYS),
                ..Default::default()
            })
            .is_ok());
    }

    #[test]
    fn karma_seeds_are_bounded() {
        let p = Policy::default();
        for patch in [
            PolicyPatch {
                authenticated_karma: Some(i32::MAX),
                ..Default::default()
            },
            PolicyPatch {
                attachment_karma: Some(MAX_POLICY_KARMA + 1),
                ..Default::default()
            },
            PolicyPatch {
                min_karma: Some(i32::MIN),
                ..Default::default()
            },
        ] {
            assert!(matches!(p.patched(&patch), Err(SpamError::Config(_))));
        }
        assert!(p
            .patched(&PolicyPatch {
                min_karma: Some(-MAX_POLICY_KARMA),
                authenticated_karma: Some(MAX_POLICY_KARMA),
                ..Default::default()
            })
            .is_ok());
    }
}
