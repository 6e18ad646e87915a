//! # Decision Engine
//! Runs the strategy panel over one submission and turns the votes into a
//! `Decision`, then writes the audit record.
//!
//! Order of operations per submission:
//! 1) trusted short-circuit (authenticated user, `trust_authenticated`)
//! 2) policy seeds: authenticated bonus, attachment weighting
//! 3) canonical content via the change extractor
//! 4) panel fan-out: one task per strategy, hard timeout per call
//! 5) `score < min_karma` ⇒ reject
//! 6) audit log insert + purge (when logging is enabled)

use std::{sync::Arc, time::Duration};

use chrono::{SubsecRound, Utc};
use metrics::{counter, histogram};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::changes;
use crate::config::{Policy, PolicyPatch, SpamFilterConfig};
use crate::decision::{Decision, ScoreReason};
use crate::error::{Result, SpamError};
use crate::replay::{self, RetrainSummary};
use crate::storage::{AuditLog, Database, LogEntry};
use crate::strategy::{
    join_guarded, spawn_guarded, CallResult, StrategyInfo, StrategyInput, StrategyOutcome,
    StrategySet,
};
use crate::submission::{format_headers, Submission};

/// One panel member's result for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelResult {
    pub strategy: &'static str,
    pub outcome: StrategyOutcome,
}

pub struct FilterSystem {
    policy: RwLock<Policy>,
    strategies: StrategySet,
    db: Database,
    log: AuditLog,
}

impl FilterSystem {
    pub fn new(policy: Policy, strategies: StrategySet, db: Database) -> Self {
        let log = db.audit_log();
        Self {
            policy: RwLock::new(policy.sanitized()),
            strategies,
            db,
            log,
        }
    }

    /// Opens the database and builds the configured panel.
    pub fn from_config(cfg: &SpamFilterConfig) -> anyhow::Result<Self> {
        let db = Database::open(&cfg.database.path)?;
        let strategies = StrategySet::from_config(&cfg.strategies, &db)?;
        info!(
            target: "engine",
            strategies = ?strategies.infos().iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            db = %cfg.database.path.display(),
            "filter system ready"
        );
        Ok(Self::new(cfg.policy.clone(), strategies, db))
    }

    pub fn policy(&self) -> Policy {
        self.policy.read().clone()
    }

    /// Validates the patched policy before swapping it in.
    pub fn update_policy(&self, patch: &PolicyPatch) -> Result<Policy> {
        let mut guard = self.policy.write();
        let next = guard.patched(patch)?;
        *guard = next.clone();
        info!(target: "engine", ?patch, "policy updated");
        Ok(next)
    }

    pub fn strategies(&self) -> Vec<StrategyInfo> {
        self.strategies.infos()
    }

    pub fn strategy_set(&self) -> &StrategySet {
        &self.strategies
    }

    pub fn set_strategy_karma(&self, name: &str, points: i32) -> Result<()> {
        self.strategies.set_karma(name, points)?;
        info!(target: "engine", strategy = name, points, "strategy karma updated");
        Ok(())
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.log
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Accepts or rejects; a rejection is `Err(SpamError::Rejected)`.
    pub async fn test(&self, submission: Submission) -> Result<()> {
        let decision = self.evaluate(submission).await?;
        match decision.rejection() {
            Some(rejection) => Err(SpamError::Rejected(rejection)),
            None => Ok(()),
        }
    }

    pub async fn evaluate(&self, submission: Submission) -> Result<Decision> {
        let policy = self.policy();
        let request = &submission.request;
        let authenticated = request.is_authenticated();

        if authenticated && policy.trust_authenticated {
            debug!(target: "engine", path = %request.path, "authenticated user trusted, panel skipped");
            counter!("spamfilter_submissions_total", "outcome" => "trusted").increment(1);
            return Ok(Decision::trusted());
        }

        let mut score = 0i32;
        let mut reasons = Vec::new();
        if authenticated {
            score = score.saturating_add(policy.authenticated_karma);
            reasons.push(ScoreReason::new(
                "AuthenticatedUser",
                policy.authenticated_karma,
                "User is authenticated",
            ));
        }
        if submission.attachment && policy.attachment_karma != 0 {
            score = score.saturating_add(policy.attachment_karma);
            reasons.push(ScoreReason::new(
                "Attachment",
                policy.attachment_karma,
                "Attachment weighting",
            ));
        }

        let input = StrategyInput {
            request: request.clone(),
            author: submission.normalized_author(),
            content: changes::combine(&submission.changes),
            ip: request.client_ip(policy.is_forwarded),
        };
        let cid = content_id(&input.content);
        debug!(target: "engine", cid = %cid, preview = %preview(&input.content), "evaluating submission");

        let input = Arc::new(input);
        for result in self.run_panel(input.clone(), &policy).await {
            if let StrategyOutcome::Verdict(v) = result.outcome {
                score = score.saturating_add(v.points);
                if !v.message.is_empty() {
                    reasons.push(ScoreReason::new(result.strategy, v.points, v.message));
                }
            }
        }

        let mut decision = Decision::scored(score, reasons, policy.min_karma);
        counter!("spamfilter_submissions_total", "outcome" => if decision.rejected { "rejected" } else { "accepted" })
            .increment(1);
        if decision.rejected {
            counter!("spamfilter_rejected_total").increment(1);
        }

        if policy.logging_enabled {
            let mut entry = LogEntry {
                id: None,
                time: Utc::now().trunc_subsecs(0),
                path: input.request.path.clone(),
                author: input.author.clone(),
                authenticated,
                ip: input.ip.clone(),
                headers: format_headers(&input.request.headers),
                content: input.content.clone(),
                rejected: decision.rejected,
                karma: score,
                reasons: decision.formatted_reasons(),
            };
            let id = self.log.insert(&mut entry)?;
            self.log.purge(policy.purge_age_days)?;
            decision = decision.with_log_id(id);
        }

        info!(
            target: "engine",
            cid = %cid,
            ip = %input.ip,
            score,
            min_karma = policy.min_karma,
            rejected = decision.rejected,
            log_id = ?decision.log_id,
            "submission evaluated"
        );
        Ok(decision)
    }

    /// Tests every eligible strategy concurrently; results in registration order.
    pub async fn run_panel(&self, input: Arc<StrategyInput>, policy: &Policy) -> Vec<PanelResult> {
        let budget = Duration::from_millis(policy.strategy_timeout_ms);
        let slow = Duration::from_millis(policy.slow_strategy_warn_ms);

        let handles: Vec<_> = self
            .strategies
            .iter()
            .filter(|s| {
                let eligible = policy.use_external || !s.is_external();
                if !eligible {
                    debug!(target: "engine", strategy = s.name(), "external strategy skipped");
                }
                eligible
            })
            .map(|s| {
                let strategy = s.clone();
                let input = input.clone();
                let name = s.name();
                let handle = spawn_guarded(budget, async move { strategy.test(&input).await });
                (name, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let (elapsed, call) = join_guarded(handle).await;
            if let Some(elapsed) = elapsed {
                histogram!("spamfilter_strategy_ms", "strategy" => name).record(elapsed.as_secs_f64() * 1000.0);
                if elapsed > slow {
                    warn!(target: "engine", strategy = name, elapsed_ms = elapsed.as_millis() as u64, "slow strategy");
                }
            }
            let outcome = match call {
                CallResult::Done(Some(v)) => StrategyOutcome::Verdict(v),
                CallResult::Done(None) => StrategyOutcome::Abstain,
                CallResult::Fault(e) => {
                    error!(target: "engine", strategy = name, error = %e, "strategy fault, treated as abstention");
                    counter!("spamfilter_strategy_faults_total", "strategy" => name).increment(1);
                    StrategyOutcome::Fault(e)
                }
                CallResult::TimedOut => {
                    warn!(
                        target: "engine",
                        strategy = name,
                        timeout_ms = policy.strategy_timeout_ms,
                        "strategy timed out, treated as abstention"
                    );
                    counter!("spamfilter_strategy_timeouts_total", "strategy" => name).increment(1);
                    StrategyOutcome::TimedOut
                }
            };
            results.push(PanelResult { strategy: name, outcome });
        }
        results
    }

    /// Re-trains the panel from a logged submission.
    pub async fn retrain(&self, log_id: i64, is_spam: bool) -> Result<RetrainSummary> {
        replay::retrain(self, log_id, is_spam).await
    }
}

/// Short anonymized id of a content string (first 6 bytes of its sha256).
pub(crate) fn content_id(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn preview(text: &str) -> String {
    const MAX: usize = 60;
    let mut out: String = text.chars().take(MAX).collect();
    if text.chars().nth(MAX).is_some() {
        out.push('…');
    }
    out.replace('\n', " ")
}
