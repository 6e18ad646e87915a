//! Retraining from the audit log.
//!
//! An administrator marks a logged submission as spam or ham; the stored
//! record is turned back into the request the panel originally saw and every
//! eligible strategy is trained with it. Training faults are logged, never
//! fatal, and the entry's rejected flag is set to the new label afterwards.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::FilterSystem;
use crate::error::{Result, SpamError};
use crate::storage::LogEntry;
use crate::strategy::{join_guarded, spawn_guarded, CallResult, StrategyInput};
use crate::submission::{parse_headers, RequestContext, ANONYMOUS};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetrainSummary {
    pub log_id: i64,
    pub is_spam: bool,
    pub trained: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Rebuilds the request of a logged submission. Cookies are not replayed.
pub fn request_from_entry(entry: &LogEntry) -> RequestContext {
    let headers = parse_headers(&entry.headers)
        .into_iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("Cookie"))
        .collect();
    RequestContext {
        method: "POST".to_string(),
        path: entry.path.clone(),
        headers,
        remote_addr: entry.ip.clone(),
        authname: entry.authenticated.then(|| entry.author.clone()),
    }
}

pub async fn retrain(engine: &FilterSystem, log_id: i64, is_spam: bool) -> Result<RetrainSummary> {
    let entry = engine
        .audit_log()
        .fetch(log_id)?
        .ok_or(SpamError::LogEntryNotFound(log_id))?;
    let policy = engine.policy();
    let budget = Duration::from_millis(policy.strategy_timeout_ms);

    let author = if entry.author.trim().is_empty() {
        ANONYMOUS.to_string()
    } else {
        entry.author.clone()
    };
    let input = Arc::new(StrategyInput {
        request: request_from_entry(&entry),
        author,
        content: entry.content.clone(),
        ip: entry.ip.clone(),
    });

    let mut summary = RetrainSummary {
        log_id,
        is_spam,
        ..Default::default()
    };
    let mut handles = Vec::new();
    for s in engine.strategy_set().iter() {
        if s.is_external() && !(policy.use_external && policy.train_external) {
            debug!(target: "replay", strategy = s.name(), "external training disabled, skipped");
            summary.skipped.push(s.name().to_string());
            continue;
        }
        let strategy = s.clone();
        let input = input.clone();
        handles.push((
            s.name(),
            spawn_guarded(budget, async move { strategy.train(&input, is_spam).await }),
        ));
    }

    for (name, handle) in handles {
        match join_guarded(handle).await.1 {
            CallResult::Done(()) => summary.trained.push(name.to_string()),
            CallResult::Fault(e) => {
                warn!(target: "replay", strategy = name, error = %e, "training failed");
                summary.failed.push(name.to_string());
            }
            CallResult::TimedOut => {
                warn!(target: "replay", strategy = name, "training timed out");
                summary.failed.push(name.to_string());
            }
        }
    }

    engine.audit_log().set_rejected(log_id, is_spam)?;
    info!(
        target: "replay",
        log_id,
        verdict = if is_spam { "spam" } else { "ham" },
        trained = summary.trained.len(),
        failed = summary.failed.len(),
        "log entry retrained"
    );
    Ok(summary)
}
