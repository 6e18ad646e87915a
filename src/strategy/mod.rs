// src/strategy/mod.rs
//! Filter strategy contract and the ordered registry the engine runs.
//!
//! - `FilterStrategy`: one panel member. `test` returns `Ok(None)` to abstain,
//!   `Ok(Some(verdict))` to vote, `Err` for a fault the engine absorbs.
//! - `StrategySet`: open, ordered collection of `Arc<dyn FilterStrategy>`.
//! - `spawn_guarded` / `join_guarded`: one tokio task per call under a hard
//!   timeout; panics and errors become `CallResult::Fault`.

pub mod akismet;
pub mod bayes;
pub mod duplicate;
pub mod extlinks;
pub mod ip_blacklist;
pub mod regex;
pub mod spambusted;
pub mod spamwipe;
pub mod throttle;

use std::{
    future::Future,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::{task::JoinHandle, time::Instant};

use crate::config::StrategiesConfig;
use crate::error::{Result, SpamError};
use crate::storage::Database;
use crate::submission::RequestContext;

/// Upper bound for a configured karma magnitude.
pub const MAX_KARMA_POINTS: i32 = 1000;

/// A strategy's vote on one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub points: i32,
    pub message: String,
}

impl Verdict {
    pub fn new(points: i32, message: impl Into<String>) -> Self {
        Self {
            points,
            message: message.into(),
        }
    }
}

/// What the engine observed for one strategy call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Verdict(Verdict),
    Abstain,
    Fault(String),
    TimedOut,
}

/// Everything a strategy may look at. Shared read-only across the panel.
#[derive(Debug, Clone)]
pub struct StrategyInput {
    pub request: RequestContext,
    pub author: String,
    /// Canonical content (see `changes::combine`).
    pub content: String,
    pub ip: String,
}

#[async_trait]
pub trait FilterStrategy: Send + Sync {
    /// Stable short identifier, used as the reason key.
    fn name(&self) -> &'static str;

    /// Configured magnitude; the sign is applied by the strategy.
    fn karma_points(&self) -> i32;

    fn set_karma_points(&self, points: i32);

    /// Discloses submission data to a third party.
    fn is_external(&self) -> bool {
        false
    }

    async fn test(&self, input: &StrategyInput) -> anyhow::Result<Option<Verdict>>;

    async fn train(&self, _input: &StrategyInput, _is_spam: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Runtime-adjustable karma magnitude.
#[derive(Debug, Default)]
pub struct Karma(AtomicI32);

impl Karma {
    pub fn new(points: i32) -> Self {
        Self(AtomicI32::new(points))
    }

    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, points: i32) {
        self.0.store(points, Ordering::Relaxed)
    }

    /// |karma|, the penalty every negative vote is built from.
    pub fn magnitude(&self) -> i32 {
        self.get().saturating_abs()
    }
}

/// Admin view of one registered strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyInfo {
    pub name: String,
    pub karma_points: i32,
    pub external: bool,
}

/// Ordered strategy registry. Order is registration order.
#[derive(Clone, Default)]
pub struct StrategySet {
    items: Vec<Arc<dyn FilterStrategy>>,
}

impl StrategySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: FilterStrategy + 'static>(mut self, strategy: S) -> Self {
        self.items.push(Arc::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Arc<dyn FilterStrategy>) {
        self.items.push(strategy);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FilterStrategy>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn FilterStrategy>> {
        self.items.iter().find(|s| s.name() == name)
    }

    pub fn infos(&self) -> Vec<StrategyInfo> {
        self.items
            .iter()
            .map(|s| StrategyInfo {
                name: s.name().to_string(),
                karma_points: s.karma_points(),
                external: s.is_external(),
            })
            .collect()
    }

    /// Validates and applies a new karma magnitude.
    pub fn set_karma(&self, name: &str, points: i32) -> Result<()> {
        if !(0..=MAX_KARMA_POINTS).contains(&points) {
            return Err(SpamError::Config(format!(
                "karma points must be within 0..={MAX_KARMA_POINTS}"
            )));
        }
        let strategy = self
            .get(name)
            .ok_or_else(|| SpamError::UnknownStrategy(name.to_string()))?;
        strategy.set_karma_points(points);
        Ok(())
    }

    /// Builds the default panel from configuration, in a fixed order.
    pub fn from_config(cfg: &StrategiesConfig, db: &Database) -> anyhow::Result<Self> {
        let mut set = StrategySet::new();
        if cfg.regex.enabled {
            set = set.with(regex::RegexStrategy::new(&cfg.regex));
        }
        if cfg.extlinks.enabled {
            set = set.with(extlinks::ExternalLinksStrategy::new(&cfg.extlinks));
        }
        if cfg.duplicate.enabled {
            set = set.with(duplicate::DuplicateStrategy::new(&cfg.duplicate));
        }
        if cfg.throttle.enabled {
            set = set.with(throttle::IpThrottleStrategy::new(&cfg.throttle, db.audit_log()));
        }
        if cfg.bayes.enabled {
            set = set.with(bayes::BayesStrategy::new(&cfg.bayes, db.classifier()));
        }
        if cfg.ip_blacklist.enabled {
            set = set.with(ip_blacklist::IpBlacklistStrategy::new(&cfg.ip_blacklist));
        }

        let http = remote_client()?;
        if cfg.akismet.enabled {
            set = set.with(akismet::AkismetStrategy::akismet(&cfg.akismet, http.clone()));
        }
        if cfg.typepad.enabled {
            set = set.with(akismet::AkismetStrategy::typepad(&cfg.typepad, http.clone()));
        }
        if cfg.spambusted.enabled {
            set = set.with(spambusted::SpamBustedStrategy::new(&cfg.spambusted, http.clone()));
        }
        if cfg.spamwipe.enabled {
            set = set.with(spamwipe::SpamWipeStrategy::new(&cfg.spamwipe, http));
        }
        Ok(set)
    }
}

pub(crate) const USER_AGENT: &str = concat!("spam-karma/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for the remote strategies.
pub fn remote_client() -> anyhow::Result<reqwest::Client> {
    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(3))
        .timeout(Duration::from_secs(4))
        .build()?;
    Ok(http)
}

/// Splits `Name <email>` into its parts. A bare address yields only the email,
/// anything else is taken as the name.
pub(crate) fn split_author(author: &str) -> (Option<String>, Option<String>) {
    let author = author.trim();
    if let (Some(lt), Some(gt)) = (author.find('<'), author.rfind('>')) {
        if lt < gt {
            let name = author[..lt].trim().trim_matches('"').trim();
            let email = author[lt + 1..gt].trim();
            let name = (!name.is_empty()).then(|| name.to_string());
            let email = email.contains('@').then(|| email.to_string());
            if name.is_some() || email.is_some() {
                return (name, email);
            }
        }
    }
    if author.is_empty() {
        return (None, None);
    }
    if !author.contains(char::is_whitespace) && author.find('@').is_some_and(|at| at > 0) {
        return (None, Some(author.to_string()));
    }
    (Some(author.to_string()), None)
}

/// Outcome of one guarded strategy call.
#[derive(Debug)]
pub(crate) enum CallResult<T> {
    Done(T),
    Fault(String),
    TimedOut,
}

pub(crate) type GuardedHandle<T> =
    JoinHandle<(Duration, std::result::Result<anyhow::Result<T>, tokio::time::error::Elapsed>)>;

/// Spawns `fut` on its own task with a hard `budget`. A late result is dropped.
pub(crate) fn spawn_guarded<T, F>(budget: Duration, fut: F) -> GuardedHandle<T>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    tokio::spawn(async move {
        let started = Instant::now();
        let res = tokio::time::timeout(budget, fut).await;
        (started.elapsed(), res)
    })
}

/// Awaits a guarded call; returns the elapsed time when the call finished.
pub(crate) async fn join_guarded<T>(handle: GuardedHandle<T>) -> (Option<Duration>, CallResult<T>) {
    match handle.await {
        Ok((elapsed, Ok(Ok(value)))) => (Some(elapsed), CallResult::Done(value)),
        Ok((elapsed, Ok(Err(e)))) => (Some(elapsed), CallResult::Fault(format!("{e:#}"))),
        Ok((_, Err(_))) => (None, CallResult::TimedOut),
        Err(join) if join.is_panic() => (None, CallResult::Fault("strategy panicked".into())),
        Err(join) => (None, CallResult::Fault(join.to_string())),
    }
}
