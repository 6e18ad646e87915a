// tests/common/mod.rs
//
// Scripted strategies and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;

use spam_karma::config::Policy;
use spam_karma::storage::Database;
use spam_karma::strategy::{FilterStrategy, Karma, StrategyInput, StrategySet, Verdict};
use spam_karma::{Change, FilterSystem, RequestContext, Submission};

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Vote(i32, &'static str),
    Abstain,
    Fail,
    Panic,
    Sleep(Duration),
    /// Occupies a blocking-pool thread for the duration.
    Blocking(Duration),
    FailTraining,
}

pub struct Scripted {
    name: &'static str,
    karma: Karma,
    external: bool,
    behavior: Behavior,
    pub seen: Mutex<Vec<StrategyInput>>,
    pub trained: Mutex<Vec<(StrategyInput, bool)>>,
}

impl Scripted {
    pub fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            karma: Karma::new(5),
            external: false,
            behavior,
            seen: Mutex::new(Vec::new()),
            trained: Mutex::new(Vec::new()),
        })
    }

    pub fn external(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            karma: Karma::new(5),
            external: true,
            behavior,
            seen: Mutex::new(Vec::new()),
            trained: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl FilterStrategy for Scripted {
    fn name(&self) -> &'static str {
        self.name
    }

    fn karma_points(&self) -> i32 {
        self.karma.get()
    }

    fn set_karma_points(&self, points: i32) {
        self.karma.set(points)
    }

    fn is_external(&self) -> bool {
        self.external
    }

    async fn test(&self, input: &StrategyInput) -> anyhow::Result<Option<Verdict>> {
        self.seen.lock().push(input.clone());
        match self.behavior {
            Behavior::Vote(points, message) => Ok(Some(Verdict::new(points, message))),
            Behavior::Abstain | Behavior::FailTraining => Ok(None),
            Behavior::Fail => anyhow::bail!("service unavailable"),
            Behavior::Panic => panic!("scripted panic"),
            Behavior::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(Some(Verdict::new(-100, "too late")))
            }
            Behavior::Blocking(d) => {
                tokio::task::spawn_blocking(move || std::thread::sleep(d)).await?;
                Ok(Some(Verdict::new(-100, "too late")))
            }
        }
    }

    async fn train(&self, input: &StrategyInput, is_spam: bool) -> anyhow::Result<()> {
        if let Behavior::FailTraining = self.behavior {
            anyhow::bail!("training backend down");
        }
        self.trained.lock().push((input.clone(), is_spam));
        Ok(())
    }
}

pub fn panel(strategies: &[Arc<Scripted>]) -> StrategySet {
    let mut set = StrategySet::new();
    for s in strategies {
        set.push(s.clone());
    }
    set
}

pub fn engine(policy: Policy, strategies: &[Arc<Scripted>]) -> FilterSystem {
    let db = Database::open_in_memory().expect("in-memory db");
    FilterSystem::new(policy, panel(strategies), db)
}

pub fn anonymous_comment(text: &str) -> Submission {
    let request = RequestContext::new("POST", "/ticket/7", "203.0.113.5")
        .with_header("Host", "trac.example.org")
        .with_header("User-Agent", "Mozilla/5.0")
        .with_header("Cookie", "trac_session=abc");
    Submission::new("visitor", request).with_change(Change::created(text))
}
