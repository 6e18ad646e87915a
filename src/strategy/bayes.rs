// src/strategy/bayes.rs
//! Statistical classifier as a panel member.
//!
//! Stays silent until it has seen `min_training` spam *and* ham messages.
//! Past that, the combined probability `p` maps to
//! `points = -round(karma * (2p - 1))`, so a neutral 0.5 abstains.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{FilterStrategy, Karma, StrategyInput, Verdict};
use crate::classifier;
use crate::config::BayesConfig;
use crate::error::Result;
use crate::storage::{bayes::Counts, ClassifierStore};

pub struct BayesStrategy {
    karma: Karma,
    min_training: u64,
    store: ClassifierStore,
}

impl BayesStrategy {
    pub fn new(cfg: &BayesConfig, store: ClassifierStore) -> Self {
        Self {
            karma: Karma::new(cfg.karma),
            min_training: cfg.min_training,
            store,
        }
    }

    /// Spam probability of `content` regardless of the training minimum.
    pub fn probability(&self, content: &str) -> Result<f64> {
        self.store.probability(content)
    }

    pub fn totals(&self) -> Result<Counts> {
        self.store.totals()
    }

    pub fn min_training(&self) -> u64 {
        self.min_training
    }
}

/// `-round(karma * (2p - 1))`
pub fn points_for(karma: i32, p: f64) -> i32 {
    -((f64::from(karma) * (p * 2.0 - 1.0)).round() as i32)
}

#[async_trait]
impl FilterStrategy for BayesStrategy {
    fn name(&self) -> &'static str {
        "Bayes"
    }

    fn karma_points(&self) -> i32 {
        self.karma.get()
    }

    fn set_karma_points(&self, points: i32) {
        self.karma.set(points)
    }

    async fn test(&self, input: &StrategyInput) -> anyhow::Result<Option<Verdict>> {
        let store = self.store.clone();
        let content = input.content.clone();
        let min_training = self.min_training;
        // SQLite work runs off the async workers so the call budget applies
        let (totals, p) = tokio::task::spawn_blocking(move || -> Result<(Counts, Option<f64>)> {
            let totals = store.totals()?;
            if totals.nspam.min(totals.nham) < min_training {
                return Ok((totals, None));
            }
            Ok((totals, Some(store.probability(&content)?)))
        })
        .await??;

        let Counts { nspam, nham } = totals;
        let Some(p) = p else {
            info!(
                target: "strategy",
                nspam,
                nham,
                min_training,
                "bayes filter requires more training"
            );
            return Ok(None);
        };
        if nham.abs_diff(nspam) > nham.min(nspam) * 2 {
            warn!(target: "strategy", nspam, nham, "ham/spam training imbalance, results may be bad");
        }

        debug!(target: "strategy", probability = p, "bayes score");
        let points = points_for(self.karma.get(), p);
        if points == 0 {
            return Ok(None);
        }
        Ok(Some(Verdict::new(
            points,
            format!("SpamBayes determined spam probability of {:.2}%", p * 100.0),
        )))
    }

    async fn train(&self, input: &StrategyInput, is_spam: bool) -> anyhow::Result<()> {
        info!(
            target: "strategy",
            verdict = if is_spam { "spam" } else { "ham" },
            "training bayes classifier"
        );
        let store = self.store.clone();
        let tokens = classifier::tokenize(&input.content);
        tokio::task::spawn_blocking(move || store.train(&tokens, is_spam)).await??;
        Ok(())
    }
}
