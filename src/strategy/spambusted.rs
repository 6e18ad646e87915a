// src/strategy/spambusted.rs
//! SpamBusted IP/user reputation lookup.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{split_author, FilterStrategy, Karma, StrategyInput, Verdict};
use crate::config::SpamBustedConfig;
use crate::submission::ANONYMOUS;

pub struct SpamBustedStrategy {
    karma: Karma,
    api_key: String,
    api_url: String,
    http: reqwest::Client,
}

impl SpamBustedStrategy {
    pub fn new(cfg: &SpamBustedConfig, http: reqwest::Client) -> Self {
        Self {
            karma: Karma::new(cfg.karma),
            api_key: cfg.api_key.clone(),
            api_url: cfg.api_url.clone(),
            http,
        }
    }

    /// Query parameters: `ip`, plus `username` / `email` when known.
    pub fn query_params(input: &StrategyInput) -> Vec<(&'static str, String)> {
        let (mut name, email) = split_author(&input.author);
        if name.as_deref() == Some(ANONYMOUS) {
            name = None;
        }

        let mut params = vec![("ip", input.ip.clone())];
        if let Some(name) = name {
            params.push(("username", name));
        }
        if let Some(email) = email {
            params.push(("email", email));
        }
        params
    }

    async fn lookup(&self, params: &[(&'static str, String)]) -> reqwest::Result<String> {
        debug!(target: "strategy", url = %self.api_url, "querying SpamBusted");
        self.http
            .get(&self.api_url)
            .query(params)
            .send()
            .await?
            .text()
            .await
    }
}

#[async_trait]
impl FilterStrategy for SpamBustedStrategy {
    fn name(&self) -> &'static str {
        "SpamBusted"
    }

    fn karma_points(&self) -> i32 {
        self.karma.get()
    }

    fn set_karma_points(&self, points: i32) {
        self.karma.set(points)
    }

    fn is_external(&self) -> bool {
        true
    }

    async fn test(&self, input: &StrategyInput) -> anyhow::Result<Option<Verdict>> {
        if self.karma.get() == 0 {
            return Ok(None);
        }
        match self.lookup(&Self::query_params(input)).await {
            Ok(resp) if resp.trim() == "Yes" => Ok(Some(Verdict::new(
                -self.karma.magnitude(),
                "SpamBusted says this is spam",
            ))),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(target: "strategy", error = %e, "SpamBusted request failed");
                Ok(None)
            }
        }
    }

    async fn train(&self, input: &StrategyInput, is_spam: bool) -> anyhow::Result<()> {
        if !is_spam || self.api_key.is_empty() || self.karma.get() == 0 {
            return Ok(());
        }
        let mut params = Self::query_params(input);
        if !params.iter().any(|(k, _)| *k == "username") {
            return Ok(());
        }
        params.push(("api", self.api_key.clone()));
        if let Err(e) = self.lookup(&params).await {
            warn!(target: "strategy", error = %e, "SpamBusted report failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::RequestContext;

    fn input(author: &str) -> StrategyInput {
        StrategyInput {
            request: RequestContext::default(),
            author: author.into(),
            content: String::new(),
            ip: "198.51.100.4".into(),
        }
    }

    #[test]
    fn anonymous_author_sends_only_ip() {
        let params = SpamBustedStrategy::query_params(&input(ANONYMOUS));
        assert_eq!(params, vec![("ip", "198.51.100.4".to_string())]);
    }

    #[test]
    fn named_author_with_email() {
        let params = SpamBustedStrategy::query_params(&input("Eve <eve@example.org>"));
        assert_eq!(
            params,
            vec![
                ("ip", "198.51.100.4".to_string()),
                ("username", "Eve".to_string()),
                ("email", "eve@example.org".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn ham_and_keyless_training_are_noops() {
        let s = SpamBustedStrategy::new(&SpamBustedConfig::default(), reqwest::Client::new());
        s.train(&input("eve"), false).await.unwrap();
        s.train(&input("eve"), true).await.unwrap();
    }
}
