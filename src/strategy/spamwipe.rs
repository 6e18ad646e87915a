// src/strategy/spamwipe.rs
//! SpamWipe comment classification service.
//!
//! Form-encoded POSTs against `api_url`, XML-ish responses:
//! - `verify-key` → `<item>valid</item>` (cached per key)
//! - `classify` → `<item>true</item>` is spam, `<item>false</item>` is ham
//! - `markas-spam` / `markas-ham` for training
//!
//! Unlike Akismet, a ham answer earns positive karma.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::akismet::is_binary;
use super::{split_author, FilterStrategy, Karma, StrategyInput, Verdict};
use crate::config::SpamWipeConfig;

const UNKNOWN_EMAIL: &str = "invalid@invalid";

pub struct SpamWipeStrategy {
    karma: Karma,
    api_key: String,
    api_url: String,
    site_url: String,
    http: reqwest::Client,
    verified_key: Mutex<Option<String>>,
}

/// Maps a `classify` response body to points, `None` when it carries no verdict.
pub fn classify_verdict(resp: &str, magnitude: i32) -> Option<Verdict> {
    if resp.contains("<item>false</item>") {
        Some(Verdict::new(magnitude, "SpamWipe says content is ham"))
    } else if resp.contains("<item>true</item>") {
        Some(Verdict::new(-magnitude, "SpamWipe says content is spam"))
    } else {
        None
    }
}

impl SpamWipeStrategy {
    pub fn new(cfg: &SpamWipeConfig, http: reqwest::Client) -> Self {
        let mut api_url = cfg.api_url.trim().to_string();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }
        Self {
            karma: Karma::new(cfg.karma),
            api_key: cfg.api_key.clone(),
            api_url,
            site_url: cfg.site_url.clone(),
            http,
            verified_key: Mutex::new(None),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}{}", self.api_url, method)
    }

    fn site(&self, input: &StrategyInput) -> String {
        if !self.site_url.is_empty() {
            return self.site_url.clone();
        }
        input
            .request
            .header("Host")
            .map(|h| format!("http://{h}/"))
            .unwrap_or_default()
    }

    pub fn form_params(&self, input: &StrategyInput) -> Vec<(&'static str, String)> {
        let (name, email) = split_author(&input.author);
        vec![
            ("site_ip", self.site(input)),
            ("ip", input.ip.clone()),
            (
                "client_ua",
                input.request.header("User-Agent").unwrap_or_default().to_string(),
            ),
            (
                "client_referer",
                input.request.header("Referer").unwrap_or("unknown").to_string(),
            ),
            ("name", name.unwrap_or_else(|| input.author.clone())),
            ("type", "trac".to_string()),
            ("email", email.unwrap_or_else(|| UNKNOWN_EMAIL.to_string())),
            ("comment", input.content.clone()),
            ("HTTP_X_API_KEY", self.api_key.clone()),
        ]
    }

    async fn preconditions(&self, input: &StrategyInput) -> bool {
        if self.karma.magnitude() == 0 {
            return false;
        }
        if self.api_key.is_empty() {
            debug!(target: "strategy", strategy = "SpamWipe", "API key missing, check skipped");
            return false;
        }
        if is_binary(&input.content) {
            debug!(target: "strategy", strategy = "SpamWipe", "binary content, check skipped");
            return false;
        }
        match self.verify_key(input).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(target: "strategy", strategy = "SpamWipe", "API key is invalid");
                false
            }
            Err(e) => {
                warn!(target: "strategy", strategy = "SpamWipe", error = %e, "key verification failed");
                false
            }
        }
    }

    async fn verify_key(&self, input: &StrategyInput) -> reqwest::Result<bool> {
        if self.verified_key.lock().as_deref() == Some(self.api_key.as_str()) {
            return Ok(true);
        }
        debug!(target: "strategy", strategy = "SpamWipe", "verifying API key");
        let site = self.site(input);
        let resp = self
            .http
            .post(self.endpoint("verify-key"))
            .form(&[("site", site.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await?
            .text()
            .await?;
        let valid = resp.contains("<item>valid</item>");
        if valid {
            *self.verified_key.lock() = Some(self.api_key.clone());
        }
        Ok(valid)
    }

    async fn post(&self, method: &str, input: &StrategyInput) -> reqwest::Result<String> {
        debug!(target: "strategy", strategy = "SpamWipe", method, "calling remote service");
        self.http
            .post(self.endpoint(method))
            .form(&self.form_params(input))
            .send()
            .await?
            .text()
            .await
    }
}

#[async_trait]
impl FilterStrategy for SpamWipeStrategy {
    fn name(&self) -> &'static str {
        "SpamWipe"
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
        if !self.preconditions(input).await {
            return Ok(None);
        }
        match self.post("classify", input).await {
            Ok(resp) => Ok(classify_verdict(&resp, self.karma.magnitude())),
            Err(e) => {
                warn!(target: "strategy", strategy = "SpamWipe", error = %e, "request failed");
                Ok(None)
            }
        }
    }

    async fn train(&self, input: &StrategyInput, is_spam: bool) -> anyhow::Result<()> {
        if !self.preconditions(input).await {
            return Ok(());
        }
        let method = if is_spam { "markas-spam" } else { "markas-ham" };
        if let Err(e) = self.post(method, input).await {
            warn!(target: "strategy", strategy = "SpamWipe", error = %e, "training request failed");
        }
        Ok(())
    }
}
