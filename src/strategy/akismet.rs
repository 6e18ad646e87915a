// src/strategy/akismet.rs
//! Akismet-protocol reputation services (Akismet, TypePad AntiSpam).
//!
//! Protocol (form-encoded POST, plain-text response):
//! - `http://{api_url}verify-key` → `valid` (cached per key)
//! - `http://{key}.{api_url}comment-check` → anything but `false` is spam
//! - `http://{key}.{api_url}submit-spam` / `submit-ham` for training
//!
//! Network failures are logged and treated as an abstention.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{split_author, FilterStrategy, Karma, StrategyInput, Verdict};
use crate::config::RemoteServiceConfig;

pub struct AkismetStrategy {
    name: &'static str,
    karma: Karma,
    api_key: String,
    api_url: String,
    blog_url: String,
    http: reqwest::Client,
    verified_key: Mutex<Option<String>>,
}

impl AkismetStrategy {
    pub fn akismet(cfg: &RemoteServiceConfig, http: reqwest::Client) -> Self {
        Self::with_name("Akismet", cfg, http)
    }

    pub fn typepad(cfg: &RemoteServiceConfig, http: reqwest::Client) -> Self {
        Self::with_name("TypePad", cfg, http)
    }

    fn with_name(name: &'static str, cfg: &RemoteServiceConfig, http: reqwest::Client) -> Self {
        let mut api_url = cfg.api_url.trim().to_string();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }
        Self {
            name,
            karma: Karma::new(cfg.karma),
            api_key: cfg.api_key.clone(),
            api_url,
            blog_url: cfg.blog_url.clone(),
            http,
            verified_key: Mutex::new(None),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("http://{}.{}{}", self.api_key, self.api_url, method)
    }

    /// Form parameters describing the submission.
    pub fn form_params(&self, input: &StrategyInput) -> Vec<(&'static str, String)> {
        let (name, email) = split_author(&input.author);
        let blog = if self.blog_url.is_empty() {
            input
                .request
                .header("Host")
                .map(|h| format!("http://{h}/"))
                .unwrap_or_default()
        } else {
            self.blog_url.clone()
        };
        let mut params = vec![
            ("blog", blog),
            ("user_ip", input.ip.clone()),
            (
                "user_agent",
                input.request.header("User-Agent").unwrap_or_default().to_string(),
            ),
            (
                "referrer",
                input.request.header("Referer").unwrap_or("unknown").to_string(),
            ),
            ("comment_author", name.unwrap_or_else(|| input.author.clone())),
            ("comment_content", input.content.clone()),
        ];
        if let Some(email) = email {
            params.push(("comment_author_email", email));
        }
        params
    }

    async fn preconditions(&self, input: &StrategyInput) -> bool {
        if self.api_key.is_empty() {
            debug!(target: "strategy", strategy = self.name, "API key missing, check skipped");
            return false;
        }
        if is_binary(&input.content) {
            debug!(target: "strategy", strategy = self.name, "binary content, check skipped");
            return false;
        }
        match self.verify_key(input).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(target: "strategy", strategy = self.name, "API key is invalid");
                false
            }
            Err(e) => {
                warn!(target: "strategy", strategy = self.name, error = %e, "key verification failed");
                false
            }
        }
    }

    async fn verify_key(&self, input: &StrategyInput) -> reqwest::Result<bool> {
        if self.verified_key.lock().as_deref() == Some(self.api_key.as_str()) {
            return Ok(true);
        }
        debug!(target: "strategy", strategy = self.name, "verifying API key");
        let blog = self
            .form_params(input)
            .into_iter()
            .find(|(k, _)| *k == "blog")
            .map(|(_, v)| v)
            .unwrap_or_default();
        let resp = self
            .http
            .post(format!("http://{}verify-key", self.api_url))
            .form(&[("blog", blog.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await?
            .text()
            .await?;
        let valid = resp.trim().eq_ignore_ascii_case("valid");
        if valid {
            *self.verified_key.lock() = Some(self.api_key.clone());
        }
        Ok(valid)
    }

    async fn post(&self, method: &str, input: &StrategyInput) -> reqwest::Result<String> {
        let url = self.endpoint(method);
        debug!(target: "strategy", strategy = self.name, method, "calling remote service");
        self.http
            .post(url)
            .form(&self.form_params(input))
            .send()
            .await?
            .text()
            .await
    }
}

/// NUL bytes in the first KiB mark binary content.
pub(super) fn is_binary(content: &str) -> bool {
    content.bytes().take(1024).any(|b| b == 0)
}

#[async_trait]
impl FilterStrategy for AkismetStrategy {
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
        true
    }

    async fn test(&self, input: &StrategyInput) -> anyhow::Result<Option<Verdict>> {
        if !self.preconditions(input).await {
            return Ok(None);
        }
        match self.post("comment-check", input).await {
            Ok(resp) if !resp.trim().eq_ignore_ascii_case("false") => Ok(Some(Verdict::new(
                -self.karma.magnitude(),
                format!("{} says content is spam", self.name),
            ))),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(target: "strategy", strategy = self.name, error = %e, "request failed");
                Ok(None)
            }
        }
    }

    async fn train(&self, input: &StrategyInput, is_spam: bool) -> anyhow::Result<()> {
        if !self.preconditions(input).await {
            return Ok(());
        }
        let method = if is_spam { "submit-spam" } else { "submit-ham" };
        if let Err(e) = self.post(method, input).await {
            warn!(target: "strategy", strategy = self.name, error = %e, "training request failed");
        }
        Ok(())
    }
}
