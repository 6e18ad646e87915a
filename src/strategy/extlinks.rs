// src/strategy/extlinks.rs
//! Penalizes submissions linking to too many external hosts.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use ::regex::Regex;

use super::{FilterStrategy, Karma, StrategyInput, Verdict};
use crate::config::ExtLinksConfig;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https?://([^/\s]+)/?").expect("url regex"));

pub struct ExternalLinksStrategy {
    karma: Karma,
    max_links: u32,
}

impl ExternalLinksStrategy {
    pub fn new(cfg: &ExtLinksConfig) -> Self {
        Self {
            karma: Karma::new(cfg.karma),
            max_links: cfg.max_links.max(1),
        }
    }

    /// Links whose host differs from `own_host`.
    pub fn count_external(content: &str, own_host: Option<&str>) -> u32 {
        URL_RE
            .captures_iter(content)
            .filter_map(|c| c.get(1))
            .filter(|host| Some(host.as_str()) != own_host)
            .count() as u32
    }
}

#[async_trait]
impl FilterStrategy for ExternalLinksStrategy {
    fn name(&self) -> &'static str {
        "ExternalLinks"
    }

    fn karma_points(&self) -> i32 {
        self.karma.get()
    }

    fn set_karma_points(&self, points: i32) {
        self.karma.set(points)
    }

    async fn test(&self, input: &StrategyInput) -> anyhow::Result<Option<Verdict>> {
        let n = Self::count_external(&input.content, input.request.header("Host"));
        if n <= self.max_links {
            return Ok(None);
        }
        let points = -(self.karma.magnitude() * n as i32 / self.max_links as i32);
        if points == 0 {
            return Ok(None);
        }
        Ok(Some(Verdict::new(
            points,
            "Maximum number of external links per post exceeded",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::RequestContext;

    fn input(content: &str) -> StrategyInput {
        StrategyInput {
            request: RequestContext::new("POST", "/wiki/Start", "1.2.3.4")
                .with_header("Host", "wiki.example.org"),
            author: "bob".into(),
            content: content.into(),
            ip: "1.2.3.4".into(),
        }
    }

    fn strategy() -> ExternalLinksStrategy {
        ExternalLinksStrategy::new(&ExtLinksConfig {
            enabled: true,
            karma: 2,
            max_links: 4,
        })
    }

    #[test]
    fn own_host_links_are_not_external() {
        let text = "http://wiki.example.org/a https://spam.test/x HTTP://Other.test";
        assert_eq!(ExternalLinksStrategy::count_external(text, Some("wiki.example.org")), 2);
    }

    #[tokio::test]
    async fn at_limit_abstains() {
        let text = (0..4).map(|i| format!("http://s{i}.test/ ")).collect::<String>();
        assert!(strategy().test(&input(&text)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn penalty_scales_with_link_count() {
        let text = (0..10).map(|i| format!("http://s{i}.test/ ")).collect::<String>();
        let v = strategy().test(&input(&text)).await.unwrap().unwrap();
        // 2 * 10 / 4
        assert_eq!(v.points, -5);
    }
}
