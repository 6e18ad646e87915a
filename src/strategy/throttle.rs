// src/strategy/throttle.rs
//! Per-IP submission rate, read from the audit log.

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{FilterStrategy, Karma, StrategyInput, Verdict};
use crate::config::ThrottleConfig;
use crate::storage::AuditLog;

/// One year.
const MAX_WINDOW_SECS: u64 = 366 * 24 * 3600;

pub struct IpThrottleStrategy {
    karma: Karma,
    max_posts: u32,
    window: Duration,
    log: AuditLog,
}

impl IpThrottleStrategy {
    pub fn new(cfg: &ThrottleConfig, log: AuditLog) -> Self {
        Self {
            karma: Karma::new(cfg.karma),
            max_posts: cfg.max_posts,
            window: Duration::seconds(cfg.window_secs.clamp(1, MAX_WINDOW_SECS) as i64),
            log,
        }
    }
}

#[async_trait]
impl FilterStrategy for IpThrottleStrategy {
    fn name(&self) -> &'static str {
        "IpThrottle"
    }

    fn karma_points(&self) -> i32 {
        self.karma.get()
    }

    fn set_karma_points(&self, points: i32) {
        self.karma.set(points)
    }

    async fn test(&self, input: &StrategyInput) -> anyhow::Result<Option<Verdict>> {
        if input.ip.is_empty() {
            return Ok(None);
        }
        let log = self.log.clone();
        let ip = input.ip.clone();
        let since = Utc::now() - self.window;
        let n = tokio::task::spawn_blocking(move || log.count_from_ip_since(&ip, since)).await??;
        if n <= u64::from(self.max_posts) {
            return Ok(None);
        }
        Ok(Some(Verdict::new(
            -self.karma.magnitude(),
            format!("Too many recent submissions from this IP ({n})"),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, LogEntry};
    use crate::submission::RequestContext;

    fn logged(log: &AuditLog, ip: &str) {
        log.insert(&mut LogEntry {
            id: None,
            time: Utc::now(),
            path: "/".into(),
            author: "x".into(),
            authenticated: false,
            ip: ip.into(),
            headers: String::new(),
            content: String::new(),
            rejected: false,
            karma: 0,
            reasons: vec![],
        })
        .unwrap();
    }

    #[tokio::test]
    async fn penalizes_only_above_max_posts() {
        let db = Database::open_in_memory().unwrap();
        let s = IpThrottleStrategy::new(
            &ThrottleConfig {
                enabled: true,
                karma: 3,
                max_posts: 2,
                window_secs: 3600,
            },
            db.audit_log(),
        );
        let input = StrategyInput {
            request: RequestContext::default(),
            author: "x".into(),
            content: "hi".into(),
            ip: "5.5.5.5".into(),
        };
        logged(&db.audit_log(), "5.5.5.5");
        logged(&db.audit_log(), "5.5.5.5");
        logged(&db.audit_log(), "6.6.6.6");
        assert!(s.test(&input).await.unwrap().is_none());

        logged(&db.audit_log(), "5.5.5.5");
        let v = s.test(&input).await.unwrap().unwrap();
        assert_eq!(v.points, -3);
        assert!(v.message.contains("(3)"));
    }
}
