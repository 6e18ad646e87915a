// src/strategy/ip_blacklist.rs
//! DNS blacklist (DNSBL) lookup of the submitter's IPv4 address.
//!
//! `1.2.3.4` listed on `bl.example` ⇔ `4.3.2.1.bl.example` resolves.
//! Each listing server costs `|karma|`.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{FilterStrategy, Karma, StrategyInput, Verdict};
use crate::config::IpBlacklistConfig;

pub struct IpBlacklistStrategy {
    karma: Karma,
    servers: Vec<String>,
}

impl IpBlacklistStrategy {
    pub fn new(cfg: &IpBlacklistConfig) -> Self {
        Self {
            karma: Karma::new(cfg.karma),
            servers: cfg
                .servers
                .iter()
                .map(|s| s.trim().trim_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// `d.c.b.a.<server>` for an IPv4 address, `None` for anything else.
pub fn query_name(ip: &str, server: &str) -> Option<String> {
    let addr: Ipv4Addr = ip.trim().parse().ok()?;
    let [a, b, c, d] = addr.octets();
    Some(format!("{d}.{c}.{b}.{a}.{server}"))
}

#[async_trait]
impl FilterStrategy for IpBlacklistStrategy {
    fn name(&self) -> &'static str {
        "IpBlacklist"
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
        if self.servers.is_empty() {
            warn!(target: "strategy", "no IP blacklist servers configured");
            return Ok(None);
        }

        let mut points = 0;
        let mut listed = Vec::new();
        for server in &self.servers {
            let Some(name) = query_name(&input.ip, server) else {
                debug!(target: "strategy", ip = %input.ip, "not an IPv4 address, blacklist check skipped");
                return Ok(None);
            };
            // NXDOMAIN and resolver failures look the same here: not listed
            let listed_here = tokio::net::lookup_host((name.as_str(), 0))
                .await
                .map(|mut addrs| addrs.next().is_some());
            match listed_here {
                Ok(true) => {
                    points -= self.karma.magnitude();
                    listed.push(server.as_str());
                }
                Ok(false) => {}
                Err(e) => debug!(target: "strategy", server = %server, error = %e, "not listed"),
            }
        }

        if points == 0 {
            return Ok(None);
        }
        Ok(Some(Verdict::new(
            points,
            format!("IP {} blacklisted by {}", input.ip, listed.join(", ")),
        )))
    }
}
