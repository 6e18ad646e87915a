// src/strategy/regex.rs
//! Blacklisted content patterns (hot-reloaded from `config/bad_content.txt`).
//!
//! File format, one regular expression per line:
//! - blank lines and lines starting with `#` are ignored
//! - if the file contains a `{{{ ... }}}` block, only the block is read
//! - lines that fail to compile are logged and skipped
//!
//! The file is re-read on mtime change at each `test()` call.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use ::regex::Regex;
use tracing::{debug, info, warn};

use super::{FilterStrategy, Karma, StrategyInput, Verdict};
use crate::config::RegexConfig;

pub struct RegexStrategy {
    karma: Karma,
    path: Option<PathBuf>,
    inner: RwLock<State>,
}

struct State {
    patterns: Arc<Vec<Regex>>,
    last_modified: Option<SystemTime>,
}

impl RegexStrategy {
    pub fn new(cfg: &RegexConfig) -> Self {
        Self {
            karma: Karma::new(cfg.karma),
            path: Some(cfg.patterns_path.clone()),
            inner: RwLock::new(State {
                patterns: Arc::new(Vec::new()),
                last_modified: None,
            }),
        }
    }

    /// Fixed pattern list, no file behind it.
    pub fn from_patterns(karma: i32, patterns: &[&str]) -> Self {
        Self {
            karma: Karma::new(karma),
            path: None,
            inner: RwLock::new(State {
                patterns: Arc::new(compile(patterns.iter().copied())),
                last_modified: None,
            }),
        }
    }

    /// Current pattern set, reloading the file first if it changed.
    pub fn patterns(&self) -> Arc<Vec<Regex>> {
        let Some(path) = self.path.as_deref() else {
            return self.inner.read().patterns.clone();
        };
        let mtime = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(_) => return self.inner.read().patterns.clone(),
        };
        if self.inner.read().last_modified == Some(mtime) {
            return self.inner.read().patterns.clone();
        }

        let mut guard = self.inner.write();
        if guard.last_modified != Some(mtime) {
            match load_patterns_file(path) {
                Ok(patterns) => {
                    info!(target: "strategy", path = %path.display(), count = patterns.len(), "blacklist patterns loaded");
                    guard.patterns = Arc::new(patterns);
                    guard.last_modified = Some(mtime);
                }
                Err(e) => warn!(target: "strategy", path = %path.display(), error = %e, "blacklist patterns unreadable"),
            }
        }
        guard.patterns.clone()
    }
}

pub fn load_patterns_file(path: &Path) -> std::io::Result<Vec<Regex>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_patterns(&text))
}

/// Parses the pattern file format described in the module docs.
pub fn parse_patterns(text: &str) -> Vec<Regex> {
    let body = match (text.find("{{{"), text.rfind("}}}")) {
        (Some(start), Some(end)) if start + 3 <= end => &text[start + 3..end],
        _ => text,
    };
    compile(body.lines())
}

fn compile<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<Regex> {
    lines
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| match Regex::new(l) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(target: "strategy", pattern = l, error = %e, "invalid blacklist pattern skipped");
                None
            }
        })
        .collect()
}

#[async_trait]
impl FilterStrategy for RegexStrategy {
    fn name(&self) -> &'static str {
        "Regex"
    }

    fn karma_points(&self) -> i32 {
        self.karma.get()
    }

    fn set_karma_points(&self, points: i32) {
        self.karma.set(points)
    }

    async fn test(&self, input: &StrategyInput) -> anyhow::Result<Option<Verdict>> {
        let mut points = 0;
        for pattern in self.patterns().iter() {
            if pattern.is_match(&input.content) {
                debug!(target: "strategy", pattern = pattern.as_str(), "blacklisted pattern found");
                points -= self.karma.magnitude();
            }
        }
        if points == 0 {
            return Ok(None);
        }
        Ok(Some(Verdict::new(points, "Content contained blacklisted patterns")))
    }
}
