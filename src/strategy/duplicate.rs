// src/strategy/duplicate.rs
//! Near-duplicate resubmission filter (sliding window).
//!
//! Spam runs tend to post the same text over and over with small variations.
//! Every accepted-or-not content is remembered for `time_window_secs`; a new
//! submission whose normalized Levenshtein similarity to any remembered one is
//! `>= similarity_threshold` is penalized.
//!
//! - window holds at most `window_size` items, oldest evicted first
//! - training as ham forgets matching items, training as spam remembers

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{FilterStrategy, Karma, StrategyInput, Verdict};
use crate::config::DuplicateConfig;

/// Only this many leading characters of a normalized text are compared.
pub const MAX_COMPARE_CHARS: usize = 512;

/// Normalized, truncated text with its length in chars.
#[derive(Clone, Debug)]
struct Sample {
    text: Arc<str>,
    chars: usize,
}

impl Sample {
    fn new(raw: &str) -> Self {
        let text: String = normalize(raw).chars().take(MAX_COMPARE_CHARS).collect();
        Self {
            chars: text.chars().count(),
            text: text.into(),
        }
    }

    /// Normalized Levenshtein similarity `>= threshold`.
    ///
    /// The edit distance is at least the length difference, so similarity is
    /// bounded by `shorter / longer`; pairs below the threshold skip the DP.
    fn similar_to(&self, other: &Sample, threshold: f64) -> bool {
        let (lo, hi) = if self.chars <= other.chars {
            (self.chars, other.chars)
        } else {
            (other.chars, self.chars)
        };
        if hi == 0 {
            return true;
        }
        if (lo as f64) / (hi as f64) < threshold {
            return false;
        }
        strsim::normalized_levenshtein(&self.text, &other.text) >= threshold
    }
}

#[derive(Clone, Debug)]
struct SeenItem {
    ts: SystemTime,
    sample: Sample,
}

#[derive(Debug)]
struct Window {
    window_size: usize,
    similarity_threshold: f64,
    horizon: Duration,
    items: VecDeque<SeenItem>,
}

impl Window {
    fn evict_old(&mut self, now: SystemTime) {
        while let Some(front) = self.items.front() {
            if now.duration_since(front.ts).unwrap_or(Duration::ZERO) > self.horizon {
                self.items.pop_front();
            } else {
                break;
            }
        }
    }

    fn remember(&mut self, ts: SystemTime, sample: Sample) {
        if self.items.len() == self.window_size {
            self.items.pop_front();
        }
        self.items.push_back(SeenItem { ts, sample });
    }
}

/// Near-duplicate check against a snapshot; the lock is not held while comparing.
fn check_window(window: &Mutex<Window>, ts: SystemTime, text: &str) -> bool {
    let sample = Sample::new(text);
    let (threshold, snapshot) = {
        let mut w = window.lock();
        w.evict_old(ts);
        let snapshot: Vec<Sample> = w.items.iter().rev().map(|i| i.sample.clone()).collect();
        (w.similarity_threshold, snapshot)
    };
    if snapshot.iter().any(|seen| sample.similar_to(seen, threshold)) {
        return true;
    }
    window.lock().remember(ts, sample);
    false
}

fn forget_similar(window: &Mutex<Window>, text: &str) {
    let sample = Sample::new(text);
    let (threshold, snapshot) = {
        let w = window.lock();
        let snapshot: Vec<Sample> = w.items.iter().map(|i| i.sample.clone()).collect();
        (w.similarity_threshold, snapshot)
    };
    let doomed: Vec<Arc<str>> = snapshot
        .into_iter()
        .filter(|seen| sample.similar_to(seen, threshold))
        .map(|seen| seen.text)
        .collect();
    if doomed.is_empty() {
        return;
    }
    window
        .lock()
        .items
        .retain(|item| !doomed.iter().any(|d| Arc::ptr_eq(d, &item.sample.text)));
}

pub struct DuplicateStrategy {
    karma: Karma,
    window: Arc<Mutex<Window>>,
}

impl DuplicateStrategy {
    pub fn new(cfg: &DuplicateConfig) -> Self {
        let window_size = cfg.window_size.max(1);
        Self {
            karma: Karma::new(cfg.karma),
            window: Arc::new(Mutex::new(Window {
                window_size,
                similarity_threshold: f64::from(cfg.similarity_threshold.clamp(0.0, 1.0)),
                horizon: Duration::from_secs(cfg.time_window_secs.max(1)),
                items: VecDeque::with_capacity(window_size),
            })),
        }
    }

    /// Returns `true` for a near-duplicate; otherwise remembers `text`.
    pub fn check_at(&self, ts: SystemTime, text: &str) -> bool {
        check_window(&self.window, ts, text)
    }

    /// Drops every remembered item similar to `text`.
    pub fn forget(&self, text: &str) {
        forget_similar(&self.window, text)
    }

    pub fn clear(&self) {
        self.window.lock().items.clear();
    }

    pub fn len(&self) -> usize {
        self.window.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FilterStrategy for DuplicateStrategy {
    fn name(&self) -> &'static str {
        "Duplicate"
    }

    fn karma_points(&self) -> i32 {
        self.karma.get()
    }

    fn set_karma_points(&self, points: i32) {
        self.karma.set(points)
    }

    async fn test(&self, input: &StrategyInput) -> anyhow::Result<Option<Verdict>> {
        if input.content.trim().is_empty() {
            return Ok(None);
        }
        let window = self.window.clone();
        let content = input.content.clone();
        // the pairwise scan is CPU-bound; keep it off the async workers
        let duplicate =
            tokio::task::spawn_blocking(move || check_window(&window, SystemTime::now(), &content)).await?;
        if !duplicate {
            return Ok(None);
        }
        Ok(Some(Verdict::new(
            -self.karma.magnitude(),
            "Content is a near-duplicate of a recent submission",
        )))
    }

    async fn train(&self, input: &StrategyInput, is_spam: bool) -> anyhow::Result<()> {
        let window = self.window.clone();
        let content = input.content.clone();
        tokio::task::spawn_blocking(move || {
            if is_spam {
                let _ = check_window(&window, SystemTime::now(), &content);
            } else {
                forget_similar(&window, &content);
            }
        })
        .await?;
        Ok(())
    }
}

/// Lowercase and collapse whitespace runs.
fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.chars() {
        let lc = ch.to_ascii_lowercase();
        if lc.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(lc);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn ts(sec: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + sec)
    }

    fn strategy(window_size: usize) -> DuplicateStrategy {
        DuplicateStrategy::new(&DuplicateConfig {
            enabled: true,
            karma: 3,
            window_size,
            similarity_threshold: 0.9,
            time_window_secs: 600,
        })
    }

    #[test]
    fn near_duplicate_within_window_is_flagged() {
        let s = strategy(16);
        assert!(!s.check_at(ts(0), "Cheap watches at www.example.test today"));
        assert!(s.check_at(ts(10), "cheap   WATCHES at www.example.test today!"));
        assert!(!s.check_at(ts(20), "Meeting notes for the sprint review"));
    }

    #[test]
    fn old_items_fall_out_of_the_time_window() {
        let s = strategy(16);
        assert!(!s.check_at(ts(0), "same text every time"));
        assert!(!s.check_at(ts(601), "same text every time"));
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let s = strategy(1);
        assert!(!s.check_at(ts(0), "first message text"));
        assert!(!s.check_at(ts(1), "completely different words"));
        assert!(!s.check_at(ts(2), "first message text"));
    }

    #[test]
    fn length_ratio_prefilter_matches_full_comparison() {
        let short = Sample::new("abcdefghij");
        let long = Sample::new("abcdefghijklmnopqrst");
        assert!(!short.similar_to(&long, 0.9));
        assert!(short.similar_to(&long, 0.5));
        assert!(Sample::new("").similar_to(&Sample::new("  "), 0.9));
    }

    #[test]
    fn comparison_is_capped_to_leading_chars() {
        let sample = Sample::new(&"x".repeat(MAX_COMPARE_CHARS * 6));
        assert_eq!(sample.chars, MAX_COMPARE_CHARS);
    }

    #[test]
    fn large_distinct_submissions_are_compared_on_a_prefix() {
        let s = strategy(128);
        let started = std::time::Instant::now();
        for i in 0..16u64 {
            let text: String = (0..6_000u64)
                .map(|j| char::from(b'a' + ((i * 7 + j * (i + 3)) % 26) as u8))
                .collect();
            assert!(!s.check_at(ts(i), &text));
        }
        assert_eq!(s.len(), 16);
        assert!(started.elapsed() < Duration::from_secs(30));

        let head = "same opening paragraph ".repeat(40);
        assert!(!s.check_at(ts(20), &format!("{head} and one ending")));
        assert!(s.check_at(ts(21), &format!("{head} and a completely different ending")));
    }

    #[tokio::test]
    async fn ham_training_forgets_through_the_trait() {
        let s = strategy(16);
        let input = StrategyInput {
            request: crate::submission::RequestContext::default(),
            author: "x".into(),
            content: "buy watches here".into(),
            ip: "1.2.3.4".into(),
        };
        assert!(s.test(&input).await.unwrap().is_none());
        assert!(s.test(&input).await.unwrap().is_some());
        s.train(&input, false).await.unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn training_as_ham_forgets() {
        let s = strategy(16);
        assert!(!s.check_at(ts(0), "weekly status update"));
        s.forget("Weekly status update");
        assert!(!s.check_at(ts(1), "weekly status update"));
    }
}
