// src/classifier.rs
//! Statistical spam classifier (pure part).
//!
//! - `tokenize`: content → deduplicated token set
//! - `word_probability`: Robinson's smoothed per-token spam probability
//! - `spam_probability`: chi-square (Fisher) combination of the strongest clues
//!
//! Counts live in `storage::bayes::ClassifierStore`; nothing here does I/O.

use std::collections::{BTreeSet, HashMap};

use crate::storage::bayes::Counts;

/// Strength of the prior (Robinson's `s`).
pub const UNKNOWN_WORD_STRENGTH: f64 = 0.45;
/// Probability assumed for a token never seen in training (Robinson's `x`).
pub const UNKNOWN_WORD_PROB: f64 = 0.5;
/// Tokens closer than this to 0.5 are not used as clues.
pub const MINIMUM_PROB_STRENGTH: f64 = 0.1;
pub const MAX_DISCRIMINATORS: usize = 150;

const MIN_WORD_LEN: usize = 3;
const MAX_WORD_LEN: usize = 12;

/// Lower-cased words of 3..=12 chars, `skip:` markers for longer runs and
/// `url:` tokens for the host parts of links.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for raw in text.split_whitespace() {
        let lower = raw.to_lowercase();
        if let Some(rest) = lower
            .strip_prefix("http://")
            .or_else(|| lower.strip_prefix("https://"))
        {
            let scheme = if lower.starts_with("https") { "https" } else { "http" };
            out.insert(format!("proto:{scheme}"));
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            let host = host.rsplit('@').next().unwrap_or_default();
            let host = host.split(':').next().unwrap_or_default();
            for part in host.split('.').filter(|p| !p.is_empty()) {
                out.insert(format!("url:{part}"));
            }
            continue;
        }

        let word = lower.trim_matches(|c: char| !c.is_alphanumeric());
        let len = word.chars().count();
        if len < MIN_WORD_LEN {
            continue;
        }
        if len > MAX_WORD_LEN {
            if let Some(first) = word.chars().next() {
                out.insert(format!("skip:{first} {}", len / 10 * 10));
            }
            continue;
        }
        out.insert(word.to_string());
    }
    out
}

/// Smoothed spam probability of one token.
pub fn word_probability(word: Counts, totals: Counts) -> f64 {
    let nspam = totals.nspam.max(1) as f64;
    let nham = totals.nham.max(1) as f64;
    let spam_ratio = word.nspam as f64 / nspam;
    let ham_ratio = word.nham as f64 / nham;

    let raw = if spam_ratio + ham_ratio == 0.0 {
        UNKNOWN_WORD_PROB
    } else {
        spam_ratio / (spam_ratio + ham_ratio)
    };
    let n = (word.nspam + word.nham) as f64;
    (UNKNOWN_WORD_STRENGTH * UNKNOWN_WORD_PROB + n * raw) / (UNKNOWN_WORD_STRENGTH + n)
}

/// Combined spam probability of a token set, in [0, 1]. No clues ⇒ 0.5.
pub fn spam_probability(
    tokens: &BTreeSet<String>,
    counts: &HashMap<String, Counts>,
    totals: Counts,
) -> f64 {
    let mut clues: Vec<(f64, &str)> = tokens
        .iter()
        .map(|t| {
            let p = counts
                .get(t)
                .map(|c| word_probability(*c, totals))
                .unwrap_or(UNKNOWN_WORD_PROB);
            (p, t.as_str())
        })
        .filter(|(p, _)| (p - 0.5).abs() >= MINIMUM_PROB_STRENGTH)
        .collect();
    if clues.is_empty() {
        return 0.5;
    }

    clues.sort_by(|a, b| {
        let sa = (a.0 - 0.5).abs();
        let sb = (b.0 - 0.5).abs();
        sb.total_cmp(&sa).then_with(|| a.1.cmp(b.1))
    });
    clues.truncate(MAX_DISCRIMINATORS);

    // log space; clue probabilities are strictly inside (0, 1)
    let (mut ln_s, mut ln_h) = (0.0f64, 0.0f64);
    for (p, _) in &clues {
        ln_s += (1.0 - p).ln();
        ln_h += p.ln();
    }
    let n = clues.len();
    let s = 1.0 - chi2q(-2.0 * ln_s, 2 * n);
    let h = 1.0 - chi2q(-2.0 * ln_h, 2 * n);
    ((s - h + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Survival function of the chi-square distribution with even `dof`.
pub fn chi2q(x2: f64, dof: usize) -> f64 {
    debug_assert!(dof % 2 == 0);
    let m = x2 / 2.0;
    let mut term = (-m).exp();
    let mut sum = term;
    for i in 1..dof / 2 {
        term *= m / i as f64;
        sum += term;
    }
    sum.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn tokenizer_lowercases_dedups_and_bounds_length() {
        let toks = tokenize("Buy BUY buy, ok cheap! Supercalifragilistic");
        assert_eq!(toks, set(&["buy", "cheap", "skip:s 20"]));
    }

    #[test]
    fn tokenizer_emits_url_parts() {
        let toks = tokenize("see https://pills.example.com/buy?x=1");
        assert!(toks.contains("proto:https"));
        assert!(toks.contains("url:pills"));
        assert!(toks.contains("url:example"));
        assert!(toks.contains("url:com"));
        assert!(toks.contains("see"));
    }

    #[test]
    fn no_clues_is_neutral() {
        let p = spam_probability(&set(&["unknown"]), &HashMap::new(), Counts { nspam: 30, nham: 30 });
        assert_eq!(p, 0.5);
    }

    #[test]
    fn spammy_and_hammy_tokens_pull_in_the_right_direction() {
        let totals = Counts { nspam: 30, nham: 30 };
        let mut counts = HashMap::new();
        counts.insert("viagra".to_string(), Counts { nspam: 30, nham: 0 });
        counts.insert("casino".to_string(), Counts { nspam: 25, nham: 1 });
        counts.insert("meeting".to_string(), Counts { nspam: 0, nham: 30 });
        counts.insert("agenda".to_string(), Counts { nspam: 1, nham: 28 });

        let spam = spam_probability(&set(&["viagra", "casino"]), &counts, totals);
        let ham = spam_probability(&set(&["meeting", "agenda"]), &counts, totals);
        assert!(spam > 0.9, "spam={spam}");
        assert!(ham < 0.1, "ham={ham}");
    }

    #[test]
    fn unseen_word_probability_is_prior() {
        let p = word_probability(Counts::default(), Counts { nspam: 5, nham: 5 });
        assert!((p - UNKNOWN_WORD_PROB).abs() < 1e-12);
    }

    #[test]
    fn chi2q_matches_known_values() {
        assert!((chi2q(0.0, 2) - 1.0).abs() < 1e-12);
        // dof=2 ⇒ exp(-x/2)
        assert!((chi2q(4.0, 2) - (-2.0f64).exp()).abs() < 1e-12);
    }
}
