// src/storage/bayes.rs
//! Word-frequency table of the statistical classifier.
//!
//! Each row counts in how many spam/ham training messages a token occurred.
//! The reserved `STATE_KEY` row holds the number of training messages.

use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::Database;
use crate::classifier;
use crate::error::Result;

/// Row holding the training totals instead of a word.
pub const STATE_KEY: &str = "saved state";

/// Spam/ham counters of one token (or the totals).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub nspam: u64,
    pub nham: u64,
}

#[derive(Clone)]
pub struct ClassifierStore {
    db: Database,
}

impl ClassifierStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Number of spam and ham training events.
    pub fn totals(&self) -> Result<Counts> {
        let row = self.db.with_conn(|c| {
            c.query_row(
                "SELECT nspam, nham FROM spamfilter_bayes WHERE word = ?1",
                params![STATE_KEY],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)),
            )
            .optional()
        })?;
        Ok(row.map(to_counts).unwrap_or_default())
    }

    /// Spam probability of `content` against the current table.
    pub fn probability(&self, content: &str) -> Result<f64> {
        let tokens = classifier::tokenize(content);
        let counts = self.word_counts(&tokens)?;
        Ok(classifier::spam_probability(&tokens, &counts, self.totals()?))
    }

    /// Counters of the given tokens; unseen tokens are absent from the map.
    pub fn word_counts<'a, I>(&self, tokens: I) -> Result<HashMap<String, Counts>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.db.with_conn(|c| {
            let mut stmt =
                c.prepare_cached("SELECT nspam, nham FROM spamfilter_bayes WHERE word = ?1")?;
            let mut out = HashMap::new();
            for token in tokens {
                if token == STATE_KEY {
                    continue;
                }
                let row = stmt
                    .query_row(params![token], |r| {
                        Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?))
                    })
                    .optional()?;
                if let Some(row) = row {
                    out.insert(token.clone(), to_counts(row));
                }
            }
            Ok(out)
        })
    }

    /// Records one training message: every token and the totals are
    /// incremented in a single transaction.
    pub fn train<'a, I>(&self, tokens: I, is_spam: bool) -> Result<()>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let (ds, dh) = if is_spam { (1i64, 0i64) } else { (0, 1) };
        self.db.with_conn_mut(|c| {
            let tx = c.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO spamfilter_bayes (word, nspam, nham) VALUES (?1, ?2, ?3)
                     ON CONFLICT(word) DO UPDATE SET
                        nspam = nspam + excluded.nspam,
                        nham = nham + excluded.nham",
                )?;
                for token in tokens {
                    if token == STATE_KEY {
                        continue;
                    }
                    stmt.execute(params![token, ds, dh])?;
                }
                stmt.execute(params![STATE_KEY, ds, dh])?;
            }
            tx.commit()
        })
    }

    /// Number of distinct tokens (state row excluded).
    pub fn word_count(&self) -> Result<u64> {
        self.db
            .with_conn(|c| {
                c.query_row(
                    "SELECT COUNT(*) FROM spamfilter_bayes WHERE word <> ?1",
                    params![STATE_KEY],
                    |r| r.get::<_, i64>(0),
                )
            })
            .map(|n| n.max(0) as u64)
    }

    /// Forgets all training.
    pub fn reset(&self) -> Result<()> {
        self.db
            .with_conn(|c| c.execute("DELETE FROM spamfilter_bayes", []))?;
        Ok(())
    }
}

fn to_counts((nspam, nham): (i64, i64)) -> Counts {
    Counts {
        nspam: nspam.max(0) as u64,
        nham: nham.max(0) as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn empty_store_has_zero_totals() {
        let store = Database::open_in_memory().unwrap().classifier();
        assert_eq!(store.totals().unwrap(), Counts::default());
        assert!(store.word_counts(&toks(&["viagra"])).unwrap().is_empty());
    }

    #[test]
    fn training_increments_words_and_totals() {
        let store = Database::open_in_memory().unwrap().classifier();
        store.train(&toks(&["cheap", "pills"]), true).unwrap();
        store.train(&toks(&["cheap", "meeting"]), false).unwrap();
        store.train(&toks(&["cheap"]), true).unwrap();

        assert_eq!(store.totals().unwrap(), Counts { nspam: 2, nham: 1 });
        let counts = store.word_counts(&toks(&["cheap", "pills", "meeting", "nope"])).unwrap();
        assert_eq!(counts["cheap"], Counts { nspam: 2, nham: 1 });
        assert_eq!(counts["pills"], Counts { nspam: 1, nham: 0 });
        assert_eq!(counts["meeting"], Counts { nspam: 0, nham: 1 });
        assert!(!counts.contains_key("nope"));
        assert_eq!(store.word_count().unwrap(), 3);
    }

    #[test]
    fn probability_follows_training() {
        let store = Database::open_in_memory().unwrap().classifier();
        assert_eq!(store.probability("cheap pills").unwrap(), 0.5);
        store.train(&classifier::tokenize("cheap pills casino"), true).unwrap();
        store.train(&classifier::tokenize("sprint review notes"), false).unwrap();
        assert!(store.probability("cheap casino").unwrap() > 0.9);
        assert!(store.probability("review notes").unwrap() < 0.1);
    }

    #[test]
    fn reset_clears_everything() {
        let store = Database::open_in_memory().unwrap().classifier();
        store.train(&toks(&["cheap"]), true).unwrap();
        store.reset().unwrap();
        assert_eq!(store.totals().unwrap(), Counts::default());
        assert_eq!(store.word_count().unwrap(), 0);
    }

    #[test]
    fn concurrent_training_loses_no_updates() {
        let store = Database::open_in_memory().unwrap().classifier();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        s.train(&toks(&["shared"]), i % 2 == 0).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.totals().unwrap(), Counts { nspam: 40, nham: 40 });
        let counts = store.word_counts(&toks(&["shared"])).unwrap();
        assert_eq!(counts["shared"], Counts { nspam: 40, nham: 40 });
    }
}
