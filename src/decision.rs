//! decision.rs: karma verdict, explainability and the rejection signal.
//!
//! A `Decision` is what the engine hands back for every evaluated submission:
//! the summed karma, the reasons that produced it and whether it was rejected.
//! `Rejection` is the user-facing part of a rejecting decision.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One strategy's (or policy's) contribution to the score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReason {
    /// Stable short identifier, e.g. "Regex", "Bayes", "AuthenticatedUser".
    pub strategy: String,
    /// Positive is a reward, negative a penalty.
    pub points: i32,
    pub message: String,
}

impl ScoreReason {
    pub fn new(strategy: impl Into<String>, points: i32, message: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            points,
            message: message.into(),
        }
    }

    /// Persisted form, e.g. `"Regex (-5): Content contained blacklisted patterns"`.
    pub fn formatted(&self) -> String {
        format!("{} ({}): {}", self.strategy, self.points, self.message)
    }
}

/// Result of evaluating one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub score: i32,
    /// Sorted by strategy name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<ScoreReason>,
    pub rejected: bool,
    /// Accepted without consulting the panel (trusted authenticated user).
    #[serde(default)]
    pub trusted: bool,
    /// Audit log id when logging is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_id: Option<i64>,
}

impl Decision {
    /// Accept without scoring.
    pub fn trusted() -> Self {
        Self {
            score: 0,
            reasons: Vec::new(),
            rejected: false,
            trusted: true,
            log_id: None,
        }
    }

    /// Decide against `min_karma`: reject iff `score < min_karma`.
    pub fn scored(score: i32, mut reasons: Vec<ScoreReason>, min_karma: i32) -> Self {
        reasons.sort_by(|a, b| a.strategy.cmp(&b.strategy));
        Self {
            score,
            reasons,
            rejected: score < min_karma,
            trusted: false,
            log_id: None,
        }
    }

    pub fn with_log_id(mut self, id: i64) -> Self {
        self.log_id = Some(id);
        self
    }

    pub fn formatted_reasons(&self) -> Vec<String> {
        self.reasons.iter().map(ScoreReason::formatted).collect()
    }

    /// The user-facing rejection, if this decision rejects.
    pub fn rejection(&self) -> Option<Rejection> {
        if !self.rejected {
            return None;
        }
        let mut reasons: Vec<String> = self
            .reasons
            .iter()
            .filter(|r| r.points < 0)
            .map(|r| r.message.clone())
            .collect();
        reasons.sort();
        Some(Rejection {
            score: self.score,
            reasons,
        })
    }
}

/// "Submission rejected" signal carried to the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub score: i32,
    /// Messages of the penalizing reasons, sorted by text.
    pub reasons: Vec<String>,
}

impl Rejection {
    /// Plain text: a headline and one `- ` list item per reason.
    pub fn message(&self) -> String {
        let mut out = String::from("Submission rejected as potential spam");
        for r in &self.reasons {
            out.push_str("\n- ");
            out.push_str(r);
        }
        out
    }

    /// HTML fragment with one `<li>` per reason, escaped.
    pub fn to_html(&self) -> String {
        let items: String = self
            .reasons
            .iter()
            .map(|r| format!("<li>{}</li>", html_escape::encode_text(r)))
            .collect();
        format!(
            "<div class=\"message\">Submission rejected as potential spam <ul>{}</ul></div>",
            items
        )
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_score_equal_to_threshold_accepts() {
        assert!(!Decision::scored(0, vec![], 0).rejected);
        assert!(Decision::scored(-1, vec![], 0).rejected);
        assert!(!Decision::scored(5, vec![], 5).rejected);
    }

    #[test]
    fn reasons_are_sorted_by_strategy_name() {
        let d = Decision::scored(
            -3,
            vec![
                ScoreReason::new("Regex", -5, "pattern"),
                ScoreReason::new("Akismet", -5, "akismet says spam"),
                ScoreReason::new("AuthenticatedUser", 10, "User is authenticated"),
            ],
            0,
        );
        let names: Vec<_> = d.reasons.iter().map(|r| r.strategy.as_str()).collect();
        assert_eq!(names, vec!["Akismet", "AuthenticatedUser", "Regex"]);
    }

    #[test]
    fn rejection_lists_only_negative_reasons_sorted_by_message() {
        let d = Decision::scored(
            -7,
            vec![
                ScoreReason::new("Regex", -5, "zzz pattern"),
                ScoreReason::new("Bayes", -4, "aaa probability"),
                ScoreReason::new("Attachment", 2, "Attachment weighting"),
            ],
            0,
        );
        let r = d.rejection().expect("rejected");
        assert_eq!(r.reasons, vec!["aaa probability", "zzz pattern"]);
        assert!(r.message().contains("\n- aaa probability\n- zzz pattern"));
    }

    #[test]
    fn html_rendering_escapes_reason_text() {
        let r = Rejection {
            score: -1,
            reasons: vec!["<script>".into()],
        };
        assert!(r.to_html().contains("<li>&lt;script&gt;</li>"));
    }

    #[test]
    fn formatted_reason_matches_log_layout() {
        let r = ScoreReason::new("ExternalLinks", -2, "Maximum number of external links per post exceeded");
        assert_eq!(
            r.formatted(),
            "ExternalLinks (-2): Maximum number of external links per post exceeded"
        );
    }
}
