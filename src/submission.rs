//! Submissions and the request value object strategies see.
//!
//! `RequestContext` is a plain value: the host builds it from its live request
//! and replay rebuilds it from a stored audit record.

use serde::{Deserialize, Serialize};

use crate::changes::Change;

/// Identity used when no author is given or the user is not logged in.
pub const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    /// Header name/value pairs in arrival order.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    pub remote_addr: String,
    /// Logged-in identity, if any.
    #[serde(default)]
    pub authname: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>, remote_addr: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Vec::new(),
            remote_addr: remote_addr.into(),
            authname: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_authname(mut self, authname: impl Into<String>) -> Self {
        self.authname = Some(authname.into());
        self
    }

    /// Case-insensitive header lookup (first match).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.authname.as_deref(), Some(name) if !name.is_empty() && name != ANONYMOUS)
    }

    /// Source IP; with `forwarded` set, the first `X-Forwarded-For` hop wins.
    pub fn client_ip(&self, forwarded: bool) -> String {
        if forwarded {
            if let Some(xff) = self.header("X-Forwarded-For") {
                let first = xff.split(',').next().unwrap_or_default().trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
        self.remote_addr.clone()
    }
}

/// One content submission, consumed once by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Submission {
    pub author: String,
    pub request: RequestContext,
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub attachment: bool,
}

impl Submission {
    pub fn new(author: impl Into<String>, request: RequestContext) -> Self {
        Self {
            author: author.into(),
            request,
            changes: Vec::new(),
            attachment: false,
        }
    }

    pub fn with_change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn with_attachment(mut self, attachment: bool) -> Self {
        self.attachment = attachment;
        self
    }

    /// Author with the empty name replaced by the anonymous sentinel.
    pub fn normalized_author(&self) -> String {
        let a = self.author.trim();
        if a.is_empty() {
            ANONYMOUS.to_string()
        } else {
            self.author.clone()
        }
    }
}

/// Formats headers as newline-joined `Title-Case: value` lines.
pub fn format_headers(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}: {}", title_case(k), v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses the stored header string back into name/value pairs.
/// Lines without a colon are skipped.
pub fn parse_headers(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn title_case(name: &str) -> String {
    name.replace('_', "-")
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
