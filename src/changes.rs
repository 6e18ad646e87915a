//! # Change Extractor
//! Isolates the text an author actually introduced in an edit.
//!
//! Strategies score what is being *added*, never pre-existing text or text
//! being removed.
//!
//! - no prior version (or an empty one): the whole new text counts;
//! - otherwise: a line-level, LCS-based edit script is computed and only the
//!   lines of `insert` and `replace` regions are kept, in new-text order.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Separator placed between the extracted text of two fields.
pub const FIELD_SEPARATOR: &str = "\n\n";

/// Above this many DP cells the middle section is treated as one replace region.
const MAX_LCS_CELLS: usize = 4_000_000;

/// One modified field of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub old: Option<String>,
    pub new: String,
}

impl Change {
    pub fn new(old: Option<impl Into<String>>, new: impl Into<String>) -> Self {
        Self {
            old: old.map(Into::into),
            new: new.into(),
        }
    }

    /// A field with no prior version (comment, new page, author name...).
    pub fn created(new: impl Into<String>) -> Self {
        Self {
            old: None,
            new: new.into(),
        }
    }

    pub fn edited(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: Some(old.into()),
            new: new.into(),
        }
    }
}

/// Returns the attacker-controlled part of `new` given its prior version.
pub fn extract(old: Option<&str>, new: &str) -> String {
    match old {
        Some(old) if !old.is_empty() => added_lines(old, new),
        _ => new.to_string(),
    }
}

/// Builds the canonical content string of a submission.
pub fn combine(changes: &[Change]) -> String {
    changes
        .iter()
        .map(|c| extract(c.old.as_deref(), &c.new))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

fn added_lines(old: &str, new: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let mut regions = Vec::new();
    for op in edit_script(&old_lines, &new_lines) {
        match op {
            EditOp::Insert { new } | EditOp::Replace { new, .. } => {
                regions.push(new_lines[new].join("\n"));
            }
            EditOp::Equal { .. } | EditOp::Delete { .. } => {}
        }
    }
    regions.join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EditOp {
    Equal { old: Range<usize>, new: Range<usize> },
    Delete { old: Range<usize> },
    Insert { new: Range<usize> },
    Replace { old: Range<usize>, new: Range<usize> },
}

/// Minimal edit script turning `a` into `b`, grouped into maximal regions.
fn edit_script(a: &[&str], b: &[&str]) -> Vec<EditOp> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let a_mid = prefix..a.len() - suffix;
    let b_mid = prefix..b.len() - suffix;

    let mut ops = Vec::new();
    if prefix > 0 {
        ops.push(EditOp::Equal {
            old: 0..prefix,
            new: 0..prefix,
        });
    }
    ops.extend(
        middle_script(&a[a_mid.clone()], &b[b_mid.clone()])
            .into_iter()
            .map(|op| shift(op, a_mid.start, b_mid.start)),
    );
    if suffix > 0 {
        ops.push(EditOp::Equal {
            old: a_mid.end..a.len(),
            new: b_mid.end..b.len(),
        });
    }
    ops
}

fn middle_script(a: &[&str], b: &[&str]) -> Vec<EditOp> {
    let (n, m) = (a.len(), b.len());
    if n == 0 && m == 0 {
        return Vec::new();
    }
    if n == 0 {
        return vec![EditOp::Insert { new: 0..m }];
    }
    if m == 0 {
        return vec![EditOp::Delete { old: 0..n }];
    }
    if n.saturating_mul(m) > MAX_LCS_CELLS {
        return vec![EditOp::Replace {
            old: 0..n,
            new: 0..m,
        }];
    }

    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let width = m + 1;
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if a[i] == b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    // start of the pending non-equal run, if any
    let mut run: Option<(usize, usize)> = None;
    let mut eq_start: Option<(usize, usize)> = None;

    while i < n || j < m {
        if i < n && j < m && a[i] == b[j] {
            if let Some((ri, rj)) = run.take() {
                ops.push(region(ri..i, rj..j));
            }
            eq_start.get_or_insert((i, j));
            i += 1;
            j += 1;
            continue;
        }
        if let Some((ei, ej)) = eq_start.take() {
            ops.push(EditOp::Equal {
                old: ei..i,
                new: ej..j,
            });
        }
        run.get_or_insert((i, j));
        if j >= m || (i < n && lcs[(i + 1) * width + j] >= lcs[i * width + j + 1]) {
            i += 1;
        } else {
            j += 1;
        }
    }
    if let Some((ri, rj)) = run {
        ops.push(region(ri..n, rj..m));
    }
    if let Some((ei, ej)) = eq_start {
        ops.push(EditOp::Equal {
            old: ei..n,
            new: ej..m,
        });
    }
    ops
}

fn region(old: Range<usize>, new: Range<usize>) -> EditOp {
    match (old.is_empty(), new.is_empty()) {
        (true, _) => EditOp::Insert { new },
        (_, true) => EditOp::Delete { old },
        _ => EditOp::Replace { old, new },
    }
}

fn shift(op: EditOp, da: usize, db: usize) -> EditOp {
    let mv = |r: Range<usize>, d: usize| r.start + d..r.end + d;
    match op {
        EditOp::Equal { old, new } => EditOp::Equal {
            old: mv(old, da),
            new: mv(new, db),
        },
        EditOp::Delete { old } => EditOp::Delete { old: mv(old, da) },
        EditOp::Insert { new } => EditOp::Insert { new: mv(new, db) },
        EditOp::Replace { old, new } => EditOp::Replace {
            old: mv(old, da),
            new: mv(new, db),
        },
    }
}
