//! Word-level minimum edit distance alignment.
//!
//! Classic O(m·n) dynamic programme with unit costs, then a backtrack from
//! `(m, n)` to `(0, 0)`. When several moves reach a cell at the same cost the
//! backtrack prefers match > substitution > deletion > insertion, so the
//! alignment is deterministic.

use serde::{Deserialize, Serialize};

/// What happened to one aligned position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Match,
    Substitution,
    /// Reference word with no hypothesis counterpart.
    Deletion,
    /// Hypothesis word with no reference counterpart.
    Insertion,
}

/// One step of an alignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignedWord {
    pub kind: EditKind,
    pub reference: Option<String>,
    pub hypothesis: Option<String>,
}

/// Per-category edit totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditCounts {
    pub matches: usize,
    pub substitutions: usize,
    pub deletions: usize,
    pub insertions: usize,
}

impl EditCounts {
    pub fn from_alignment(steps: &[AlignedWord]) -> Self {
        let mut counts = Self::default();
        for step in steps {
            match step.kind {
                EditKind::Match => counts.matches += 1,
                EditKind::Substitution => counts.substitutions += 1,
                EditKind::Deletion => counts.deletions += 1,
                EditKind::Insertion => counts.insertions += 1,
            }
        }
        counts
    }

    pub fn errors(&self) -> usize {
        self.substitutions + self.deletions + self.insertions
    }
}

/// Align two word sequences, returning steps in reading order.
pub fn align<S: AsRef<str>>(reference: &[S], hypothesis: &[S]) -> Vec<AlignedWord> {
    let m = reference.len();
    let n = hypothesis.len();
    let width = n + 1;
    let same = |i: usize, j: usize| reference[i].as_ref() == hypothesis[j].as_ref();

    // dist[i * width + j] = edits turning reference[..i] into hypothesis[..j]
    let mut dist = vec![0usize; (m + 1) * width];
    for i in 0..=m {
        dist[i * width] = i;
    }
    for j in 0..=n {
        dist[j] = j;
    }
    for i in 1..=m {
        for j in 1..=n {
            let diag = dist[(i - 1) * width + j - 1] + usize::from(!same(i - 1, j - 1));
            let del = dist[(i - 1) * width + j] + 1;
            let ins = dist[i * width + j - 1] + 1;
            dist[i * width + j] = diag.min(del).min(ins);
        }
    }

    let mut steps = Vec::with_capacity(m.max(n));
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        let here = dist[i * width + j];
        let step = if i > 0 && j > 0 && same(i - 1, j - 1) && here == dist[(i - 1) * width + j - 1] {
            EditKind::Match
        } else if i > 0 && j > 0 && here == dist[(i - 1) * width + j - 1] + 1 {
            EditKind::Substitution
        } else if i > 0 && here == dist[(i - 1) * width + j] + 1 {
            EditKind::Deletion
        } else {
            EditKind::Insertion
        };

        let (r, h) = match step {
            EditKind::Match | EditKind::Substitution => {
                i -= 1;
                j -= 1;
                (Some(i), Some(j))
            }
            EditKind::Deletion => {
                i -= 1;
                (Some(i), None)
            }
            EditKind::Insertion => {
                j -= 1;
                (None, Some(j))
            }
        };
        steps.push(AlignedWord {
            kind: step,
            reference: r.map(|k| reference[k].as_ref().to_string()),
            hypothesis: h.map(|k| hypothesis[k].as_ref().to_string()),
        });
    }

    steps.reverse();
    steps
}
