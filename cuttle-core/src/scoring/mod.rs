//! Word error rate scoring.
//!
//! Both texts go through [`normalize_words`] (lowercase, letters/digits/
//! whitespace only, split on whitespace) before they are aligned, so
//! punctuation and casing never count as errors.
//!
//! Corpus-level WER pools counts across samples and recomputes the rate from
//! the totals; longer references therefore weigh more than short ones.

pub mod alignment;

pub use alignment::{align, AlignedWord, EditCounts, EditKind};

use serde::{Deserialize, Serialize};

/// Outcome of scoring a hypothesis against a reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentResult {
    /// `(S + D + I) / N`. Not clamped: exceeds 1 when insertions dominate.
    pub error_rate: f64,
    /// `1 - error_rate`, clamped to [0, 1].
    pub accuracy: f64,
    pub substitutions: usize,
    pub deletions: usize,
    pub insertions: usize,
    pub reference_word_count: usize,
    pub hypothesis_word_count: usize,
}

impl AlignmentResult {
    /// Build a result from raw counts.
    ///
    /// An empty reference scores 1.0 when the hypothesis has any words and
    /// 0.0 otherwise.
    pub fn from_counts(
        substitutions: usize,
        deletions: usize,
        insertions: usize,
        reference_word_count: usize,
        hypothesis_word_count: usize,
    ) -> Self {
        let errors = substitutions + deletions + insertions;
        let error_rate = if reference_word_count == 0 {
            if hypothesis_word_count > 0 {
                1.0
            } else {
                0.0
            }
        } else {
            errors as f64 / reference_word_count as f64
        };
        Self {
            error_rate,
            accuracy: (1.0 - error_rate).clamp(0.0, 1.0),
            substitutions,
            deletions,
            insertions,
            reference_word_count,
            hypothesis_word_count,
        }
    }

    pub fn total_errors(&self) -> usize {
        self.substitutions + self.deletions + self.insertions
    }

    /// Pool two results (sum counts, recompute the rate).
    pub fn merge(&self, other: &AlignmentResult) -> AlignmentResult {
        Self::from_counts(
            self.substitutions + other.substitutions,
            self.deletions + other.deletions,
            self.insertions + other.insertions,
            self.reference_word_count + other.reference_word_count,
            self.hypothesis_word_count + other.hypothesis_word_count,
        )
    }
}

/// Lowercase, strip everything but letters, digits and whitespace, split.
pub fn normalize_words(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Score `hypothesis` against `reference`.
pub fn calculate_wer(reference: &str, hypothesis: &str) -> AlignmentResult {
    let ref_words = normalize_words(reference);
    let hyp_words = normalize_words(hypothesis);

    let counts = EditCounts::from_alignment(&align(&ref_words, &hyp_words));
    AlignmentResult::from_counts(
        counts.substitutions,
        counts.deletions,
        counts.insertions,
        ref_words.len(),
        hyp_words.len(),
    )
}

/// Corpus WER over `(reference, hypothesis)` pairs, pooled rather than
/// averaged.
pub fn aggregate_wer<I, R, H>(pairs: I) -> AlignmentResult
where
    I: IntoIterator<Item = (R, H)>,
    R: AsRef<str>,
    H: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|(r, h)| calculate_wer(r.as_ref(), h.as_ref()))
        .fold(AlignmentResult::from_counts(0, 0, 0, 0, 0), |acc, r| {
            acc.merge(&r)
        })
}

/// Word-by-word alignment after normalisation, for reports and debugging.
pub fn render_alignment(reference: &str, hypothesis: &str) -> Vec<AlignedWord> {
    align(&normalize_words(reference), &normalize_words(hypothesis))
}
