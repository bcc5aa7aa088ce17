//! Per-query retrieval quality metrics.
//!
//! Every metric is computed over `retrieved[..top_k]`, never the full list,
//! and every division substitutes 0 for a zero denominator. A chunk id
//! repeated in `retrieved` keeps its position but only its first occurrence
//! can count as a hit.

use rankfuse_core::error::EvalError;
use rankfuse_core::types::{MetricSet, RelevanceJudgment};
use std::collections::HashSet;

/// Scores a ranked list of chunk ids against a relevance judgment.
pub struct RetrievalMetrics;

impl RetrievalMetrics {
    /// All seven metrics for one query.
    ///
    /// Fails with `InvalidConfiguration` for `top_k == 0` and with
    /// `MalformedInput` when the judgment does not validate.
    pub fn evaluate<S: AsRef<str>>(
        retrieved: &[S],
        relevant: &RelevanceJudgment,
        top_k: usize,
    ) -> Result<MetricSet, EvalError> {
        if top_k == 0 {
            return Err(EvalError::invalid_config("top_k", "must be >= 1"));
        }
        relevant.validate()?;

        let precision = precision(retrieved, relevant, top_k);
        let recall = recall(retrieved, relevant, top_k);
        Ok(MetricSet {
            precision,
            recall,
            f1: harmonic_mean(precision, recall),
            mrr: reciprocal_rank(retrieved, relevant, top_k),
            map: average_precision(retrieved, relevant, top_k),
            ndcg: ndcg(retrieved, relevant, top_k),
            hit_rate: hit_rate(retrieved, relevant, top_k),
        })
    }
}

/// Gain per position of the truncated view: the judgment's grade for the first
/// occurrence of an id, 0 for repeats.
fn positional_gains<S: AsRef<str>>(
    retrieved: &[S],
    relevant: &RelevanceJudgment,
    top_k: usize,
) -> Vec<f64> {
    let view = &retrieved[..retrieved.len().min(top_k)];
    let mut seen = HashSet::with_capacity(view.len());
    view.iter()
        .map(|id| {
            let id = id.as_ref();
            if seen.insert(id) {
                relevant.grade(id)
            } else {
                0.0
            }
        })
        .collect()
}

/// Binary hit flags per position (gain > 0).
fn positional_hits<S: AsRef<str>>(
    retrieved: &[S],
    relevant: &RelevanceJudgment,
    top_k: usize,
) -> Vec<bool> {
    positional_gains(retrieved, relevant, top_k)
        .into_iter()
        .map(|gain| gain > 0.0)
        .collect()
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn harmonic_mean(precision: f64, recall: f64) -> f64 {
    ratio(2.0 * precision * recall, precision + recall)
}

pub fn precision<S: AsRef<str>>(retrieved: &[S], relevant: &RelevanceJudgment, top_k: usize) -> f64 {
    let hits = positional_hits(retrieved, relevant, top_k);
    let found = hits.iter().filter(|hit| **hit).count();
    ratio(found as f64, hits.len() as f64)
}

pub fn recall<S: AsRef<str>>(retrieved: &[S], relevant: &RelevanceJudgment, top_k: usize) -> f64 {
    let found = positional_hits(retrieved, relevant, top_k)
        .into_iter()
        .filter(|hit| *hit)
        .count();
    ratio(found as f64, relevant.relevant_count() as f64)
}

pub fn f1<S: AsRef<str>>(retrieved: &[S], relevant: &RelevanceJudgment, top_k: usize) -> f64 {
    harmonic_mean(
        precision(retrieved, relevant, top_k),
        recall(retrieved, relevant, top_k),
    )
}

/// `1 / rank` of the first relevant hit, 0 without one.
pub fn reciprocal_rank<S: AsRef<str>>(
    retrieved: &[S],
    relevant: &RelevanceJudgment,
    top_k: usize,
) -> f64 {
    positional_hits(retrieved, relevant, top_k)
        .iter()
        .position(|hit| *hit)
        .map(|idx| 1.0 / (idx + 1) as f64)
        .unwrap_or(0.0)
}

/// Single-query average precision, normalized by the full relevant count.
pub fn average_precision<S: AsRef<str>>(
    retrieved: &[S],
    relevant: &RelevanceJudgment,
    top_k: usize,
) -> f64 {
    let mut found = 0usize;
    let mut sum = 0.0;
    for (idx, hit) in positional_hits(retrieved, relevant, top_k)
        .into_iter()
        .enumerate()
    {
        if hit {
            found += 1;
            sum += found as f64 / (idx + 1) as f64;
        }
    }
    ratio(sum, relevant.relevant_count() as f64)
}

/// NDCG with linear gains. IDCG uses the judgment's gains in descending
/// order, truncated to `min(|relevant|, top_k)`.
pub fn ndcg<S: AsRef<str>>(retrieved: &[S], relevant: &RelevanceJudgment, top_k: usize) -> f64 {
    let dcg = discounted_gain(positional_gains(retrieved, relevant, top_k));
    let idcg = discounted_gain(relevant.ideal_grades().into_iter().take(top_k));
    ratio(dcg, idcg).min(1.0)
}

fn discounted_gain(gains: impl IntoIterator<Item = f64>) -> f64 {
    gains
        .into_iter()
        .enumerate()
        .map(|(idx, gain)| gain / ((idx + 2) as f64).log2())
        .sum()
}

pub fn hit_rate<S: AsRef<str>>(retrieved: &[S], relevant: &RelevanceJudgment, top_k: usize) -> f64 {
    if positional_hits(retrieved, relevant, top_k)
        .into_iter()
        .any(|hit| hit)
    {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn partial_hit_example() {
        let metrics = RetrievalMetrics::evaluate(
            &["d1", "d2", "d3"],
            &RelevanceJudgment::binary(["d2", "d5"]),
            3,
        )
        .unwrap();
        approx(metrics.precision, 1.0 / 3.0);
        approx(metrics.recall, 0.5);
        approx(metrics.f1, 0.4);
        approx(metrics.mrr, 0.5);
        approx(metrics.map, 0.25);
        approx(metrics.hit_rate, 1.0);
        // DCG = 1/log2(3); IDCG = 1 + 1/log2(3)
        let dcg = 1.0 / 3f64.log2();
        approx(metrics.ndcg, dcg / (1.0 + dcg));
    }

    #[test]
    fn empty_retrieved_is_all_zero() {
        let retrieved: [&str; 0] = [];
        let metrics =
            RetrievalMetrics::evaluate(&retrieved, &RelevanceJudgment::binary(["d1"]), 5).unwrap();
        assert_eq!(metrics, MetricSet::zero());
    }

    #[test]
    fn empty_relevant_is_all_zero() {
        let metrics =
            RetrievalMetrics::evaluate(&["a", "b"], &RelevanceJudgment::default(), 5).unwrap();
        assert_eq!(metrics, MetricSet::zero());
    }

    #[test]
    fn average_precision_matches_hand_computed_case() {
        let relevant = RelevanceJudgment::binary(["a", "c"]);
        approx(
            average_precision(&["a", "b", "c"], &relevant, 10),
            (1.0 + 2.0 / 3.0) / 2.0,
        );
    }

    #[test]
    fn metrics_only_see_the_truncated_view() {
        let relevant = RelevanceJudgment::binary(["c"]);
        let metrics = RetrievalMetrics::evaluate(&["a", "b", "c"], &relevant, 2).unwrap();
        assert_eq!(metrics, MetricSet::zero());

        let metrics = RetrievalMetrics::evaluate(&["a", "b", "c"], &relevant, 3).unwrap();
        approx(metrics.mrr, 1.0 / 3.0);
    }

    #[test]
    fn short_list_uses_its_own_length_for_precision() {
        let relevant = RelevanceJudgment::binary(["a"]);
        approx(precision(&["a"], &relevant, 10), 1.0);
    }

    #[test]
    fn ideal_ordering_scores_ndcg_one() {
        let graded = RelevanceJudgment::graded([("a", 1.0), ("b", 0.5), ("c", 0.2)]);
        approx(ndcg(&["a", "b", "c"], &graded, 3), 1.0);
        assert!(ndcg(&["c", "b", "a"], &graded, 3) < 1.0);

        // IDCG depth is min(|relevant|, top_k): one relevant item at rank 1 is ideal.
        let binary = RelevanceJudgment::binary(["a"]);
        approx(ndcg(&["a", "x", "y"], &binary, 3), 1.0);
    }

    #[test]
    fn graded_judgment_reduces_to_binary_outside_ndcg() {
        let graded = RelevanceJudgment::graded([("a", 0.2), ("b", 0.0)]);
        let metrics = RetrievalMetrics::evaluate(&["b", "a"], &graded, 2).unwrap();
        approx(metrics.precision, 0.5);
        approx(metrics.recall, 1.0);
        approx(metrics.mrr, 0.5);
        // Single graded item found at rank 2 while the ideal has it at rank 1.
        approx(metrics.ndcg, (0.2 / 3f64.log2()) / 0.2);
    }

    #[test]
    fn repeated_ids_count_once() {
        let relevant = RelevanceJudgment::binary(["a"]);
        let metrics = RetrievalMetrics::evaluate(&["a", "a", "a"], &relevant, 3).unwrap();
        approx(metrics.precision, 1.0 / 3.0);
        approx(metrics.recall, 1.0);
        approx(metrics.map, 1.0);
        approx(metrics.ndcg, 1.0);
        assert!(metrics.is_bounded());
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let err = RetrievalMetrics::evaluate(&["a"], &RelevanceJudgment::binary(["a"]), 0)
            .expect_err("top_k = 0");
        assert!(err.is_configuration());

        let err = RetrievalMetrics::evaluate(&["a"], &RelevanceJudgment::graded([("a", 2.0)]), 5)
            .expect_err("grade above 1");
        assert_eq!(err.kind(), "malformed_input");
    }
}
