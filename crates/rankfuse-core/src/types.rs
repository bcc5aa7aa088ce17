use crate::error::EvalError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Provenance tag of a ranked candidate. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    Vector,
    Keyword,
    Hybrid,
}

impl RetrievalSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Keyword => "keyword",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque metadata value carried through fusion untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// One scored candidate from a retrieval source.
///
/// `chunk_id` is the identity used for rank comparisons and fusion. `score`
/// is source-native and not comparable across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    #[serde(alias = "doc_id")]
    pub document_id: String,
    pub chunk_id: String,
    #[serde(default)]
    pub content: String,
    pub score: f64,
    /// 1-based position assigned by the producer; 0 when it assigned none.
    #[serde(default)]
    pub rank: usize,
    pub source: RetrievalSource,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RankedItem {
    pub fn new(
        document_id: impl Into<String>,
        chunk_id: impl Into<String>,
        score: f64,
        rank: usize,
        source: RetrievalSource,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            chunk_id: chunk_id.into(),
            content: String::new(),
            score,
            rank,
            source,
            metadata: Metadata::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Ground truth for one query.
///
/// `Binary` holds the relevant ids. `Graded` maps ids to a relevance in
/// [0, 1]; only NDCG reads the grades, every other metric asks `score > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelevanceJudgment {
    Binary(BTreeSet<String>),
    Graded(BTreeMap<String, f64>),
}

impl Default for RelevanceJudgment {
    fn default() -> Self {
        Self::Binary(BTreeSet::new())
    }
}

impl RelevanceJudgment {
    pub fn binary<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Binary(ids.into_iter().map(Into::into).collect())
    }

    pub fn graded<I, S>(grades: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self::Graded(
            grades
                .into_iter()
                .map(|(id, grade)| (id.into(), grade))
                .collect(),
        )
    }

    pub fn is_graded(&self) -> bool {
        matches!(self, Self::Graded(_))
    }

    pub fn is_relevant(&self, chunk_id: &str) -> bool {
        match self {
            Self::Binary(ids) => ids.contains(chunk_id),
            Self::Graded(grades) => grades.get(chunk_id).is_some_and(|grade| *grade > 0.0),
        }
    }

    /// Gain of `chunk_id`: 1.0/0.0 for binary judgments, the grade (missing = 0) otherwise.
    pub fn grade(&self, chunk_id: &str) -> f64 {
        match self {
            Self::Binary(ids) => {
                if ids.contains(chunk_id) {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Graded(grades) => grades.get(chunk_id).copied().unwrap_or(0.0).max(0.0),
        }
    }

    /// Number of relevant ids (graded: ids with a positive grade).
    pub fn relevant_count(&self) -> usize {
        match self {
            Self::Binary(ids) => ids.len(),
            Self::Graded(grades) => grades.values().filter(|grade| **grade > 0.0).count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.relevant_count() == 0
    }

    /// Positive gains in descending order, the ideal ranking for NDCG.
    pub fn ideal_grades(&self) -> Vec<f64> {
        match self {
            Self::Binary(ids) => vec![1.0; ids.len()],
            Self::Graded(grades) => {
                let mut values: Vec<f64> = grades
                    .values()
                    .copied()
                    .filter(|grade| *grade > 0.0)
                    .collect();
                values.sort_by(|a, b| b.total_cmp(a));
                values
            }
        }
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        match self {
            Self::Binary(ids) => {
                if ids.iter().any(|id| id.trim().is_empty()) {
                    return Err(EvalError::malformed(
                        "relevant set contains an empty chunk id",
                    ));
                }
            }
            Self::Graded(grades) => {
                for (id, grade) in grades {
                    if id.trim().is_empty() {
                        return Err(EvalError::malformed(
                            "graded judgment contains an empty chunk id",
                        ));
                    }
                    if !grade.is_finite() || !(0.0..=1.0).contains(grade) {
                        return Err(EvalError::malformed(format!(
                            "graded relevance for '{id}' must be within [0, 1], got {grade}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// The seven per-query retrieval metrics, each within [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSet {
    pub precision: f64,
    pub recall: f64,
    #[serde(alias = "f1_score")]
    pub f1: f64,
    pub mrr: f64,
    pub map: f64,
    pub ndcg: f64,
    pub hit_rate: f64,
}

impl MetricSet {
    pub const NAMES: [&'static str; 7] =
        ["precision", "recall", "f1", "mrr", "map", "ndcg", "hit_rate"];

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn metric_values(&self) -> [(&'static str, f64); 7] {
        [
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1", self.f1),
            ("mrr", self.mrr),
            ("map", self.map),
            ("ndcg", self.ndcg),
            ("hit_rate", self.hit_rate),
        ]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.metric_values()
            .into_iter()
            .find(|(metric, _)| *metric == name)
            .map(|(_, value)| value)
    }

    pub fn is_bounded(&self) -> bool {
        self.metric_values()
            .iter()
            .all(|(_, value)| value.is_finite() && (0.0..=1.0).contains(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judgment_deserializes_from_array_or_object() {
        let binary: RelevanceJudgment = serde_json::from_str(r#"["d1","d2"]"#).unwrap();
        assert_eq!(binary, RelevanceJudgment::binary(["d1", "d2"]));

        let graded: RelevanceJudgment = serde_json::from_str(r#"{"d1":1.0,"d2":0.5}"#).unwrap();
        assert!(graded.is_graded());
        assert_eq!(graded.grade("d2"), 0.5);

        assert!(serde_json::from_str::<RelevanceJudgment>("\"d1\"").is_err());
        assert!(serde_json::from_str::<RelevanceJudgment>(r#"{"d1":"high"}"#).is_err());
    }

    #[test]
    fn graded_judgment_reduces_to_positive_scores_for_membership() {
        let judgment = RelevanceJudgment::graded([("a", 0.9), ("b", 0.0), ("c", 0.3)]);
        assert!(judgment.is_relevant("a"));
        assert!(!judgment.is_relevant("b"));
        assert!(!judgment.is_relevant("missing"));
        assert_eq!(judgment.relevant_count(), 2);
        assert_eq!(judgment.ideal_grades(), vec![0.9, 0.3]);
    }

    #[test]
    fn validate_rejects_out_of_range_grades() {
        assert!(RelevanceJudgment::graded([("a", 1.5)]).validate().is_err());
        assert!(RelevanceJudgment::graded([("a", -0.1)]).validate().is_err());
        assert!(RelevanceJudgment::graded([("a", f64::NAN)]).validate().is_err());
        assert!(RelevanceJudgment::binary([" "]).validate().is_err());
        assert!(RelevanceJudgment::graded([("a", 1.0), ("b", 0.0)]).validate().is_ok());
        assert!(RelevanceJudgment::default().validate().is_ok());
    }

    #[test]
    fn ranked_item_accepts_legacy_doc_id_and_default_fields() {
        let item: RankedItem = serde_json::from_str(
            r#"{"doc_id":"doc-1","chunk_id":"c1","score":0.8,"source":"vector","metadata":{"page":3,"lang":"en","ok":true,"w":0.5,"n":null}}"#,
        )
        .unwrap();
        assert_eq!(item.document_id, "doc-1");
        assert_eq!(item.rank, 0);
        assert!(item.content.is_empty());
        assert_eq!(item.metadata["page"], MetadataValue::Int(3));
        assert_eq!(item.metadata["lang"], MetadataValue::from("en"));
        assert_eq!(item.metadata["ok"], MetadataValue::Bool(true));
        assert_eq!(item.metadata["w"], MetadataValue::Float(0.5));
        assert_eq!(item.metadata["n"], MetadataValue::Null);
    }

    #[test]
    fn metric_set_lookup_and_bounds() {
        let metrics = MetricSet {
            precision: 0.5,
            recall: 1.0,
            f1: 2.0 / 3.0,
            mrr: 1.0,
            map: 1.0,
            ndcg: 1.0,
            hit_rate: 1.0,
        };
        assert_eq!(metrics.get("recall"), Some(1.0));
        assert_eq!(metrics.get("unknown"), None);
        assert!(metrics.is_bounded());
        assert!(MetricSet::zero().is_bounded());
    }
}
