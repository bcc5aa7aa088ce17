use rankfuse_core::config::FusionConfig;
use rankfuse_core::constants::{DEFAULT_RRF_K, META_ORIGINAL_SCORE, META_ORIGINAL_SOURCE};
use rankfuse_core::error::EvalError;
use rankfuse_core::types::{MetadataValue, RankedItem, RetrievalSource};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Weighted Reciprocal Rank Fusion over any number of ranked lists.
#[derive(Debug, Clone, PartialEq)]
pub struct RrfFusion {
    pub k: u32,
    /// One weight per input list. `None` weighs every list equally.
    pub weights: Option<Vec<f64>>,
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self {
            k: DEFAULT_RRF_K,
            weights: None,
        }
    }
}

impl RrfFusion {
    pub fn new(k: u32) -> Self {
        Self { k, weights: None }
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            k: config.k,
            weights: config.weights.clone(),
        }
    }

    pub fn fuse(&self, lists: &[Vec<RankedItem>]) -> Result<Vec<RankedItem>, EvalError> {
        fuse(lists, self.k, self.weights.as_deref())
    }
}

/// Contribution of a single appearance at 1-based `rank`.
pub fn rrf_score(weight: f64, k: u32, rank: usize) -> f64 {
    weight / (f64::from(k) + rank as f64)
}

/// Merge ranked lists into one hybrid list.
///
/// Rank is the position within each input list; the item's own `rank` and
/// `score` fields are ignored. A chunk's fused score is the sum of its
/// weighted contributions, one per list it appears in. The first occurrence
/// of a chunk (list order, then position) supplies its document id, content
/// and metadata. Equal fused scores keep first-appearance order. Output ranks
/// are renumbered 1..M.
pub fn fuse(
    lists: &[Vec<RankedItem>],
    k: u32,
    weights: Option<&[f64]>,
) -> Result<Vec<RankedItem>, EvalError> {
    if k == 0 {
        return Err(EvalError::invalid_config("k", "must be >= 1"));
    }
    let weights = normalized_weights(lists.len(), weights)?;

    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut fused: Vec<(&RankedItem, f64)> = Vec::new();
    for (list, weight) in lists.iter().zip(weights.iter().copied()) {
        let mut seen_in_list: HashSet<&str> = HashSet::with_capacity(list.len());
        for (position, item) in list.iter().enumerate() {
            // Repeats within one list keep their position but add nothing.
            if !seen_in_list.insert(item.chunk_id.as_str()) {
                continue;
            }
            let contribution = rrf_score(weight, k, position + 1);
            match index.get(item.chunk_id.as_str()) {
                Some(&slot) => fused[slot].1 += contribution,
                None => {
                    index.insert(item.chunk_id.as_str(), fused.len());
                    fused.push((item, contribution));
                }
            }
        }
    }

    // Stable sort: ties stay in first-appearance order.
    fused.sort_by(|a, b| b.1.total_cmp(&a.1));

    debug!(
        lists = lists.len(),
        k,
        unique_chunks = fused.len(),
        "rrf fusion complete"
    );

    Ok(fused
        .into_iter()
        .enumerate()
        .map(|(position, (first, score))| {
            let mut metadata = first.metadata.clone();
            metadata.insert(
                META_ORIGINAL_SCORE.to_string(),
                MetadataValue::Float(first.score),
            );
            metadata.insert(
                META_ORIGINAL_SOURCE.to_string(),
                MetadataValue::from(first.source.as_str()),
            );
            RankedItem {
                document_id: first.document_id.clone(),
                chunk_id: first.chunk_id.clone(),
                content: first.content.clone(),
                score,
                rank: position + 1,
                source: RetrievalSource::Hybrid,
                metadata,
            }
        })
        .collect())
}

/// Resolve per-list weights, normalized to sum to 1.
fn normalized_weights(list_count: usize, weights: Option<&[f64]>) -> Result<Vec<f64>, EvalError> {
    let Some(weights) = weights else {
        if list_count == 0 {
            return Ok(Vec::new());
        }
        return Ok(vec![1.0 / list_count as f64; list_count]);
    };

    if weights.len() != list_count {
        return Err(EvalError::invalid_config(
            "weights",
            format!(
                "expected {list_count} weights (one per list), got {}",
                weights.len()
            ),
        ));
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(EvalError::invalid_config(
            "weights",
            format!("weights must be finite and >= 0, got {bad}"),
        ));
    }
    let total: f64 = weights.iter().sum();
    if list_count > 0 && total <= 0.0 {
        return Err(EvalError::invalid_config(
            "weights",
            "weights must not sum to zero",
        ));
    }
    Ok(weights.iter().map(|w| w / total).collect())
}
