use crate::metrics::RetrievalMetrics;
use crate::stats::MetricDistribution;
use rankfuse_core::config::EvalConfig;
use rankfuse_core::constants::REPORT_VERSION;
use rankfuse_core::error::EvalError;
use rankfuse_core::types::{MetricSet, RelevanceJudgment};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One row of a batch: a ranked list of chunk ids and its ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchQuery {
    #[serde(default, alias = "query_id")]
    pub id: Option<String>,
    pub retrieved: Vec<String>,
    pub relevant: RelevanceJudgment,
}

impl BatchQuery {
    pub fn new(
        id: Option<String>,
        retrieved: Vec<String>,
        relevant: RelevanceJudgment,
    ) -> Self {
        Self {
            id,
            retrieved,
            relevant,
        }
    }

    pub fn from_json(row: &Value) -> Result<Self, EvalError> {
        if !row.is_object() {
            return Err(EvalError::malformed("batch row must be a JSON object"));
        }
        serde_json::from_value(row.clone())
            .map_err(|err| EvalError::malformed(format!("invalid batch row: {err}")))
    }
}

/// Outcome for one query: metrics on success, the error message otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEvaluation {
    pub query_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryEvaluation {
    fn scored(query_id: Option<String>, metrics: MetricSet) -> Self {
        Self {
            query_id,
            metrics: Some(metrics),
            error: None,
        }
    }

    fn failed(query_id: Option<String>, error: &EvalError) -> Self {
        Self {
            query_id,
            metrics: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.metrics.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub version: String,
    pub top_k: usize,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Arithmetic mean of each metric over successful queries.
    pub metrics: MetricSet,
    pub distribution: BTreeMap<String, MetricDistribution>,
    pub per_query: Vec<QueryEvaluation>,
}

impl AggregateResult {
    fn from_evaluations(top_k: usize, per_query: Vec<QueryEvaluation>) -> Self {
        let successes: Vec<MetricSet> = per_query.iter().filter_map(|eval| eval.metrics).collect();

        let mut distribution = BTreeMap::new();
        for name in MetricSet::NAMES {
            let values: Vec<f64> = successes
                .iter()
                .filter_map(|metrics| metrics.get(name))
                .collect();
            distribution.insert(name.to_string(), MetricDistribution::from_values(&values));
        }
        let mean_of = |name: &str| distribution.get(name).map_or(0.0, |dist| dist.mean);
        let metrics = MetricSet {
            precision: mean_of("precision"),
            recall: mean_of("recall"),
            f1: mean_of("f1"),
            mrr: mean_of("mrr"),
            map: mean_of("map"),
            ndcg: mean_of("ndcg"),
            hit_rate: mean_of("hit_rate"),
        };

        Self {
            version: REPORT_VERSION.to_string(),
            top_k,
            total: per_query.len(),
            successful: successes.len(),
            failed: per_query.len() - successes.len(),
            metrics,
            distribution,
            per_query,
        }
    }
}

/// Scores a collection of queries and aggregates the results.
///
/// A query that fails to parse or score is recorded against that query and
/// excluded from the means; it never aborts the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEvaluator {
    pub parallel: bool,
    /// Worker threads for parallel runs; 0 lets rayon decide.
    pub threads: usize,
}

impl Default for BatchEvaluator {
    fn default() -> Self {
        Self {
            parallel: true,
            threads: 0,
        }
    }
}

impl BatchEvaluator {
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            threads: 0,
        }
    }

    pub fn from_config(config: &EvalConfig) -> Self {
        Self {
            parallel: config.parallel,
            threads: config.threads,
        }
    }

    pub fn run(&self, queries: &[BatchQuery], top_k: usize) -> Result<AggregateResult, EvalError> {
        ensure_top_k(top_k)?;
        let per_query = self.map_rows(queries, |query| evaluate_query(query, top_k));
        Ok(self.finish(top_k, per_query))
    }

    /// Like [`run`](Self::run), over raw JSON rows. Each row is parsed on its
    /// own so a malformed row fails only that query.
    pub fn run_json(&self, rows: &[Value], top_k: usize) -> Result<AggregateResult, EvalError> {
        ensure_top_k(top_k)?;
        let per_query = self.map_rows(rows, |row| match BatchQuery::from_json(row) {
            Ok(query) => evaluate_query(&query, top_k),
            Err(err) => QueryEvaluation::failed(row_query_id(row), &err),
        });
        Ok(self.finish(top_k, per_query))
    }

    fn map_rows<T, F>(&self, rows: &[T], evaluate: F) -> Vec<QueryEvaluation>
    where
        T: Sync,
        F: Fn(&T) -> QueryEvaluation + Sync + Send,
    {
        if !self.parallel || rows.len() < 2 {
            return rows.iter().map(evaluate).collect();
        }

        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|idx| format!("rankfuse-eval-{idx}"));
        if self.threads > 0 {
            builder = builder.num_threads(self.threads);
        }
        match builder.build() {
            Ok(worker_pool) => worker_pool.install(|| rows.par_iter().map(&evaluate).collect()),
            Err(err) => {
                warn!(error = %err, "failed to start evaluation worker pool; running sequentially");
                rows.iter().map(evaluate).collect()
            }
        }
    }

    fn finish(&self, top_k: usize, per_query: Vec<QueryEvaluation>) -> AggregateResult {
        for evaluation in per_query.iter().filter(|eval| !eval.is_success()) {
            warn!(
                query_id = evaluation.query_id.as_deref().unwrap_or("<unnamed>"),
                error = evaluation.error.as_deref().unwrap_or_default(),
                "query evaluation failed"
            );
        }
        let result = AggregateResult::from_evaluations(top_k, per_query);
        debug!(
            total = result.total,
            successful = result.successful,
            failed = result.failed,
            parallel = self.parallel,
            top_k,
            "batch evaluation complete"
        );
        result
    }
}

fn ensure_top_k(top_k: usize) -> Result<(), EvalError> {
    if top_k == 0 {
        return Err(EvalError::invalid_config("top_k", "must be >= 1"));
    }
    Ok(())
}

fn evaluate_query(query: &BatchQuery, top_k: usize) -> QueryEvaluation {
    match RetrievalMetrics::evaluate(&query.retrieved, &query.relevant, top_k) {
        Ok(metrics) => QueryEvaluation::scored(query.id.clone(), metrics),
        Err(err) => QueryEvaluation::failed(query.id.clone(), &err),
    }
}

fn row_query_id(row: &Value) -> Option<String> {
    row.get("id")
        .or_else(|| row.get("query_id"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}
