//! On-disk formats for batch rows, ranked lists, TREC runs and qrels.

use crate::batch::{AggregateResult, BatchQuery};
use crate::lexical::LexicalDocument;
use rankfuse_core::types::{MetricSet, RankedItem, RelevanceJudgment};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to parse line in {path}: {reason}")]
    ParseLine { path: String, reason: String },
}

fn read_file(path: &Path) -> Result<String, SuiteError> {
    std::fs::read_to_string(path).map_err(|source| SuiteError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn parse_line_error(path: &Path, line: usize, reason: impl std::fmt::Display) -> SuiteError {
    SuiteError::ParseLine {
        path: path.display().to_string(),
        reason: format!("line {line}: {reason}"),
    }
}

/// Load raw batch rows. `.jsonl` files hold one row per line; anything else is
/// read as JSON, either an array of rows or an object with a `queries` array.
///
/// Rows are left unparsed so the batch evaluator can fail them one by one.
pub fn load_batch_rows(path: &Path) -> Result<Vec<Value>, SuiteError> {
    let raw = read_file(path)?;
    if path.extension().and_then(|ext| ext.to_str()) == Some("jsonl") {
        let mut rows = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str::<Value>(line)
                .map_err(|err| parse_line_error(path, idx + 1, err))?;
            rows.push(row);
        }
        return Ok(rows);
    }

    let document: Value = serde_json::from_str(&raw).map_err(|source| SuiteError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    match document {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut object) => match object.remove("queries") {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(SuiteError::ParseLine {
                path: path.display().to_string(),
                reason: "expected an array of rows or an object with a `queries` array"
                    .to_string(),
            }),
        },
        _ => Err(SuiteError::ParseLine {
            path: path.display().to_string(),
            reason: "expected an array of rows".to_string(),
        }),
    }
}

/// Load a JSON array of ranked lists (an array of arrays of items).
pub fn load_ranked_lists(path: &Path) -> Result<Vec<Vec<RankedItem>>, SuiteError> {
    let raw = read_file(path)?;
    serde_json::from_str(&raw).map_err(|source| SuiteError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Load a pre-tokenized keyword corpus, one JSON document per line.
pub fn load_lexical_corpus(path: &Path) -> Result<Vec<LexicalDocument>, SuiteError> {
    let raw = read_file(path)?;
    let mut documents = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let document = serde_json::from_str::<LexicalDocument>(line)
            .map_err(|err| parse_line_error(path, idx + 1, err))?;
        documents.push(document);
    }
    Ok(documents)
}

/// Load BEIR/TREC qrels: `query-id corpus-id score` or the four-column TREC
/// form `query-id iteration corpus-id score`.
///
/// Non-positive scores are dropped. A query whose remaining scores are all
/// equal becomes a binary judgment; otherwise the scores are divided by the
/// largest score in the file and form a graded judgment.
pub fn load_qrels(path: &Path) -> Result<BTreeMap<String, RelevanceJudgment>, SuiteError> {
    let raw = read_file(path)?;

    let mut grades: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    let mut seen_content = false;
    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let columns: Vec<&str> = trimmed.split_whitespace().collect();
        let first_content = !seen_content;
        seen_content = true;
        if first_content && looks_like_qrels_header(&columns) {
            continue;
        }
        let (query_id, corpus_id, score) = match columns.as_slice() {
            [query_id, corpus_id, score] => (*query_id, *corpus_id, *score),
            [query_id, _iteration, corpus_id, score] => (*query_id, *corpus_id, *score),
            _ => {
                return Err(parse_line_error(
                    path,
                    idx + 1,
                    format!("expected 3 or 4 columns, got {}", columns.len()),
                ));
            }
        };
        let score = score
            .parse::<f64>()
            .ok()
            .filter(|score| score.is_finite())
            .ok_or_else(|| parse_line_error(path, idx + 1, format!("invalid score '{score}'")))?;
        if score <= 0.0 {
            continue;
        }
        grades
            .entry(query_id.to_string())
            .or_default()
            .insert(corpus_id.to_string(), score);
    }

    let max_grade = grades
        .values()
        .flat_map(|doc_grades| doc_grades.values().copied())
        .fold(0.0_f64, f64::max);

    Ok(grades
        .into_iter()
        .map(|(query_id, doc_grades)| {
            let mut values = doc_grades.values();
            let first = values.next().copied().unwrap_or(0.0);
            let uniform = values.all(|grade| *grade == first);
            let judgment = if uniform {
                RelevanceJudgment::binary(doc_grades.into_keys())
            } else {
                RelevanceJudgment::graded(
                    doc_grades
                        .into_iter()
                        .map(|(doc, grade)| (doc, grade / max_grade)),
                )
            };
            (query_id, judgment)
        })
        .collect())
}

fn looks_like_qrels_header(columns: &[&str]) -> bool {
    let Some(first) = columns.first() else {
        return false;
    };
    matches!(
        first.trim().to_ascii_lowercase().as_str(),
        "query-id" | "query_id" | "queryid" | "qid" | "query"
    )
}

/// Load a TREC run file (`qid Q0 docid rank score tag`). Each query's ids are
/// ordered by rank, file order breaking ties.
pub fn load_trec_run(path: &Path) -> Result<BTreeMap<String, Vec<String>>, SuiteError> {
    let raw = read_file(path)?;

    let mut ranked: BTreeMap<String, Vec<(usize, String)>> = BTreeMap::new();
    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let columns: Vec<&str> = trimmed.split_whitespace().collect();
        if columns.len() < 4 {
            return Err(parse_line_error(
                path,
                idx + 1,
                format!("expected at least 4 columns, got {}", columns.len()),
            ));
        }
        let rank = columns[3]
            .parse::<usize>()
            .map_err(|err| parse_line_error(path, idx + 1, format!("invalid rank: {err}")))?;
        ranked
            .entry(columns[0].to_string())
            .or_default()
            .push((rank, columns[2].to_string()));
    }

    Ok(ranked
        .into_iter()
        .map(|(query_id, mut entries)| {
            entries.sort_by_key(|(rank, _)| *rank);
            (query_id, entries.into_iter().map(|(_, doc)| doc).collect())
        })
        .collect())
}

/// Pair each judged query with its run. Queries missing from the run are
/// evaluated against an empty list.
pub fn join_run_with_qrels(
    run: &BTreeMap<String, Vec<String>>,
    qrels: &BTreeMap<String, RelevanceJudgment>,
) -> Vec<BatchQuery> {
    qrels
        .iter()
        .map(|(query_id, judgment)| {
            BatchQuery::new(
                Some(query_id.clone()),
                run.get(query_id).cloned().unwrap_or_default(),
                judgment.clone(),
            )
        })
        .collect()
}

pub fn render_trec_run(query_id: &str, items: &[RankedItem], tag: &str) -> String {
    let mut output = String::new();
    for (position, item) in items.iter().enumerate() {
        output.push_str(&format!(
            "{query_id}\tQ0\t{}\t{}\t{:.6}\t{tag}\n",
            item.chunk_id,
            position + 1,
            item.score
        ));
    }
    output
}

pub fn render_summary_table(result: &AggregateResult) -> String {
    let mut output = String::new();
    output.push_str("Retrieval Eval Summary\n");
    output.push_str("=====================\n");
    output.push_str(&format!(
        "top_k={} total={} successful={} failed={}\n\n",
        result.top_k, result.total, result.successful, result.failed
    ));
    output.push_str(&format!(
        "{:<10} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
        "metric", "mean", "p50", "p95", "min", "max", "std"
    ));
    for name in MetricSet::NAMES {
        let mean = result.metrics.get(name).unwrap_or(0.0);
        let dist = result.distribution.get(name).copied().unwrap_or_default();
        output.push_str(&format!(
            "{name:<10} {mean:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4}\n",
            dist.p50, dist.p95, dist.min, dist.max, dist.std_dev
        ));
    }
    let failures: Vec<_> = result
        .per_query
        .iter()
        .filter(|eval| !eval.is_success())
        .collect();
    if !failures.is_empty() {
        output.push_str("\nFailures:\n");
        for eval in failures {
            output.push_str(&format!(
                "- {}: {}\n",
                eval.query_id.as_deref().unwrap_or("<unnamed>"),
                eval.error.as_deref().unwrap_or_default()
            ));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchEvaluator;
    use rankfuse_core::types::RetrievalSource;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn qrels_with_header_and_uniform_scores_are_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "qrels.tsv",
            "query-id\tcorpus-id\tscore\nq1\td1\t1\nq1\td2\t1\nq1\td3\t0\n# note\nq2\td9\t1\n",
        );
        let qrels = load_qrels(&path).unwrap();
        assert_eq!(qrels["q1"], RelevanceJudgment::binary(["d1", "d2"]));
        assert_eq!(qrels["q2"], RelevanceJudgment::binary(["d9"]));
    }

    #[test]
    fn qrels_with_mixed_scores_are_graded_by_file_max() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "qrels.txt", "q1 0 d1 2\nq1 0 d2 1\nq2 0 d3 1\n");
        let qrels = load_qrels(&path).unwrap();
        assert_eq!(
            qrels["q1"],
            RelevanceJudgment::graded([("d1", 1.0), ("d2", 0.5)])
        );
        assert_eq!(qrels["q2"], RelevanceJudgment::binary(["d3"]));
    }

    #[test]
    fn qrels_reject_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let short = write(&dir, "short.tsv", "q1 d1\n");
        assert!(matches!(load_qrels(&short), Err(SuiteError::ParseLine { .. })));
        let bad_score = write(&dir, "bad.tsv", "q1 d1 high\n");
        let err = load_qrels(&bad_score).unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert!(matches!(
            load_qrels(&dir.path().join("missing.tsv")),
            Err(SuiteError::Read { .. })
        ));
    }

    #[test]
    fn trec_run_is_ordered_by_rank() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "run.trec",
            "q1 Q0 d3 3 0.1 bm25\nq1 Q0 d1 1 0.9 bm25\nq1 Q0 d2 2 0.5 bm25\nq2 Q0 d7 1 0.3 bm25\n",
        );
        let run = load_trec_run(&path).unwrap();
        assert_eq!(run["q1"], vec!["d1", "d2", "d3"]);
        assert_eq!(run["q2"], vec!["d7"]);
    }

    #[test]
    fn join_keeps_judged_queries_only() {
        let mut run = BTreeMap::new();
        run.insert("q1".to_string(), vec!["d1".to_string()]);
        run.insert("unjudged".to_string(), vec!["d2".to_string()]);
        let mut qrels = BTreeMap::new();
        qrels.insert("q1".to_string(), RelevanceJudgment::binary(["d1"]));
        qrels.insert("q2".to_string(), RelevanceJudgment::binary(["d5"]));

        let queries = join_run_with_qrels(&run, &qrels);
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].id.as_deref(), Some("q1"));
        assert_eq!(queries[0].retrieved, vec!["d1"]);
        assert!(queries[1].retrieved.is_empty());
    }

    #[test]
    fn batch_rows_load_from_json_and_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let array = write(&dir, "rows.json", r#"[{"retrieved":[],"relevant":[]}]"#);
        assert_eq!(load_batch_rows(&array).unwrap().len(), 1);

        let wrapped = write(
            &dir,
            "suite.json",
            r#"{"queries":[{"retrieved":[],"relevant":[]},{"oops":1}]}"#,
        );
        assert_eq!(load_batch_rows(&wrapped).unwrap().len(), 2);

        let lines = write(
            &dir,
            "rows.jsonl",
            "{\"retrieved\":[\"a\"],\"relevant\":[\"a\"]}\n\n{\"retrieved\":[],\"relevant\":[]}\n",
        );
        assert_eq!(load_batch_rows(&lines).unwrap().len(), 2);

        let broken = write(&dir, "broken.jsonl", "{\"retrieved\":\n");
        assert!(matches!(load_batch_rows(&broken), Err(SuiteError::ParseLine { .. })));

        let scalar = write(&dir, "scalar.json", "42");
        assert!(load_batch_rows(&scalar).is_err());
    }

    #[test]
    fn trec_rendering_renumbers_positions() {
        let items = vec![
            RankedItem::new("doc", "c9", 0.032, 7, RetrievalSource::Hybrid),
            RankedItem::new("doc", "c2", 0.016, 0, RetrievalSource::Hybrid),
        ];
        let rendered = render_trec_run("q1", &items, "rrf");
        assert_eq!(
            rendered,
            "q1\tQ0\tc9\t1\t0.032000\trrf\nq1\tQ0\tc2\t2\t0.016000\trrf\n"
        );
    }

    #[test]
    fn summary_table_lists_metrics_and_failures() {
        let rows = vec![
            serde_json::json!({"id":"ok","retrieved":["a"],"relevant":["a"]}),
            serde_json::json!({"id":"broken","retrieved":["a"]}),
        ];
        let result = BatchEvaluator::sequential().run_json(&rows, 5).unwrap();
        let table = render_summary_table(&result);
        assert!(table.contains("total=2 successful=1 failed=1"));
        assert!(table.contains("hit_rate"));
        assert!(table.contains("- broken:"));
    }
}
