//! End-to-end tests for the `rankfuse` binary.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::tempdir;

fn fixture_path(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../testdata/fixtures/eval-sample")
        .join(file)
        .canonicalize()
        .expect("fixture must exist under testdata/fixtures/eval-sample")
}

/// Run the binary in an isolated directory so no user or project config leaks in.
fn rankfuse(workdir: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_rankfuse"));
    command
        .args(args)
        .current_dir(workdir)
        .env("HOME", workdir)
        .env_remove("RUST_LOG");
    for (key, _) in std::env::vars() {
        if key.starts_with("RANKFUSE_") {
            command.env_remove(key);
        }
    }
    command.output().expect("run rankfuse binary")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "rankfuse failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn eval_batch_file_writes_report() {
    let dir = tempdir().unwrap();
    let report_path = dir.path().join("reports").join("eval.json");
    let batch = fixture_path("batch.json");

    let output = rankfuse(
        dir.path(),
        &[
            "eval",
            "--input",
            batch.to_str().unwrap(),
            "--top-k",
            "3",
            "--output",
            report_path.to_str().unwrap(),
        ],
    );
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Retrieval Eval Summary"));

    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["total"], 4);
    assert_eq!(report["successful"], 3);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["top_k"], 3);
}

#[test]
fn eval_trec_run_against_qrels() {
    let dir = tempdir().unwrap();
    let report_path = dir.path().join("trec.json");
    let qrels = fixture_path("qrels.tsv");
    let run = fixture_path("run.trec");

    let output = rankfuse(
        dir.path(),
        &[
            "eval",
            "--qrels",
            qrels.to_str().unwrap(),
            "--run",
            run.to_str().unwrap(),
            "--sequential",
            "--output",
            report_path.to_str().unwrap(),
        ],
    );
    assert!(output.status.success());

    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["total"], 3);
    assert_eq!(report["successful"], 3);
    assert_eq!(report["top_k"], 10);
}

#[test]
fn eval_without_inputs_fails() {
    let dir = tempdir().unwrap();
    let output = rankfuse(dir.path(), &["eval"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--input"));
}

#[test]
fn fuse_prints_hybrid_list() {
    let dir = tempdir().unwrap();
    let lists = fixture_path("ranked-lists.json");
    let fused = stdout_json(&rankfuse(
        dir.path(),
        &["fuse", "--input", lists.to_str().unwrap()],
    ));

    let items = fused.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["chunk_id"], "x");
    assert_eq!(items[0]["rank"], 1);
    assert_eq!(items[0]["source"], "hybrid");
    assert_eq!(items[0]["metadata"]["original_source"], "vector");
}

#[test]
fn fuse_emits_trec_lines_with_tag() {
    let dir = tempdir().unwrap();
    let lists = fixture_path("ranked-lists.json");
    let output = rankfuse(
        dir.path(),
        &[
            "fuse",
            "--input",
            lists.to_str().unwrap(),
            "--weights",
            "0.2,0.8",
            "--trec-tag",
            "rrf",
            "--query-id",
            "q7",
        ],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    // The keyword list ranks y first and carries most of the weight.
    assert!(lines[0].starts_with("q7\tQ0\ty\t1\t"));
    assert!(lines[0].ends_with("\trrf"));
}

#[test]
fn fuse_rejects_mismatched_weights() {
    let dir = tempdir().unwrap();
    let lists = fixture_path("ranked-lists.json");
    let output = rankfuse(
        dir.path(),
        &["fuse", "--input", lists.to_str().unwrap(), "--weights", "1.0"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("weights"));
}

#[test]
fn bm25_ranks_corpus_chunks() {
    let dir = tempdir().unwrap();
    let corpus = fixture_path("corpus.jsonl");
    let ranked = stdout_json(&rankfuse(
        dir.path(),
        &[
            "bm25",
            "--corpus",
            corpus.to_str().unwrap(),
            "--query",
            "bm25 keyword",
            "--top-k",
            "1",
        ],
    ));

    let items = ranked.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["chunk_id"], "faq-1");
    assert_eq!(items[0]["source"], "keyword");
}
