use anyhow::{Context, Result};
use rankfuse_core::config::Config;
use rankfuse_query::BatchEvaluator;
use rankfuse_query::suite::{
    join_run_with_qrels, load_batch_rows, load_qrels, load_trec_run, render_summary_table,
};
use std::path::Path;
use tracing::info;

pub fn run(
    config: &Config,
    input: Option<&Path>,
    qrels_path: Option<&Path>,
    run_path: Option<&Path>,
    top_k: Option<usize>,
    sequential: bool,
    output_path: Option<&Path>,
) -> Result<()> {
    let top_k = top_k.unwrap_or(config.eval.top_k);
    let mut evaluator = BatchEvaluator::from_config(&config.eval);
    if sequential {
        evaluator.parallel = false;
    }

    let result = match (input, qrels_path, run_path) {
        (Some(input), _, _) => {
            let rows = load_batch_rows(input)
                .with_context(|| format!("Failed to load batch from {}", input.display()))?;
            info!(rows = rows.len(), top_k, "evaluating batch file");
            evaluator.run_json(&rows, top_k)?
        }
        (None, Some(qrels_path), Some(run_path)) => {
            let qrels = load_qrels(qrels_path)
                .with_context(|| format!("Failed to load qrels from {}", qrels_path.display()))?;
            let run = load_trec_run(run_path)
                .with_context(|| format!("Failed to load run from {}", run_path.display()))?;
            let queries = join_run_with_qrels(&run, &qrels);
            info!(
                judged_queries = queries.len(),
                run_queries = run.len(),
                top_k,
                "evaluating TREC run"
            );
            evaluator.run(&queries, top_k)?
        }
        _ => anyhow::bail!("either --input or both --qrels and --run are required"),
    };

    super::emit(
        output_path,
        &serde_json::to_string_pretty(&result)?,
        "report",
    )?;
    println!("{}", render_summary_table(&result));

    if result.failed > 0 {
        eprintln!(
            "{} of {} queries failed to evaluate",
            result.failed, result.total
        );
    }
    Ok(())
}
