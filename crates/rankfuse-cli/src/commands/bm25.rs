use anyhow::{Context, Result};
use rankfuse_core::config::Config;
use rankfuse_query::Bm25Scorer;
use rankfuse_query::lexical::rank_documents;
use rankfuse_query::suite::load_lexical_corpus;
use std::path::Path;
use tracing::info;

pub fn run(
    config: &Config,
    corpus_path: &Path,
    query: &str,
    top_k: Option<usize>,
    threshold: Option<f64>,
) -> Result<()> {
    let query_tokens: Vec<&str> = query.split_whitespace().collect();
    if query_tokens.is_empty() {
        anyhow::bail!("--query must contain at least one token");
    }

    let scorer = Bm25Scorer::from_config(&config.lexical)?;
    let corpus = load_lexical_corpus(corpus_path)
        .with_context(|| format!("Failed to load corpus from {}", corpus_path.display()))?;

    let top_k = top_k.unwrap_or(config.eval.top_k);
    let threshold = threshold.unwrap_or(config.lexical.score_threshold);
    let ranked = rank_documents(&scorer, &query_tokens, &corpus, top_k, threshold)?;
    info!(
        corpus_size = corpus.len(),
        results = ranked.len(),
        "bm25 ranking finished"
    );

    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}
