use anyhow::{Context, Result};
use rankfuse_core::config::{Config, parse_csv_f64_list};
use rankfuse_query::RrfFusion;
use rankfuse_query::suite::{load_ranked_lists, render_trec_run};
use std::path::Path;
use tracing::info;

pub fn run(
    config: &Config,
    input: &Path,
    k: Option<u32>,
    weights: Option<&str>,
    output_path: Option<&Path>,
    trec_tag: Option<&str>,
    query_id: Option<&str>,
) -> Result<()> {
    let lists = load_ranked_lists(input)
        .with_context(|| format!("Failed to load ranked lists from {}", input.display()))?;

    let mut fusion = RrfFusion::from_config(&config.fusion);
    if let Some(k) = k {
        fusion.k = k;
    }
    if let Some(raw) = weights {
        let parsed = parse_csv_f64_list(raw)
            .with_context(|| format!("Invalid --weights '{raw}': expected e.g. 0.7,0.3"))?;
        fusion.weights = Some(parsed);
    }

    let fused = fusion.fuse(&lists)?;
    info!(
        lists = lists.len(),
        k = fusion.k,
        fused = fused.len(),
        "fused ranked lists"
    );

    let rendered = match trec_tag {
        Some(tag) => {
            let query_id = query_id
                .map(ToString::to_string)
                .or_else(|| {
                    input
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().to_string())
                })
                .unwrap_or_else(|| "query".to_string());
            render_trec_run(&query_id, &fused, tag)
        }
        None => serde_json::to_string_pretty(&fused)?,
    };
    super::emit(output_path, &rendered, "fused")
}
