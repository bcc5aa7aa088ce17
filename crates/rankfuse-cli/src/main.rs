mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rankfuse_core::config::Config;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rankfuse",
    version,
    about = "Rank fusion, BM25 scoring and retrieval evaluation",
    long_about = "rankfuse merges ranked candidate lists with weighted Reciprocal Rank Fusion,\n\
        scores pre-tokenized corpora with BM25, and evaluates ranked lists against\n\
        relevance judgments (precision, recall, F1, MRR, MAP, NDCG, hit rate).\n\n\
        Quick start:\n  \
        rankfuse fuse --input lists.json\n  \
        rankfuse bm25 --corpus corpus.jsonl --query \"keyword search\"\n  \
        rankfuse eval --input batch.json --top-k 10"
)]
struct Cli {
    /// Enable verbose logging (set log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (default: .rankfuse/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate ranked lists against relevance judgments
    ///
    /// Reads either a batch file (JSON array, `{"queries": [...]}` or JSONL of
    /// `{id, retrieved, relevant}` rows) or a TREC run plus qrels, and reports
    /// per-query metrics with their batch means and distribution.
    ///
    /// Examples:
    ///   rankfuse eval --input batch.json
    ///   rankfuse eval --qrels qrels.tsv --run run.trec --top-k 20
    ///   rankfuse eval --input batch.jsonl --output target/eval/report.json
    Eval {
        /// Batch file of evaluation rows
        #[arg(long, conflicts_with_all = ["qrels", "run"])]
        input: Option<String>,

        /// BEIR/TREC qrels file (requires --run)
        #[arg(long, requires = "run")]
        qrels: Option<String>,

        /// TREC run file (requires --qrels)
        #[arg(long, requires = "qrels")]
        run: Option<String>,

        /// Evaluation depth (default: eval.top_k from config)
        #[arg(long)]
        top_k: Option<usize>,

        /// Score queries on the calling thread
        #[arg(long)]
        sequential: bool,

        /// Write the JSON report here instead of stdout
        #[arg(long)]
        output: Option<String>,
    },
    /// Fuse ranked lists with weighted Reciprocal Rank Fusion
    ///
    /// Input is a JSON array of ranked lists. Weights are given per list and
    /// normalized before fusion.
    ///
    /// Examples:
    ///   rankfuse fuse --input lists.json
    ///   rankfuse fuse --input lists.json --k 30 --weights 0.7,0.3
    ///   rankfuse fuse --input lists.json --trec-tag rrf --output run.trec
    Fuse {
        /// JSON file holding an array of ranked lists
        #[arg(long)]
        input: String,

        /// RRF constant (default: fusion.k from config)
        #[arg(long)]
        k: Option<u32>,

        /// Comma-separated weights, one per list
        #[arg(long)]
        weights: Option<String>,

        /// Write the fused list here instead of stdout
        #[arg(long)]
        output: Option<String>,

        /// Emit TREC run lines with this run tag instead of JSON
        #[arg(long)]
        trec_tag: Option<String>,

        /// Query id used for TREC output (default: input file stem)
        #[arg(long)]
        query_id: Option<String>,
    },
    /// Rank a pre-tokenized corpus against a query with BM25
    ///
    /// The corpus is JSONL of `{document_id, chunk_id, tokens, metadata?}`.
    /// The query is split on whitespace; no other tokenization is applied.
    ///
    /// Example: rankfuse bm25 --corpus corpus.jsonl --query "rank fusion" --top-k 5
    Bm25 {
        /// JSONL corpus file
        #[arg(long)]
        corpus: String,

        /// Query tokens, whitespace separated
        #[arg(long)]
        query: String,

        /// Maximum number of results (default: eval.top_k from config)
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum BM25 score (default: lexical.score_threshold from config)
        #[arg(long)]
        threshold: Option<f64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_file = cli.config.as_deref().map(Path::new);
    let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
    let config = Config::load_with_file(Some(&cwd), config_file)?;

    // Set up tracing
    let filter = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Eval {
            input,
            qrels,
            run,
            top_k,
            sequential,
            output,
        } => {
            commands::eval::run(
                &config,
                input.as_deref().map(Path::new),
                qrels.as_deref().map(Path::new),
                run.as_deref().map(Path::new),
                top_k,
                sequential,
                output.as_deref().map(Path::new),
            )?;
        }
        Commands::Fuse {
            input,
            k,
            weights,
            output,
            trec_tag,
            query_id,
        } => {
            commands::fuse::run(
                &config,
                Path::new(&input),
                k,
                weights.as_deref(),
                output.as_deref().map(Path::new),
                trec_tag.as_deref(),
                query_id.as_deref(),
            )?;
        }
        Commands::Bm25 {
            corpus,
            query,
            top_k,
            threshold,
        } => {
            commands::bm25::run(&config, Path::new(&corpus), &query, top_k, threshold)?;
        }
    }

    Ok(())
}
