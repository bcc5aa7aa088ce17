pub mod batch;
pub mod fusion;
pub mod lexical;
pub mod metrics;
pub mod similarity;
pub mod stats;
pub mod suite;

pub use batch::{AggregateResult, BatchEvaluator, BatchQuery, QueryEvaluation};
pub use fusion::RrfFusion;
pub use lexical::{Bm25Scorer, CorpusStats, LexicalDocument};
pub use metrics::RetrievalMetrics;
