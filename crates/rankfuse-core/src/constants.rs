/// Reciprocal Rank Fusion constant (standard value from the RRF paper).
pub const DEFAULT_RRF_K: u32 = 60;

/// BM25 term-frequency saturation.
pub const DEFAULT_BM25_K1: f64 = 1.5;

/// BM25 document-length normalization.
pub const DEFAULT_BM25_B: f64 = 0.75;

/// Default evaluation depth.
pub const DEFAULT_TOP_K: usize = 10;

/// Default data directory name under home.
pub const DEFAULT_DATA_DIR: &str = ".rankfuse";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = ".rankfuse/config.toml";

/// Metadata key holding the pre-fusion score of a fused item.
pub const META_ORIGINAL_SCORE: &str = "original_score";

/// Metadata key holding the pre-fusion source of a fused item.
pub const META_ORIGINAL_SOURCE: &str = "original_source";

/// Report schema version written by batch evaluation.
pub const REPORT_VERSION: &str = "rankfuse-eval-report-v1";
