use crate::constants;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub lexical: LexicalConfig,
    #[serde(default)]
    pub eval: EvalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default = "default_rrf_k", alias = "rrf_k")]
    pub k: u32,
    /// Per-list weights; validated against the list count at fusion time.
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalConfig {
    #[serde(default = "default_bm25_k1")]
    pub k1: f64,
    #[serde(default = "default_bm25_b")]
    pub b: f64,
    #[serde(default)]
    pub score_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Worker threads for parallel evaluation; 0 lets rayon decide.
    #[serde(default)]
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_rrf_k() -> u32 {
    constants::DEFAULT_RRF_K
}

fn default_bm25_k1() -> f64 {
    constants::DEFAULT_BM25_K1
}

fn default_bm25_b() -> f64 {
    constants::DEFAULT_BM25_B
}

fn default_top_k() -> usize {
    constants::DEFAULT_TOP_K
}

fn default_parallel() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k: default_rrf_k(),
            weights: None,
        }
    }
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: default_bm25_k1(),
            b: default_bm25_b(),
            score_threshold: 0.0,
        }
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            parallel: default_parallel(),
            threads: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with layered precedence:
    /// 1. Environment overrides `RANKFUSE_<SECTION>_<KEY>` (highest priority)
    /// 2. Explicit config file (from `--config` flag)
    /// 3. Project config: `<root>/.rankfuse/config.toml`
    /// 4. Global config: `~/.rankfuse/config.toml`
    /// 5. Built-in defaults (lowest priority)
    ///
    /// Only fields explicitly set in a higher-priority file override lower layers.
    pub fn load(root: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_file(root, None)
    }

    pub fn load_with_file(
        root: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        if let Some(home) = dirs::home_dir() {
            let global_path = home.join(constants::DEFAULT_DATA_DIR).join("config.toml");
            if global_path.exists() {
                let raw = load_toml_value(&global_path)?;
                merge_toml_values(&mut merged, &raw);
            }
        }

        if let Some(root) = root {
            let project_path = root.join(constants::PROJECT_CONFIG_FILE);
            if project_path.exists() {
                let raw = load_toml_value(&project_path)?;
                merge_toml_values(&mut merged, &raw);
            }
        }

        if let Some(cf) = config_file {
            if !cf.exists() {
                return Err(ConfigError::NotFound {
                    path: cf.display().to_string(),
                });
            }
            let raw = load_toml_value(cf)?;
            merge_toml_values(&mut merged, &raw);
        }

        let config_str =
            toml::to_string(&merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        apply_env_overrides(&mut config);
        config.normalize();
        Ok(config)
    }

    /// Replace out-of-range values with defaults, warning about each fallback.
    pub fn normalize(&mut self) {
        if self.fusion.k == 0 {
            tracing::warn!(
                field = "fusion.k",
                fallback = default_rrf_k(),
                "config value below minimum; falling back to default"
            );
            self.fusion.k = default_rrf_k();
        }
        self.lexical.k1 =
            clamp_non_negative_f64_with_warning(self.lexical.k1, default_bm25_k1(), "lexical.k1");
        self.lexical.b = clamp_unit_f64_with_warning(self.lexical.b, default_bm25_b(), "lexical.b");
        if !self.lexical.score_threshold.is_finite() {
            tracing::warn!(
                field = "lexical.score_threshold",
                "invalid non-finite config value; falling back to default"
            );
            self.lexical.score_threshold = 0.0;
        }
        self.eval.top_k =
            clamp_min_usize_with_warning(self.eval.top_k, 1, default_top_k(), "eval.top_k");
        self.logging.level = normalize_log_level(&self.logging.level);
    }
}

/// Load a TOML file as a raw `toml::Value` (preserving only explicitly-set fields).
fn load_toml_value(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    content
        .parse::<toml::Value>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Deep-merge `overlay` into `base`. Only keys present in `overlay` are written.
fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    if let (toml::Value::Table(base_map), toml::Value::Table(overlay_map)) = (base, overlay) {
        for (key, overlay_val) in overlay_map {
            if let Some(base_val) = base_map.get_mut(key) {
                if base_val.is_table() && overlay_val.is_table() {
                    merge_toml_values(base_val, overlay_val);
                } else {
                    *base_val = overlay_val.clone();
                }
            } else {
                base_map.insert(key.clone(), overlay_val.clone());
            }
        }
    }
}

/// Convention: `RANKFUSE_<SECTION>_<KEY>` in UPPER_SNAKE_CASE.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("RANKFUSE_FUSION_K")
        && let Ok(n) = v.trim().parse()
    {
        config.fusion.k = n;
    }
    if let Ok(v) = std::env::var("RANKFUSE_FUSION_WEIGHTS") {
        match parse_csv_f64_list(&v) {
            Some(weights) if !weights.is_empty() => config.fusion.weights = Some(weights),
            Some(_) => config.fusion.weights = None,
            None => tracing::warn!(
                value = %v,
                "ignoring unparsable RANKFUSE_FUSION_WEIGHTS"
            ),
        }
    }
    if let Ok(v) = std::env::var("RANKFUSE_LEXICAL_K1")
        && let Ok(n) = v.trim().parse()
    {
        config.lexical.k1 = n;
    }
    if let Ok(v) = std::env::var("RANKFUSE_LEXICAL_B")
        && let Ok(n) = v.trim().parse()
    {
        config.lexical.b = n;
    }
    if let Ok(v) = std::env::var("RANKFUSE_LEXICAL_SCORE_THRESHOLD")
        && let Ok(n) = v.trim().parse()
    {
        config.lexical.score_threshold = n;
    }
    if let Ok(v) = std::env::var("RANKFUSE_EVAL_TOP_K")
        && let Ok(n) = v.trim().parse()
    {
        config.eval.top_k = n;
    }
    if let Ok(v) = std::env::var("RANKFUSE_EVAL_PARALLEL")
        && let Some(parsed) = parse_env_bool(&v)
    {
        config.eval.parallel = parsed;
    }
    if let Ok(v) = std::env::var("RANKFUSE_EVAL_THREADS")
        && let Ok(n) = v.trim().parse()
    {
        config.eval.threads = n;
    }
    if let Ok(v) = std::env::var("RANKFUSE_LOGGING_LEVEL") {
        config.logging.level = v;
    }
}

fn parse_env_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `0.7,0.3` into weights. Returns `None` when any entry is not a number.
pub fn parse_csv_f64_list(raw: &str) -> Option<Vec<f64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.parse::<f64>().ok())
        .collect()
}

fn normalize_log_level(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        level @ ("trace" | "debug" | "info" | "warn" | "error") => level.to_string(),
        "warning" => "warn".to_string(),
        other => {
            tracing::warn!(
                field = "logging.level",
                value = other,
                "unknown log level; falling back to info"
            );
            default_log_level()
        }
    }
}

fn clamp_unit_f64_with_warning(value: f64, fallback: f64, field: &str) -> f64 {
    if !value.is_finite() {
        tracing::warn!(
            field,
            value,
            fallback,
            "invalid non-finite config value; falling back to default"
        );
        return fallback;
    }
    let clamped = value.clamp(0.0, 1.0);
    if (clamped - value).abs() > f64::EPSILON {
        tracing::warn!(
            field,
            value,
            clamped,
            "config value out of range; clamped to [0.0, 1.0]"
        );
    }
    clamped
}

fn clamp_non_negative_f64_with_warning(value: f64, fallback: f64, field: &str) -> f64 {
    if !value.is_finite() {
        tracing::warn!(
            field,
            value,
            fallback,
            "invalid non-finite config value; falling back to default"
        );
        return fallback;
    }
    if value < 0.0 {
        tracing::warn!(
            field,
            value,
            fallback,
            "config value below 0.0; falling back to default"
        );
        return fallback;
    }
    value
}

fn clamp_min_usize_with_warning(value: usize, min: usize, fallback: usize, field: &str) -> usize {
    if value < min {
        tracing::warn!(
            field,
            value,
            min,
            fallback,
            "config value below minimum; falling back to default"
        );
        fallback
    } else {
        value
    }
}
