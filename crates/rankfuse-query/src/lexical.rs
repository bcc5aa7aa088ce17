use rankfuse_core::config::LexicalConfig;
use rankfuse_core::constants::{DEFAULT_BM25_B, DEFAULT_BM25_K1};
use rankfuse_core::error::EvalError;
use rankfuse_core::types::{Metadata, RankedItem, RetrievalSource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Okapi BM25 scorer. Pure and stateless; corpus statistics are supplied per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Scorer {
    k1: f64,
    b: f64,
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Self {
            k1: DEFAULT_BM25_K1,
            b: DEFAULT_BM25_B,
        }
    }
}

impl Bm25Scorer {
    pub fn new(k1: f64, b: f64) -> Result<Self, EvalError> {
        if !k1.is_finite() || k1 < 0.0 {
            return Err(EvalError::invalid_config(
                "k1",
                format!("must be a finite value >= 0, got {k1}"),
            ));
        }
        if !b.is_finite() || !(0.0..=1.0).contains(&b) {
            return Err(EvalError::invalid_config(
                "b",
                format!("must be within [0, 1], got {b}"),
            ));
        }
        Ok(Self { k1, b })
    }

    pub fn from_config(config: &LexicalConfig) -> Result<Self, EvalError> {
        Self::new(config.k1, config.b)
    }

    pub fn k1(&self) -> f64 {
        self.k1
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    /// Score one document against one query.
    ///
    /// Query tokens absent from the document, or with zero document
    /// frequency, contribute nothing. Repeated query tokens contribute once
    /// per occurrence.
    pub fn score<Q: AsRef<str>, D: AsRef<str>>(
        &self,
        query_tokens: &[Q],
        doc_tokens: &[D],
        doc_frequency: &HashMap<String, usize>,
        total_docs: usize,
        avg_doc_length: f64,
    ) -> f64 {
        let term_freq = term_frequencies(doc_tokens);
        let length_ratio = length_ratio(doc_tokens.len(), avg_doc_length);

        let mut score = 0.0;
        for token in query_tokens {
            let token = token.as_ref();
            let Some(&tf) = term_freq.get(token) else {
                continue;
            };
            let df = doc_frequency.get(token).copied().unwrap_or(0);
            if df == 0 {
                continue;
            }
            score += idf(total_docs, df) * self.saturate(tf as f64, length_ratio);
        }
        score
    }

    /// BM25 weight per distinct token of `tokens`, against `stats`.
    ///
    /// Tokens unseen in the corpus use `ln(N + 1)`. With an empty corpus every
    /// token gets idf 1 and the document is its own average length.
    pub fn sparse_vector<S: AsRef<str>>(
        &self,
        tokens: &[S],
        stats: &CorpusStats,
    ) -> BTreeMap<String, f64> {
        let term_freq = term_frequencies(tokens);
        let empty_corpus = stats.doc_count() == 0;
        let length_ratio = if empty_corpus {
            length_ratio(tokens.len(), 1.0)
        } else {
            length_ratio(tokens.len(), stats.avg_doc_length())
        };

        let mut vector = BTreeMap::new();
        for (token, tf) in term_freq {
            let token_idf = if empty_corpus {
                1.0
            } else {
                match stats.doc_frequency(token) {
                    0 => ((stats.doc_count() + 1) as f64).ln(),
                    df => idf(stats.doc_count(), df),
                }
            };
            let weight = token_idf * self.saturate(tf as f64, length_ratio);
            if weight > 0.0 {
                vector.insert(token.to_string(), weight);
            }
        }
        vector
    }

    fn saturate(&self, tf: f64, length_ratio: f64) -> f64 {
        (tf * (self.k1 + 1.0)) / (tf + self.k1 * (1.0 - self.b + self.b * length_ratio))
    }
}

/// `ln((N - df + 0.5) / (df + 0.5) + 1)`
pub fn idf(total_docs: usize, df: usize) -> f64 {
    let n = total_docs as f64;
    let df = df as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

fn term_frequencies<S: AsRef<str>>(tokens: &[S]) -> HashMap<&str, usize> {
    let mut freq = HashMap::new();
    for token in tokens {
        *freq.entry(token.as_ref()).or_insert(0usize) += 1;
    }
    freq
}

/// `doc_length / avg_doc_length`, neutral (1.0) when the average is unusable.
fn length_ratio(doc_length: usize, avg_doc_length: f64) -> f64 {
    if !avg_doc_length.is_finite() || avg_doc_length <= 0.0 {
        return 1.0;
    }
    doc_length as f64 / avg_doc_length
}

/// Corpus statistics consumed by BM25: document count, per-token document
/// frequency, and average document length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    doc_count: usize,
    total_tokens: usize,
    doc_frequency: HashMap<String, usize>,
}

impl CorpusStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<[String]>,
    {
        let mut stats = Self::new();
        for tokens in documents {
            stats.add_document(tokens.as_ref());
        }
        stats
    }

    pub fn add_document<S: AsRef<str>>(&mut self, tokens: &[S]) {
        self.doc_count += 1;
        self.total_tokens += tokens.len();
        let unique: HashSet<&str> = tokens.iter().map(AsRef::as_ref).collect();
        for token in unique {
            *self.doc_frequency.entry(token.to_string()).or_insert(0) += 1;
        }
    }

    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    pub fn doc_frequency(&self, token: &str) -> usize {
        self.doc_frequency.get(token).copied().unwrap_or(0)
    }

    pub fn doc_frequencies(&self) -> &HashMap<String, usize> {
        &self.doc_frequency
    }

    pub fn avg_doc_length(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_tokens as f64 / self.doc_count as f64
        }
    }
}

/// A pre-tokenized unit of the keyword corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalDocument {
    #[serde(alias = "doc_id")]
    pub document_id: String,
    pub chunk_id: String,
    pub tokens: Vec<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Score every document in `docs` against the query and return the keyword
/// ranked list: `score >= score_threshold`, best first, at most `top_k` items.
///
/// Corpus statistics are computed from `docs` itself. Ties keep input order.
pub fn rank_documents<S: AsRef<str>>(
    scorer: &Bm25Scorer,
    query_tokens: &[S],
    docs: &[LexicalDocument],
    top_k: usize,
    score_threshold: f64,
) -> Result<Vec<RankedItem>, EvalError> {
    if top_k == 0 {
        return Err(EvalError::invalid_config("top_k", "must be >= 1"));
    }
    if docs.is_empty() {
        return Ok(Vec::new());
    }

    let stats = CorpusStats::from_documents(docs.iter().map(|doc| doc.tokens.as_slice()));
    let mut scored: Vec<(usize, f64)> = docs
        .iter()
        .enumerate()
        .map(|(idx, doc)| {
            let score = scorer.score(
                query_tokens,
                &doc.tokens,
                stats.doc_frequencies(),
                stats.doc_count(),
                stats.avg_doc_length(),
            );
            (idx, score)
        })
        .filter(|(_, score)| *score >= score_threshold)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);

    tracing::debug!(
        corpus_size = docs.len(),
        matched = scored.len(),
        top_k,
        "bm25 ranking complete"
    );

    Ok(scored
        .into_iter()
        .enumerate()
        .map(|(position, (idx, score))| {
            let doc = &docs[idx];
            RankedItem {
                document_id: doc.document_id.clone(),
                chunk_id: doc.chunk_id.clone(),
                content: doc.content.clone(),
                score,
                rank: position + 1,
                source: RetrievalSource::Keyword,
                metadata: doc.metadata.clone(),
            }
        })
        .collect())
}
