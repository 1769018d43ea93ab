// src/answer/thematic.rs

//! Thematic analyzer: TF-IDF + K-Means topic clusters per tenant.
//!
//! Built from a bounded sample of recent messages by an operator action,
//! serialized to one JSON file per tenant, and read by the graph-RAG path.
//! Live requests never mutate the cache; a rebuild writes a temp file and
//! renames it over the old snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embeddings::sparse::tokenize;
use crate::error::{HivemindError, Result};
use crate::llm::LlmClient;

pub const MAX_FEATURES: usize = 500;
pub const MIN_DF: usize = 2;
pub const MAX_DF_RATIO: f64 = 0.8;
pub const MIN_MESSAGE_LENGTH: usize = 20;
pub const SAMPLE_LIMIT: i64 = 5000;
const KMEANS_ITERATIONS: usize = 25;
const KMEANS_SEED: u64 = 42;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicCluster {
    pub id: usize,
    pub top_terms: Vec<String>,
    pub message_count: usize,
    pub sample_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSnapshot {
    pub tenant_id: i64,
    pub built_at: String,
    pub clusters: Vec<TopicCluster>,
}

/// Cluster count scales with volume: min(8, max(3, n/10)).
pub fn cluster_count(message_count: usize) -> usize {
    (message_count / 10).clamp(3, 8)
}

/// 1-2 gram extraction over tokenized content.
fn ngrams(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let mut grams: Vec<String> = tokens.clone();
    for pair in tokens.windows(2) {
        grams.push(format!("{} {}", pair[0], pair[1]));
    }
    grams
}

struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
    idf: Vec<f32>,
}

/// Build the TF-IDF vocabulary: document-frequency bounds [MIN_DF,
/// MAX_DF_RATIO], top MAX_FEATURES terms by document frequency.
fn build_vocabulary(documents: &[Vec<String>]) -> Vocabulary {
    let n_docs = documents.len();
    let mut document_frequency: HashMap<&str, usize> = HashMap::new();

    for doc in documents {
        let mut seen: Vec<&str> = Vec::new();
        for gram in doc {
            if !seen.contains(&gram.as_str()) {
                seen.push(gram);
                *document_frequency.entry(gram).or_insert(0) += 1;
            }
        }
    }

    let max_df = (n_docs as f64 * MAX_DF_RATIO) as usize;
    let mut candidates: Vec<(&str, usize)> = document_frequency
        .into_iter()
        .filter(|(_, df)| *df >= MIN_DF && *df <= max_df.max(MIN_DF))
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    candidates.truncate(MAX_FEATURES);

    let terms: Vec<String> = candidates.iter().map(|(t, _)| t.to_string()).collect();
    let index: HashMap<String, usize> = terms
        .iter()
        .enumerate()
        .map(|(i, t)| (t.clone(), i))
        .collect();
    let idf: Vec<f32> = candidates
        .iter()
        .map(|(_, df)| ((n_docs as f32 + 1.0) / (*df as f32 + 1.0)).ln() + 1.0)
        .collect();

    Vocabulary { terms, index, idf }
}

fn vectorize(doc: &[String], vocabulary: &Vocabulary) -> Vec<f32> {
    let mut vector = vec![0f32; vocabulary.terms.len()];
    for gram in doc {
        if let Some(&i) = vocabulary.index.get(gram) {
            vector[i] += 1.0;
        }
    }
    for (i, value) in vector.iter_mut().enumerate() {
        *value *= vocabulary.idf[i];
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Lloyd's algorithm with a seeded RNG so rebuilds are reproducible.
fn kmeans(vectors: &[Vec<f32>], k: usize) -> (Vec<usize>, Vec<Vec<f32>>) {
    let mut rng = StdRng::seed_from_u64(KMEANS_SEED);
    let dim = vectors[0].len();

    let initial = sample(&mut rng, vectors.len(), k.min(vectors.len()));
    let mut centroids: Vec<Vec<f32>> = initial.iter().map(|i| vectors[i].clone()).collect();
    let mut labels = vec![0usize; vectors.len()];

    for _ in 0..KMEANS_ITERATIONS {
        let mut moved = false;
        for (i, vector) in vectors.iter().enumerate() {
            let mut best = 0;
            let mut best_distance = f32::MAX;
            for (c, centroid) in centroids.iter().enumerate() {
                let distance = squared_distance(vector, centroid);
                if distance < best_distance {
                    best_distance = distance;
                    best = c;
                }
            }
            if labels[i] != best {
                labels[i] = best;
                moved = true;
            }
        }

        let mut sums = vec![vec![0f32; dim]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (i, vector) in vectors.iter().enumerate() {
            counts[labels[i]] += 1;
            for (d, value) in vector.iter().enumerate() {
                sums[labels[i]][d] += value;
            }
        }
        for (c, centroid) in centroids.iter_mut().enumerate() {
            if counts[c] > 0 {
                for (d, value) in centroid.iter_mut().enumerate() {
                    *value = sums[c][d] / counts[c] as f32;
                }
            }
        }

        if !moved {
            break;
        }
    }

    (labels, centroids)
}

pub struct ThematicAnalyzer {
    cache_dir: PathBuf,
}

impl ThematicAnalyzer {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    fn cache_file(&self, tenant_id: i64) -> PathBuf {
        self.cache_dir.join(format!("tenant_{tenant_id}_topics.json"))
    }

    /// Cluster a message sample into topics and persist the snapshot.
    /// Returns None when the sample is too thin to cluster.
    pub fn rebuild(&self, tenant_id: i64, messages: &[String]) -> Result<Option<TopicSnapshot>> {
        let valid: Vec<&String> = messages
            .iter()
            .filter(|m| m.trim().len() > MIN_MESSAGE_LENGTH)
            .collect();
        if valid.len() < 10 {
            debug!("Tenant {}: {} usable messages, skipping clustering", tenant_id, valid.len());
            return Ok(None);
        }

        let k = cluster_count(valid.len());
        if valid.len() < k * 2 {
            return Ok(None);
        }

        let documents: Vec<Vec<String>> = valid.iter().map(|m| ngrams(m)).collect();
        let vocabulary = build_vocabulary(&documents);
        if vocabulary.terms.is_empty() {
            return Ok(None);
        }

        let vectors: Vec<Vec<f32>> = documents
            .iter()
            .map(|d| vectorize(d, &vocabulary))
            .collect();
        let (labels, centroids) = kmeans(&vectors, k);

        let mut clusters = Vec::new();
        for (c, centroid) in centroids.iter().enumerate() {
            let members: Vec<&str> = labels
                .iter()
                .enumerate()
                .filter(|(_, label)| **label == c)
                .map(|(i, _)| valid[i].as_str())
                .collect();
            if members.is_empty() {
                continue;
            }

            let mut weighted: Vec<(usize, f32)> = centroid
                .iter()
                .enumerate()
                .map(|(i, w)| (i, *w))
                .collect();
            weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            let top_terms: Vec<String> = weighted
                .iter()
                .take(6)
                .filter(|(_, w)| *w > 0.0)
                .map(|(i, _)| vocabulary.terms[*i].clone())
                .collect();

            clusters.push(TopicCluster {
                id: c,
                top_terms,
                message_count: members.len(),
                sample_messages: members.iter().take(3).map(|m| m.to_string()).collect(),
                summary: None,
            });
        }

        clusters.sort_by(|a, b| b.message_count.cmp(&a.message_count));

        let snapshot = TopicSnapshot {
            tenant_id,
            built_at: Utc::now().to_rfc3339(),
            clusters,
        };
        self.persist(&snapshot)?;
        info!(
            "Built {} topic clusters for tenant {} from {} messages",
            snapshot.clusters.len(),
            tenant_id,
            valid.len()
        );
        Ok(Some(snapshot))
    }

    fn persist(&self, snapshot: &TopicSnapshot) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| HivemindError::Validation(format!("cache dir: {e}")))?;
        let path = self.cache_file(snapshot.tenant_id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(snapshot)?)
            .map_err(|e| HivemindError::Validation(format!("cache write: {e}")))?;
        // Readers see either the old or the new snapshot, never a torn file.
        std::fs::rename(&tmp, &path)
            .map_err(|e| HivemindError::Validation(format!("cache replace: {e}")))?;
        Ok(())
    }

    pub fn load(&self, tenant_id: i64) -> Option<TopicSnapshot> {
        let raw = std::fs::read_to_string(self.cache_file(tenant_id)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn topics_summary(&self, tenant_id: i64) -> Option<String> {
        let snapshot = self.load(tenant_id)?;
        let lines: Vec<String> = snapshot
            .clusters
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "{}. **{}** ({} messages)",
                    i + 1,
                    c.top_terms.iter().take(4).cloned().collect::<Vec<_>>().join(", "),
                    c.message_count
                )
            })
            .collect();
        Some(lines.join("\n"))
    }

    /// Answer a broad thematic query grounded in the cached clusters.
    pub async fn answer(&self, tenant_id: i64, query: &str, llm: &LlmClient) -> String {
        let Some(snapshot) = self.load(tenant_id) else {
            return "Topic analysis hasn't been run for this community yet. \
                    Ask an admin to rebuild the topic cache first."
                .to_string();
        };

        let mut context_blocks = Vec::new();
        for (i, cluster) in snapshot.clusters.iter().take(10).enumerate() {
            let samples: Vec<String> = cluster
                .sample_messages
                .iter()
                .take(2)
                .map(|m| {
                    if m.chars().count() > 100 {
                        format!("\"{}...\"", crate::util::truncate_chars(m, 100))
                    } else {
                        format!("\"{m}\"")
                    }
                })
                .collect();
            context_blocks.push(format!(
                "Topic {} ({} messages): {}\n  Examples:\n    {}",
                i + 1,
                cluster.message_count,
                cluster.top_terms.join(", "),
                samples.join("\n    ")
            ));
        }
        let context = context_blocks.join("\n\n");

        let prompt = format!(
            "Based on these topic clusters identified from community conversations:\n\n\
             {context}\n\n\
             Answer the user's question: {query}\n\n\
             Synthesize information across the topic clusters to give a comprehensive \
             answer. Be specific about which topics are most discussed. If the question \
             can't be answered from the topics, say so."
        );

        match llm.generate("You analyze community discussion topics.", &prompt).await {
            Ok(answer) => answer,
            Err(_) => {
                let summary = self.topics_summary(tenant_id).unwrap_or_default();
                format!("Here are the main topics discussed in this community:\n\n{summary}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        let mut messages = Vec::new();
        for i in 0..15 {
            messages.push(format!(
                "the database migration keeps failing on foreign keys, attempt {i}"
            ));
            messages.push(format!(
                "frontend rendering performance is slow on the dashboard page {i}"
            ));
            messages.push(format!(
                "deployment pipeline broke again in the docker build stage {i}"
            ));
        }
        messages
    }

    #[test]
    fn cluster_count_bounds() {
        assert_eq!(cluster_count(10), 3);
        assert_eq!(cluster_count(35), 3);
        assert_eq!(cluster_count(50), 5);
        assert_eq!(cluster_count(10_000), 8);
    }

    #[test]
    fn rebuild_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = ThematicAnalyzer::new(dir.path());

        let snapshot = analyzer.rebuild(1, &corpus()).unwrap().unwrap();
        assert!(!snapshot.clusters.is_empty());
        assert!(snapshot.clusters.iter().all(|c| c.message_count > 0));
        assert!(snapshot.clusters.iter().all(|c| c.sample_messages.len() <= 3));

        // Counts are sorted descending.
        let counts: Vec<usize> = snapshot.clusters.iter().map(|c| c.message_count).collect();
        let mut sorted = counts.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(counts, sorted);

        let loaded = analyzer.load(1).unwrap();
        assert_eq!(loaded.clusters.len(), snapshot.clusters.len());
    }

    #[test]
    fn rebuild_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = ThematicAnalyzer::new(dir.path());
        let a = analyzer.rebuild(1, &corpus()).unwrap().unwrap();
        let b = analyzer.rebuild(1, &corpus()).unwrap().unwrap();
        let terms_a: Vec<_> = a.clusters.iter().map(|c| c.top_terms.clone()).collect();
        let terms_b: Vec<_> = b.clusters.iter().map(|c| c.top_terms.clone()).collect();
        assert_eq!(terms_a, terms_b);
    }

    #[test]
    fn thin_samples_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = ThematicAnalyzer::new(dir.path());
        let few = vec!["short".to_string(); 5];
        assert!(analyzer.rebuild(1, &few).unwrap().is_none());
        assert!(analyzer.load(1).is_none());
    }

    #[test]
    fn short_messages_are_filtered_from_the_sample() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = ThematicAnalyzer::new(dir.path());
        let mut messages = corpus();
        for _ in 0..100 {
            messages.push("ok".to_string());
        }
        let snapshot = analyzer.rebuild(1, &messages).unwrap().unwrap();
        let total: usize = snapshot.clusters.iter().map(|c| c.message_count).sum();
        assert_eq!(total, corpus().len());
    }
}
