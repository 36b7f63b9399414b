//! Similarity retrieval over precomputed fragment embeddings
//!
//! Fragments are chunks of repository content with an embedding computed
//! elsewhere. Retrieval is a pure read path used to supply file-level
//! evidence for semantic weaves.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Default neighbors fetched per source fragment
pub const DEFAULT_NEIGHBORS: usize = 5;

/// A chunk of repository content with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: String,
    pub repo_id: String,
    /// Path of the owning file, relative to the repository root
    pub file_path: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl Fragment {
    pub fn new(
        repo_id: impl Into<String>,
        file_path: impl Into<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            repo_id: repo_id.into(),
            file_path: file_path.into(),
            content: content.into(),
            embedding,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A pair of fragments from two repositories and their similarity
#[derive(Debug, Clone)]
pub struct FragmentMatch {
    pub source: Fragment,
    pub target: Fragment,
    pub similarity: f32,
}

/// Nearest-neighbor index over fragment embeddings
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store a fragment, replacing any fragment with the same id
    async fn store(&self, fragment: &Fragment) -> Result<()>;

    /// All fragments of a repository, ordered by file path
    async fn fragments_for_repo(&self, repo_id: &str) -> Result<Vec<Fragment>>;

    /// Top `k` fragments by cosine similarity to `vector`, best first
    async fn query(
        &self,
        repo_filter: Option<&str>,
        vector: &[f32],
        k: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<(Fragment, f32)>>;

    /// The subset of `repo_ids` with at least one stored fragment, in input order
    async fn repos_with_embeddings(&self, repo_ids: &[String]) -> Result<Vec<String>>;
}

/// Cosine similarity; mismatched dimensions or zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Little-endian f32 encoding used for embedding blobs
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of [`embedding_to_bytes`]; a trailing partial float is ignored
pub fn embedding_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Score fragments against `vector`, keep the best `k` strictly above the floor
pub fn rank_fragments(
    fragments: impl IntoIterator<Item = Fragment>,
    vector: &[f32],
    k: usize,
    min_similarity: Option<f32>,
) -> Vec<(Fragment, f32)> {
    let mut scored: Vec<(Fragment, f32)> = fragments
        .into_iter()
        .map(|fragment| {
            let similarity = cosine_similarity(vector, &fragment.embedding);
            (fragment, similarity)
        })
        .filter(|(_, similarity)| min_similarity.is_none_or(|floor| *similarity > floor))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
}

/// Finds similar fragment pairs between two repositories
#[derive(Clone)]
pub struct SimilarityRetriever {
    index: Arc<dyn VectorIndex>,
    neighbors: usize,
}

impl SimilarityRetriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            index,
            neighbors: DEFAULT_NEIGHBORS,
        }
    }

    /// Neighbors fetched per source fragment (at least 1)
    pub fn with_neighbors(mut self, neighbors: usize) -> Self {
        self.neighbors = neighbors.max(1);
        self
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Fragment pairs with similarity strictly above `threshold`, best first,
    /// at most `max_results`
    pub async fn find_similar(
        &self,
        source_repo: &str,
        target_repo: &str,
        threshold: f32,
        max_results: usize,
    ) -> Result<Vec<FragmentMatch>> {
        let mut matches = Vec::new();

        for source in self.index.fragments_for_repo(source_repo).await? {
            let neighbors = self
                .index
                .query(
                    Some(target_repo),
                    &source.embedding,
                    self.neighbors,
                    Some(threshold),
                )
                .await?;

            for (target, similarity) in neighbors {
                matches.push(FragmentMatch {
                    source: source.clone(),
                    target,
                    similarity,
                });
            }
        }

        sort_matches(&mut matches);
        matches.truncate(max_results);

        debug!(
            source_repo = %source_repo,
            target_repo = %target_repo,
            threshold,
            matches = matches.len(),
            "Similar fragments retrieved"
        );
        Ok(matches)
    }

    /// The single best target fragment per source fragment, no threshold
    pub async fn best_matches(
        &self,
        source_repo: &str,
        target_repo: &str,
    ) -> Result<Vec<FragmentMatch>> {
        let mut matches = Vec::new();

        for source in self.index.fragments_for_repo(source_repo).await? {
            let best = self
                .index
                .query(Some(target_repo), &source.embedding, 1, None)
                .await?
                .into_iter()
                .next();

            if let Some((target, similarity)) = best {
                matches.push(FragmentMatch {
                    source,
                    target,
                    similarity,
                });
            }
        }

        sort_matches(&mut matches);
        Ok(matches)
    }
}

fn sort_matches(matches: &mut [FragmentMatch]) {
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.source.file_path.cmp(&b.source.file_path))
            .then_with(|| a.target.file_path.cmp(&b.target.file_path))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryIndex {
        fragments: Mutex<Vec<Fragment>>,
    }

    #[async_trait]
    impl VectorIndex for MemoryIndex {
        async fn store(&self, fragment: &Fragment) -> Result<()> {
            let mut fragments = self.fragments.lock().unwrap();
            fragments.retain(|f| f.id != fragment.id);
            fragments.push(fragment.clone());
            Ok(())
        }

        async fn fragments_for_repo(&self, repo_id: &str) -> Result<Vec<Fragment>> {
            let fragments = self.fragments.lock().unwrap();
            Ok(fragments.iter().filter(|f| f.repo_id == repo_id).cloned().collect())
        }

        async fn query(
            &self,
            repo_filter: Option<&str>,
            vector: &[f32],
            k: usize,
            min_similarity: Option<f32>,
        ) -> Result<Vec<(Fragment, f32)>> {
            let fragments = self.fragments.lock().unwrap().clone();
            let candidates = fragments
                .into_iter()
                .filter(|f| repo_filter.is_none_or(|repo| f.repo_id == repo));
            Ok(rank_fragments(candidates, vector, k, min_similarity))
        }

        async fn repos_with_embeddings(&self, repo_ids: &[String]) -> Result<Vec<String>> {
            let fragments = self.fragments.lock().unwrap();
            Ok(repo_ids
                .iter()
                .filter(|id| fragments.iter().any(|f| &f.repo_id == *id))
                .cloned()
                .collect())
        }
    }

    async fn seeded() -> SimilarityRetriever {
        let index = Arc::new(MemoryIndex::default());
        for fragment in [
            Fragment::new("a", "src/tokens.rs", "tokens", vec![1.0, 0.0, 0.0]),
            Fragment::new("a", "src/render.rs", "render", vec![0.0, 1.0, 0.0]),
            Fragment::new("b", "lib/theme.ts", "theme", vec![0.9, 0.1, 0.0]),
            Fragment::new("b", "lib/other.ts", "other", vec![0.0, 0.0, 1.0]),
        ] {
            index.store(&fragment).await.unwrap();
        }
        SimilarityRetriever::new(index)
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 0.001);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_embedding_bytes() {
        let embedding = vec![0.25, -1.5, 3.0];
        let bytes = embedding_to_bytes(&embedding);
        assert_eq!(bytes.len(), 12);
        assert_eq!(embedding_from_bytes(&bytes), embedding);
        assert_eq!(embedding_from_bytes(&bytes[..7]), vec![0.25]);
    }

    #[tokio::test]
    async fn test_find_similar_applies_threshold() {
        let retriever = seeded().await;

        let matches = retriever.find_similar("a", "b", 0.8, 50).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].source.file_path, "src/tokens.rs");
        assert_eq!(matches[0].target.file_path, "lib/theme.ts");
        assert!(matches[0].similarity > 0.99);
    }

    #[test]
    fn test_rank_fragments_floor_is_exclusive() {
        let fragments = vec![
            Fragment::new("a", "same.rs", "", vec![1.0, 0.0]),
            Fragment::new("a", "close.rs", "", vec![0.9, 0.1]),
        ];

        let ranked = rank_fragments(fragments.clone(), &[1.0, 0.0], 10, Some(1.0));
        assert!(ranked.is_empty());

        let ranked = rank_fragments(fragments, &[1.0, 0.0], 10, Some(0.99));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.file_path, "same.rs");
    }

    #[tokio::test]
    async fn test_find_similar_caps_results() {
        let retriever = seeded().await;

        let matches = retriever.find_similar("a", "b", -1.0, 3).await.unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[tokio::test]
    async fn test_best_matches_ignores_threshold() {
        let retriever = seeded().await;

        let best = retriever.best_matches("a", "b").await.unwrap();
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].target.file_path, "lib/theme.ts");
        assert_eq!(best[1].source.file_path, "src/render.rs");
    }

    #[tokio::test]
    async fn test_unknown_repo_yields_nothing() {
        let retriever = seeded().await;
        assert!(retriever.find_similar("missing", "b", 0.0, 10).await.unwrap().is_empty());
        assert!(retriever.best_matches("a", "missing").await.unwrap().is_empty());
    }
}
