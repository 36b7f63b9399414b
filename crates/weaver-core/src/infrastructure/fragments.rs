//! SQLite fragment index
//!
//! Embeddings are stored as little-endian f32 blobs and scored in process.

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use super::parse_timestamp;
use crate::error::Result;
use crate::retrieval::{
    Fragment, VectorIndex, embedding_from_bytes, embedding_to_bytes, rank_fragments,
};

/// Fragment index stored in the `fragments` table
#[derive(Clone)]
pub struct SqliteFragmentIndex {
    pool: SqlitePool,
}

impl SqliteFragmentIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of stored fragments of a repository
    pub async fn count_for_repo(&self, repo_id: &str) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM fragments WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorIndex for SqliteFragmentIndex {
    async fn store(&self, fragment: &Fragment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fragments (id, repo_id, file_path, content, embedding, dimensions, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                repo_id = excluded.repo_id,
                file_path = excluded.file_path,
                content = excluded.content,
                embedding = excluded.embedding,
                dimensions = excluded.dimensions
            "#,
        )
        .bind(&fragment.id)
        .bind(&fragment.repo_id)
        .bind(&fragment.file_path)
        .bind(&fragment.content)
        .bind(embedding_to_bytes(&fragment.embedding))
        .bind(fragment.embedding.len() as i64)
        .bind(fragment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(fragment_id = %fragment.id, repo_id = %fragment.repo_id, "Fragment stored");
        Ok(())
    }

    async fn fragments_for_repo(&self, repo_id: &str) -> Result<Vec<Fragment>> {
        let rows: Vec<FragmentRow> = sqlx::query_as(
            "SELECT * FROM fragments WHERE repo_id = ? ORDER BY file_path, id",
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FragmentRow::into_fragment).collect()
    }

    async fn query(
        &self,
        repo_filter: Option<&str>,
        vector: &[f32],
        k: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<(Fragment, f32)>> {
        let rows: Vec<FragmentRow> = match repo_filter {
            Some(repo_id) => {
                sqlx::query_as("SELECT * FROM fragments WHERE repo_id = ? AND dimensions = ?")
                    .bind(repo_id)
                    .bind(vector.len() as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM fragments WHERE dimensions = ?")
                    .bind(vector.len() as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let fragments = rows
            .into_iter()
            .map(FragmentRow::into_fragment)
            .collect::<Result<Vec<_>>>()?;

        Ok(rank_fragments(fragments, vector, k, min_similarity))
    }

    async fn repos_with_embeddings(&self, repo_ids: &[String]) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT repo_id FROM fragments")
            .fetch_all(&self.pool)
            .await?;

        Ok(repo_ids
            .iter()
            .filter(|id| rows.iter().any(|(repo_id,)| repo_id == *id))
            .cloned()
            .collect())
    }
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct FragmentRow {
    id: String,
    repo_id: String,
    file_path: String,
    content: String,
    embedding: Vec<u8>,
    #[allow(dead_code)]
    dimensions: i64,
    created_at: String,
}

impl FragmentRow {
    fn into_fragment(self) -> Result<Fragment> {
        Ok(Fragment {
            created_at: parse_timestamp("fragments.created_at", &self.created_at)?,
            embedding: embedding_from_bytes(&self.embedding),
            id: self.id,
            repo_id: self.repo_id,
            file_path: self.file_path,
            content: self.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn setup() -> SqliteFragmentIndex {
        let db = Database::in_memory().await.unwrap();
        let index = SqliteFragmentIndex::new(db.pool().clone());
        for fragment in [
            Fragment::new("a", "src/tokens.rs", "tokens", vec![1.0, 0.0]).with_id("a1"),
            Fragment::new("b", "lib/theme.ts", "theme", vec![0.8, 0.6]).with_id("b1"),
            Fragment::new("b", "lib/other.ts", "other", vec![0.0, 1.0]).with_id("b2"),
            Fragment::new("c", "x.py", "wide", vec![1.0, 0.0, 0.0]).with_id("c1"),
        ] {
            index.store(&fragment).await.unwrap();
        }
        index
    }

    #[tokio::test]
    async fn test_store_and_load_embeddings() {
        let index = setup().await;
        let fragments = index.fragments_for_repo("b").await.unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].file_path, "lib/other.ts");
        assert_eq!(fragments[1].embedding, vec![0.8, 0.6]);
    }

    #[tokio::test]
    async fn test_store_replaces_by_id() {
        let index = setup().await;
        index
            .store(&Fragment::new("b", "lib/theme.ts", "changed", vec![0.0, 1.0]).with_id("b1"))
            .await
            .unwrap();
        assert_eq!(index.count_for_repo("b").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_query_filters_and_ranks() {
        let index = setup().await;

        let results = index.query(Some("b"), &[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.id, "b1");
        assert!((results[0].1 - 0.8).abs() < 1e-6);

        let floored = index.query(Some("b"), &[1.0, 0.0], 5, Some(0.5)).await.unwrap();
        assert_eq!(floored.len(), 1);

        // Only same-dimension fragments are candidates
        let all = index.query(None, &[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].0.id, "a1");
    }

    #[tokio::test]
    async fn test_repos_with_embeddings_preserves_order() {
        let index = setup().await;
        let repos = index
            .repos_with_embeddings(&["c".into(), "missing".into(), "a".into()])
            .await
            .unwrap();
        assert_eq!(repos, vec!["c".to_string(), "a".to_string()]);
    }
}
