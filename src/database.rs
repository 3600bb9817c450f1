use crate::document::{Document, Meta};
use crate::embeddings::Embedding;
use anyhow::Result;
use clap::ValueEnum;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// How stored vectors are compared with a query vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SimilarityFunction {
    #[default]
    DotProduct,
    Cosine,
}

impl SimilarityFunction {
    pub fn compare(self, query: &Embedding, stored: &Embedding) -> f32 {
        match self {
            SimilarityFunction::DotProduct => query.dot(stored),
            SimilarityFunction::Cosine => query.cosine(stored),
        }
    }
}

/// Map a raw similarity into [0, 1]
pub fn scale_similarity(similarity: SimilarityFunction, score: f32) -> f64 {
    let score = score as f64;
    match similarity {
        SimilarityFunction::DotProduct => 1.0 / (1.0 + (-score / 100.0).exp()),
        SimilarityFunction::Cosine => (score + 1.0) / 2.0,
    }
}

/// What to do when a written document id is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DuplicatePolicy {
    /// Reject the whole batch
    #[default]
    Fail,
    /// Keep the stored document
    Skip,
    /// Replace the stored document
    Overwrite,
}

/// A container of documents queryable by vector similarity
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Number of stored documents
    async fn count_documents(&self) -> Result<usize>;

    /// Store documents, returning how many were written
    async fn write_documents(&self, documents: Vec<Document>, policy: DuplicatePolicy)
        -> Result<usize>;

    /// Remove documents by id; unknown ids are ignored
    async fn delete_documents(&self, ids: &[String]) -> Result<()>;

    /// Top `top_k` documents by decreasing similarity to the query vector
    async fn embedding_retrieval(
        &self,
        query_embedding: &Embedding,
        top_k: usize,
        scale_score: bool,
        return_embedding: bool,
    ) -> Result<Vec<Document>>;
}

#[derive(Default)]
struct StoreState {
    /// Ids in insertion order
    order: Vec<String>,
    documents: HashMap<String, Document>,
}

/// Document store held in process memory.
///
/// Cloning yields another handle onto the same documents, so an indexing
/// pipeline and a query pipeline can share one store.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<StoreState>>,
    similarity: SimilarityFunction,
}

impl InMemoryDocumentStore {
    pub fn new(similarity: SimilarityFunction) -> Self {
        InMemoryDocumentStore {
            state: Arc::default(),
            similarity,
        }
    }

    pub fn similarity(&self) -> SimilarityFunction {
        self.similarity
    }

    /// Documents whose metadata contains every pair in `filter`, in insertion order
    pub async fn filter_documents(&self, filter: &Meta) -> Vec<Document> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.documents.get(id))
            .filter(|doc| {
                filter
                    .iter()
                    .all(|(key, value)| doc.meta.get(key) == Some(value))
            })
            .cloned()
            .collect()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    async fn count_documents(&self) -> Result<usize> {
        Ok(self.state.read().await.documents.len())
    }

    async fn write_documents(
        &self,
        documents: Vec<Document>,
        policy: DuplicatePolicy,
    ) -> Result<usize> {
        let mut state = self.state.write().await;

        if policy == DuplicatePolicy::Fail {
            // Validate the whole batch before touching the store
            let mut seen = HashSet::new();
            for doc in &documents {
                if state.documents.contains_key(&doc.id) || !seen.insert(doc.id.as_str()) {
                    anyhow::bail!("ID '{}' already exists in the document store", doc.id);
                }
            }
        }

        let mut written = 0;
        for mut doc in documents {
            doc.score = None;
            let exists = state.documents.contains_key(&doc.id);
            match (exists, policy) {
                (true, DuplicatePolicy::Skip) => {
                    debug!("Skipping duplicate document {}", doc.id);
                    continue;
                }
                (true, _) => {}
                (false, _) => state.order.push(doc.id.clone()),
            }
            state.documents.insert(doc.id.clone(), doc);
            written += 1;
        }

        Ok(written)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<()> {
        let mut state = self.state.write().await;
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        state.order.retain(|id| !ids.contains(id.as_str()));
        state.documents.retain(|id, _| !ids.contains(id.as_str()));
        Ok(())
    }

    async fn embedding_retrieval(
        &self,
        query_embedding: &Embedding,
        top_k: usize,
        scale_score: bool,
        return_embedding: bool,
    ) -> Result<Vec<Document>> {
        if query_embedding.is_empty() {
            anyhow::bail!("Query embedding must not be empty");
        }

        let state = self.state.read().await;
        let mut scored: Vec<(f32, &Document)> = Vec::new();
        let mut missing = 0;

        for doc in state.order.iter().filter_map(|id| state.documents.get(id)) {
            let Some(embedding) = doc.embedding.as_ref() else {
                missing += 1;
                continue;
            };
            if embedding.dimension() != query_embedding.dimension() {
                anyhow::bail!(
                    "Query embedding has dimension {} but document {} has dimension {}",
                    query_embedding.dimension(),
                    doc.id,
                    embedding.dimension()
                );
            }
            scored.push((self.similarity.compare(query_embedding, embedding), doc));
        }

        if missing > 0 {
            warn!(
                "{} documents have no embedding and were skipped during retrieval",
                missing
            );
        }

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let results = scored
            .into_iter()
            .take(top_k)
            .map(|(score, doc)| {
                let mut doc = doc.clone();
                doc.score = Some(if scale_score {
                    scale_similarity(self.similarity, score)
                } else {
                    score as f64
                });
                if !return_embedding {
                    doc.embedding = None;
                }
                doc
            })
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn doc(content: &str, values: Vec<f32>) -> Document {
        let mut doc = Document::new(content);
        doc.embedding = Some(Embedding::new(values));
        doc
    }

    #[tokio::test]
    async fn test_retrieval_orders_by_similarity() {
        let store = InMemoryDocumentStore::default();
        store
            .write_documents(
                vec![
                    doc("low", vec![0.1, 0.0]),
                    doc("high", vec![1.0, 0.0]),
                    doc("mid", vec![0.5, 0.5]),
                ],
                DuplicatePolicy::Fail,
            )
            .await
            .unwrap();

        let query = Embedding::new(vec![1.0, 0.0]);
        let results = store
            .embedding_retrieval(&query, 2, false, false)
            .await
            .unwrap();

        let contents: Vec<&str> = results.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["high", "mid"]);
        assert_eq!(results[0].score, Some(1.0));
        assert!(results[0].embedding.is_none());
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = InMemoryDocumentStore::default();
        store
            .write_documents(
                vec![doc("first", vec![1.0]), doc("second", vec![1.0])],
                DuplicatePolicy::Fail,
            )
            .await
            .unwrap();

        let results = store
            .embedding_retrieval(&Embedding::new(vec![1.0]), 10, false, true)
            .await
            .unwrap();
        assert_eq!(results[0].content, "first");
        assert_eq!(results[1].content, "second");
        assert!(results[0].embedding.is_some());
    }

    #[tokio::test]
    async fn test_scale_score() {
        let store = InMemoryDocumentStore::new(SimilarityFunction::Cosine);
        store
            .write_documents(vec![doc("opposite", vec![-1.0, 0.0])], DuplicatePolicy::Fail)
            .await
            .unwrap();

        let results = store
            .embedding_retrieval(&Embedding::new(vec![1.0, 0.0]), 1, true, false)
            .await
            .unwrap();
        assert_eq!(results[0].score, Some(0.0));

        assert!((scale_similarity(SimilarityFunction::DotProduct, 0.0) - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_duplicate_policies() {
        let store = InMemoryDocumentStore::default();
        let original = doc("same text", vec![1.0]);
        store
            .write_documents(vec![original.clone()], DuplicatePolicy::Fail)
            .await
            .unwrap();

        let err = store
            .write_documents(
                vec![doc("new text", vec![1.0]), original.clone()],
                DuplicatePolicy::Fail,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        // Failed batch writes nothing
        assert_eq!(store.count_documents().await.unwrap(), 1);

        let written = store
            .write_documents(vec![original.clone()], DuplicatePolicy::Skip)
            .await
            .unwrap();
        assert_eq!(written, 0);

        let mut replacement = original.clone();
        replacement.embedding = Some(Embedding::new(vec![2.0]));
        let written = store
            .write_documents(vec![replacement], DuplicatePolicy::Overwrite)
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.count_documents().await.unwrap(), 1);

        let results = store
            .embedding_retrieval(&Embedding::new(vec![1.0]), 1, false, false)
            .await
            .unwrap();
        assert_eq!(results[0].score, Some(2.0));
    }

    #[tokio::test]
    async fn test_skips_unembedded_and_rejects_mismatch() {
        let store = InMemoryDocumentStore::default();
        store
            .write_documents(
                vec![Document::new("no vector"), doc("vector", vec![1.0, 0.0])],
                DuplicatePolicy::Fail,
            )
            .await
            .unwrap();

        let results = store
            .embedding_retrieval(&Embedding::new(vec![1.0, 0.0]), 5, false, false)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        assert!(store
            .embedding_retrieval(&Embedding::new(vec![1.0]), 5, false, false)
            .await
            .is_err());
        assert!(store
            .embedding_retrieval(&Embedding::new(vec![]), 5, false, false)
            .await
            .is_err());
        assert!(store
            .embedding_retrieval(&Embedding::new(vec![1.0, 0.0]), 0, false, false)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_filter_and_delete() {
        let store = InMemoryDocumentStore::default();
        let mut meta = Meta::new();
        meta.insert("name".to_string(), Value::from("text3"));
        let tagged = Document::with_meta("Team C", meta.clone());
        let tagged_id = tagged.id.clone();
        store
            .write_documents(vec![tagged, Document::new("City B")], DuplicatePolicy::Fail)
            .await
            .unwrap();

        let found = store.filter_documents(&meta).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "Team C");
        assert_eq!(store.filter_documents(&Meta::new()).await.len(), 2);

        store.delete_documents(&[tagged_id]).await.unwrap();
        assert_eq!(store.count_documents().await.unwrap(), 1);
        assert!(store.filter_documents(&meta).await.is_empty());
    }
}
