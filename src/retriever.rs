use crate::database::DocumentStore;
use crate::document::Document;
use crate::embeddings::Embedding;
use anyhow::Result;
use log::debug;

pub const DEFAULT_TOP_K: usize = 10;

/// Fetches the documents closest to a query embedding from a store
pub struct EmbeddingRetriever<S> {
    store: S,
    top_k: usize,
    scale_score: bool,
    return_embedding: bool,
}

impl<S: DocumentStore> EmbeddingRetriever<S> {
    pub fn new(store: S) -> Self {
        EmbeddingRetriever {
            store,
            top_k: DEFAULT_TOP_K,
            scale_score: false,
            return_embedding: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Result<Self> {
        if top_k == 0 {
            anyhow::bail!("top_k must be greater than 0, got {}", top_k);
        }
        self.top_k = top_k;
        Ok(self)
    }

    pub fn with_scale_score(mut self, scale_score: bool) -> Self {
        self.scale_score = scale_score;
        self
    }

    pub fn with_return_embedding(mut self, return_embedding: bool) -> Self {
        self.return_embedding = return_embedding;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Retrieve documents; `top_k` overrides the configured default for this call
    pub async fn run(
        &self,
        query_embedding: &Embedding,
        top_k: Option<usize>,
    ) -> Result<Vec<Document>> {
        let top_k = top_k.unwrap_or(self.top_k);
        if top_k == 0 {
            anyhow::bail!("top_k must be greater than 0, got {}", top_k);
        }
        let documents = self
            .store
            .embedding_retrieval(
                query_embedding,
                top_k,
                self.scale_score,
                self.return_embedding,
            )
            .await?;
        debug!("Retrieved {} documents (top_k = {})", documents.len(), top_k);
        Ok(documents)
    }
}
