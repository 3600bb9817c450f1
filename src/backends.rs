use crate::database::{
    DocumentStore, DuplicatePolicy, InMemoryDocumentStore, SimilarityFunction,
};
use crate::document::Document;
use crate::embeddings::{Embedding, HashingEmbedder, TextEmbedder};
use crate::gemini::{GeminiConfig, GeminiEmbedder};
use crate::huggingface::{
    HuggingFaceClient, HuggingFaceConfig, HuggingFaceEmbedder, HuggingFaceReader,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_READER_MODEL,
};
use crate::lexical::LexicalExtractor;
use crate::qdrant::{QdrantConfig, QdrantDocumentStore};
use crate::reader::{SpanCandidate, SpanExtractor};
use anyhow::{Context, Result};
use clap::ValueEnum;
use log::{info, warn};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EmbedderKind {
    /// Local feature-hashing embedder
    #[default]
    Hashing,
    /// Gemini embedContent API
    Gemini,
    /// Hugging Face feature-extraction API
    Huggingface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StoreKind {
    #[default]
    Memory,
    Qdrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReaderKind {
    /// Local heuristic reader
    #[default]
    Lexical,
    /// Hugging Face question-answering API
    Huggingface,
}

/// Embedder chosen at runtime
#[derive(Clone)]
pub enum Embedder {
    Hashing(HashingEmbedder),
    Gemini(GeminiEmbedder),
    HuggingFace(HuggingFaceEmbedder),
}

impl Embedder {
    /// Build the embedder, reading remote credentials from the environment
    pub fn from_kind(kind: EmbedderKind, model: Option<&str>) -> Result<Self> {
        let embedder = match kind {
            EmbedderKind::Hashing => {
                if let Some(model) = model {
                    warn!("Hashing embedder ignores model {}", model);
                }
                Embedder::Hashing(HashingEmbedder::default())
            }
            EmbedderKind::Gemini => {
                let mut config = GeminiConfig::from_env().context("Missing GEMINI_API_KEY")?;
                if let Some(model) = model {
                    config = config.with_model(model);
                }
                Embedder::Gemini(GeminiEmbedder::new(config))
            }
            EmbedderKind::Huggingface => {
                let client = HuggingFaceClient::new(HuggingFaceConfig::from_env()?);
                Embedder::HuggingFace(HuggingFaceEmbedder::new(
                    client,
                    model.unwrap_or(DEFAULT_EMBEDDING_MODEL),
                ))
            }
        };
        info!("Using embedder {}", embedder.model());
        Ok(embedder)
    }
}

impl TextEmbedder for Embedder {
    fn model(&self) -> &str {
        match self {
            Embedder::Hashing(e) => e.model(),
            Embedder::Gemini(e) => e.model(),
            Embedder::HuggingFace(e) => e.model(),
        }
    }

    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        match self {
            Embedder::Hashing(e) => e.embed_text(text).await,
            Embedder::Gemini(e) => e.embed_text(text).await,
            Embedder::HuggingFace(e) => e.embed_text(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        match self {
            Embedder::Hashing(e) => e.embed_batch(texts).await,
            Embedder::Gemini(e) => e.embed_batch(texts).await,
            Embedder::HuggingFace(e) => e.embed_batch(texts).await,
        }
    }
}

/// Document store chosen at runtime; clones share the same documents
#[derive(Clone)]
pub enum Store {
    Memory(InMemoryDocumentStore),
    Qdrant(Arc<QdrantDocumentStore>),
}

impl Store {
    pub fn from_kind(kind: StoreKind, similarity: SimilarityFunction) -> Result<Self> {
        match kind {
            StoreKind::Memory => Ok(Store::Memory(InMemoryDocumentStore::new(similarity))),
            StoreKind::Qdrant => {
                let config = QdrantConfig::from_env().context("Missing QDRANT_URL")?;
                let store = QdrantDocumentStore::new(config, similarity)?;
                info!("Using Qdrant collection {}", store.collection_name());
                Ok(Store::Qdrant(Arc::new(store)))
            }
        }
    }
}

impl DocumentStore for Store {
    async fn count_documents(&self) -> Result<usize> {
        match self {
            Store::Memory(s) => s.count_documents().await,
            Store::Qdrant(s) => s.count_documents().await,
        }
    }

    async fn write_documents(
        &self,
        documents: Vec<Document>,
        policy: DuplicatePolicy,
    ) -> Result<usize> {
        match self {
            Store::Memory(s) => s.write_documents(documents, policy).await,
            Store::Qdrant(s) => s.write_documents(documents, policy).await,
        }
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<()> {
        match self {
            Store::Memory(s) => s.delete_documents(ids).await,
            Store::Qdrant(s) => s.delete_documents(ids).await,
        }
    }

    async fn embedding_retrieval(
        &self,
        query_embedding: &Embedding,
        top_k: usize,
        scale_score: bool,
        return_embedding: bool,
    ) -> Result<Vec<Document>> {
        match self {
            Store::Memory(s) => {
                s.embedding_retrieval(query_embedding, top_k, scale_score, return_embedding)
                    .await
            }
            Store::Qdrant(s) => {
                s.embedding_retrieval(query_embedding, top_k, scale_score, return_embedding)
                    .await
            }
        }
    }
}

/// Span extractor chosen at runtime
#[derive(Clone)]
pub enum Extractor {
    Lexical(LexicalExtractor),
    HuggingFace(HuggingFaceReader),
}

impl Extractor {
    pub fn from_kind(kind: ReaderKind, model: Option<&str>) -> Result<Self> {
        let extractor = match kind {
            ReaderKind::Lexical => {
                if let Some(model) = model {
                    warn!("Lexical reader ignores model {}", model);
                }
                Extractor::Lexical(LexicalExtractor::new())
            }
            ReaderKind::Huggingface => {
                let client = HuggingFaceClient::new(HuggingFaceConfig::from_env()?);
                Extractor::HuggingFace(HuggingFaceReader::new(
                    client,
                    model.unwrap_or(DEFAULT_READER_MODEL),
                ))
            }
        };
        info!("Using reader {}", extractor.model());
        Ok(extractor)
    }
}

impl SpanExtractor for Extractor {
    fn model(&self) -> &str {
        match self {
            Extractor::Lexical(x) => x.model(),
            Extractor::HuggingFace(x) => x.model(),
        }
    }

    async fn extract(
        &self,
        query: &str,
        document: &Document,
        max_candidates: usize,
    ) -> Result<Vec<SpanCandidate>> {
        match self {
            Extractor::Lexical(x) => x.extract(query, document, max_candidates).await,
            Extractor::HuggingFace(x) => x.extract(query, document, max_candidates).await,
        }
    }
}
