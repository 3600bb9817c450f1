use crate::document::Document;
use crate::text::content_terms;
use anyhow::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default dimension, matching the sentence-transformers mpnet models
pub const DEFAULT_DIMENSION: usize = 768;

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Embedding { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Dot product; callers check dimensions
    pub fn dot(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Cosine similarity, 0.0 when either side is the zero vector
    pub fn cosine(&self, other: &Embedding) -> f32 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            0.0
        } else {
            self.dot(other) / denom
        }
    }

    /// Scale to unit length in place
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for v in &mut self.values {
                *v /= norm;
            }
        }
    }
}

/// Maps text to a fixed-length vector
#[allow(async_fn_in_trait)]
pub trait TextEmbedder {
    /// Name of the model behind this embedder
    fn model(&self) -> &str;

    /// Generate the embedding for one text
    async fn embed_text(&self, text: &str) -> Result<Embedding>;

    /// Generate embeddings for multiple texts, in order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text).await?);
        }
        Ok(embeddings)
    }
}

/// Local embedder based on signed feature hashing of unigrams and bigrams.
///
/// It has no notion of synonyms; it exists so pipelines run offline and
/// deterministically. Vectors are unit length, so dot product and cosine agree.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model: String,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        HashingEmbedder {
            dimension: dimension.max(1),
            model: format!("hashing-{}", dimension.max(1)),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Synchronous embedding; the trait method delegates here
    pub fn embed(&self, text: &str) -> Embedding {
        let mut values = vec![0.0f32; self.dimension];
        let terms = content_terms(text);

        for term in &terms {
            self.accumulate(&mut values, term, 1.0);
        }
        for pair in terms.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut values, &bigram, 0.5);
        }

        let mut embedding = Embedding::new(values);
        embedding.normalize();
        embedding
    }

    fn accumulate(&self, values: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        values[bucket] += sign * weight;
    }
}

impl TextEmbedder for HashingEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed(text))
    }
}

/// Embeds documents, optionally prefixing selected meta fields to the content
#[derive(Debug, Clone)]
pub struct DocumentEmbedder<E> {
    embedder: E,
    meta_fields_to_embed: Vec<String>,
    embedding_separator: String,
    batch_size: usize,
}

impl<E: TextEmbedder> DocumentEmbedder<E> {
    pub fn new(embedder: E) -> Self {
        DocumentEmbedder {
            embedder,
            meta_fields_to_embed: Vec::new(),
            embedding_separator: "\n".to_string(),
            batch_size: 32,
        }
    }

    pub fn with_meta_fields(mut self, fields: Vec<String>) -> Self {
        self.meta_fields_to_embed = fields;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.embedding_separator = separator.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Text that is actually embedded for a document
    pub fn text_to_embed(&self, document: &Document) -> String {
        let mut parts: Vec<String> = self
            .meta_fields_to_embed
            .iter()
            .filter_map(|key| document.meta.get(key))
            .filter(|value| !value.is_null())
            .map(|value| match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            })
            .collect();
        parts.push(document.content.clone());
        parts.join(&self.embedding_separator)
    }

    /// Populate the embedding of every document, preserving order
    pub async fn run(&self, mut documents: Vec<Document>) -> Result<Vec<Document>> {
        info!(
            "Embedding {} documents with {}",
            documents.len(),
            self.embedder.model()
        );

        for (batch_idx, batch) in documents.chunks_mut(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|doc| self.text_to_embed(doc)).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                anyhow::bail!(
                    "Embedder returned {} embeddings for {} documents",
                    embeddings.len(),
                    batch.len()
                );
            }
            debug!("Embedded batch {} ({} documents)", batch_idx, batch.len());

            for (doc, embedding) in batch.iter_mut().zip(embeddings) {
                doc.embedding = Some(embedding);
            }
        }

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Meta;
    use serde_json::Value;

    #[test]
    fn test_hashing_is_deterministic_and_unit_length() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("Population of City B");
        let b = embedder.embed("Population of City B");
        assert_eq!(a, b);
        assert_eq!(a.dimension(), DEFAULT_DIMENSION);
        assert!((a.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_stopword_only_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        let embedding = embedder.embed("what is the");
        assert_eq!(embedding.norm(), 0.0);
        assert_eq!(embedding.dimension(), 16);
    }

    #[test]
    fn test_related_text_scores_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed("What was the graduation rate for School E?");
        let related = embedder.embed("School E had a graduation rate of 92%.");
        let unrelated = embedder.embed("Company D reduced its carbon emissions by 20%.");
        assert!(query.dot(&related) > query.dot(&unrelated));
    }

    #[test]
    fn test_cosine_of_zero_vector() {
        let zero = Embedding::new(vec![0.0, 0.0]);
        let other = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(zero.cosine(&other), 0.0);
    }

    #[tokio::test]
    async fn test_document_embedder_sets_embeddings_in_order() {
        let embedder = DocumentEmbedder::new(HashingEmbedder::new(64)).with_batch_size(2);
        let docs = vec![
            Document::new("first passage"),
            Document::new("second passage"),
            Document::new("third passage"),
        ];

        let embedded = embedder.run(docs).await.unwrap();
        assert_eq!(embedded.len(), 3);
        assert_eq!(embedded[2].content, "third passage");
        let expected = HashingEmbedder::new(64).embed("third passage");
        assert_eq!(embedded[2].embedding.as_ref(), Some(&expected));
    }

    #[test]
    fn test_meta_fields_prefix_content() {
        let embedder = DocumentEmbedder::new(HashingEmbedder::new(8))
            .with_meta_fields(vec!["title".to_string(), "missing".to_string()]);
        let mut meta = Meta::new();
        meta.insert("title".to_string(), Value::from("Annual report"));
        let doc = Document::with_meta("Body text", meta);
        assert_eq!(embedder.text_to_embed(&doc), "Annual report\nBody text");
    }
}
