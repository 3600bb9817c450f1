use crate::database::{
    scale_similarity, DocumentStore, DuplicatePolicy, SimilarityFunction,
};
use crate::document::{Document, Meta};
use crate::embeddings::Embedding;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    with_payload_selector, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder,
    Distance, GetPointsBuilder, PointId, PointStruct, PointsIdsList, SearchPoints,
    UpsertPointsBuilder, VectorParams, WithPayloadSelector,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::env;

const DEFAULT_COLLECTION: &str = "extractive_qa";

/// Configuration for Qdrant
#[derive(Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let url = env::var("QDRANT_URL").context("QDRANT_URL not set")?;
        let api_key = env::var("QDRANT_API_KEY").ok();
        let collection =
            env::var("QDRANT_COLLECTION").unwrap_or_else(|_| DEFAULT_COLLECTION.to_string());

        Ok(QdrantConfig {
            url,
            api_key,
            collection,
        })
    }
}

/// Document store persisted in a Qdrant collection
pub struct QdrantDocumentStore {
    client: Qdrant,
    collection_name: String,
    similarity: SimilarityFunction,
}

impl QdrantDocumentStore {
    /// Create a new Qdrant-backed store
    pub fn new(config: QdrantConfig, similarity: SimilarityFunction) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder
            .build()
            .context("Failed to initialize Qdrant client")?;

        Ok(QdrantDocumentStore {
            client,
            collection_name: get_collection_name(&config.collection),
            similarity,
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Check if the collection exists
    pub async fn collection_exists(&self) -> Result<bool> {
        match self.client.collection_info(&self.collection_name).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to check collection existence: {}",
                e
            )),
        }
    }

    /// Create the collection for vectors of the given size unless it exists
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<()> {
        if self.collection_exists().await? {
            return Ok(());
        }

        let distance = match self.similarity {
            SimilarityFunction::DotProduct => Distance::Dot,
            SimilarityFunction::Cosine => Distance::Cosine,
        };
        let create_collection = CreateCollectionBuilder::new(self.collection_name.clone())
            .vectors_config(VectorParams {
                size: vector_size,
                distance: distance.into(),
                ..Default::default()
            });

        self.client
            .create_collection(create_collection)
            .await
            .with_context(|| format!("Failed to create collection {}", self.collection_name))?;
        info!(
            "Created collection {} ({} dimensions)",
            self.collection_name, vector_size
        );

        Ok(())
    }

    /// Delete the whole collection
    pub async fn delete_collection(&self) -> Result<()> {
        self.client
            .delete_collection(self.collection_name.clone())
            .await
            .with_context(|| format!("Failed to delete collection {}", self.collection_name))?;

        Ok(())
    }

    /// Point ids among `ids` already present in the collection
    async fn existing_points(&self, ids: Vec<PointId>) -> Result<HashSet<u64>> {
        let response = self
            .client
            .get_points(GetPointsBuilder::new(self.collection_name.clone(), ids))
            .await
            .with_context(|| format!("Failed to look up points in {}", self.collection_name))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| match point.id?.point_id_options? {
                PointIdOptions::Num(num) => Some(num),
                PointIdOptions::Uuid(_) => None,
            })
            .collect())
    }
}

impl DocumentStore for QdrantDocumentStore {
    async fn count_documents(&self) -> Result<usize> {
        if !self.collection_exists().await? {
            return Ok(0);
        }

        let response = self
            .client
            .count(CountPointsBuilder::new(self.collection_name.clone()).exact(true))
            .await
            .with_context(|| format!("Failed to count points in {}", self.collection_name))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn write_documents(
        &self,
        documents: Vec<Document>,
        policy: DuplicatePolicy,
    ) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let vector_size = match documents.first().and_then(|d| d.embedding.as_ref()) {
            Some(embedding) => embedding.dimension(),
            None => anyhow::bail!("Qdrant documents must be embedded before writing"),
        };
        if let Some(doc) = documents.iter().find(|d| {
            d.embedding
                .as_ref()
                .map_or(true, |e| e.dimension() != vector_size)
        }) {
            anyhow::bail!(
                "Document {} has no embedding of dimension {}",
                doc.id,
                vector_size
            );
        }
        self.ensure_collection(vector_size as u64).await?;

        let ids: Vec<PointId> = documents
            .iter()
            .map(|d| point_id(&d.id))
            .collect::<HashSet<_>>()
            .into_iter()
            .map(PointId::from)
            .collect();
        let existing = self.existing_points(ids).await?;
        let documents = apply_policy(documents, &existing, policy)?;

        // Convert documents to points
        let mut points = Vec::with_capacity(documents.len());
        for doc in &documents {
            let payload = Payload::try_from(payload_json(doc)?)
                .context("Failed to build point payload")?;
            let vector = doc
                .embedding
                .as_ref()
                .map(|e| e.values.clone())
                .unwrap_or_default();
            points.push(PointStruct::new(point_id(&doc.id), vector, payload));
        }
        let written = points.len();
        if written == 0 {
            return Ok(0);
        }

        let upsert_request =
            UpsertPointsBuilder::new(self.collection_name.clone(), points).wait(true);

        // Upsert points in batch
        self.client
            .upsert_points(upsert_request)
            .await
            .with_context(|| {
                format!(
                    "Failed to upsert points in collection {}",
                    self.collection_name
                )
            })?;
        debug!("Upserted {} points into {}", written, self.collection_name);

        Ok(written)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() || !self.collection_exists().await? {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| point_id(id).into()).collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(self.collection_name.clone())
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .with_context(|| format!("Failed to delete points in {}", self.collection_name))?;

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
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if return_embedding {
            warn!("Qdrant store does not return embeddings; ignoring return_embedding");
        }
        if !self.collection_exists().await? {
            debug!("Collection {} does not exist yet", self.collection_name);
            return Ok(Vec::new());
        }

        // Create search request
        let search_request = SearchPoints {
            collection_name: self.collection_name.clone(),
            vector: query_embedding.values.clone(),
            limit: top_k as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(with_payload_selector::SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        // Execute search
        let search_response = self
            .client
            .search_points(search_request)
            .await
            .with_context(|| format!("Failed to search collection {}", self.collection_name))?;

        // Convert search results back to documents
        let documents = search_response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let payload = serde_json::Value::from(Payload::from(scored_point.payload));
                let mut doc = document_from_payload(payload)?;

                let score = scored_point.score;
                doc.score = Some(if scale_score {
                    scale_similarity(self.similarity, score)
                } else {
                    score as f64
                });
                Some(doc)
            })
            .collect();

        Ok(documents)
    }
}

/// Fields stored in each point's payload
#[derive(Serialize, Deserialize)]
struct PointPayload {
    id: String,
    content: String,
    #[serde(default)]
    meta: Meta,
}

fn payload_json(doc: &Document) -> Result<serde_json::Value> {
    let payload = PointPayload {
        id: doc.id.clone(),
        content: doc.content.clone(),
        meta: doc.meta.clone(),
    };
    Ok(serde_json::to_value(payload)?)
}

fn document_from_payload(payload: serde_json::Value) -> Option<Document> {
    match serde_json::from_value::<PointPayload>(payload) {
        Ok(point) => Some(Document::with_meta(point.content, point.meta).with_id(point.id)),
        Err(e) => {
            warn!("Skipping point with malformed payload: {}", e);
            None
        }
    }
}

/// Whether a client error means the collection does not exist
fn is_not_found(error: &QdrantError) -> bool {
    matches!(error, QdrantError::ResponseError { status } if status.code() == tonic::Code::NotFound)
}

/// Filter a batch by duplicate policy against the point ids already stored
fn apply_policy(
    documents: Vec<Document>,
    existing: &HashSet<u64>,
    policy: DuplicatePolicy,
) -> Result<Vec<Document>> {
    match policy {
        DuplicatePolicy::Fail => {
            if let Some(doc) = documents
                .iter()
                .find(|d| existing.contains(&point_id(&d.id)))
            {
                anyhow::bail!("ID '{}' already exists in the document store", doc.id);
            }
            let mut seen = HashSet::new();
            if let Some(doc) = documents.iter().find(|d| !seen.insert(point_id(&d.id))) {
                anyhow::bail!("ID '{}' appears more than once in the batch", doc.id);
            }
            Ok(documents)
        }
        DuplicatePolicy::Skip => {
            let mut kept = HashSet::new();
            Ok(documents
                .into_iter()
                .filter(|d| {
                    let id = point_id(&d.id);
                    !existing.contains(&id) && kept.insert(id)
                })
                .collect())
        }
        DuplicatePolicy::Overwrite => Ok(documents),
    }
}

/// Stable numeric point id for a document id
fn point_id(document_id: &str) -> u64 {
    let digest = Sha256::digest(document_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Generate a collection name from a user-supplied name
fn get_collection_name(name: &str) -> String {
    // Replace non-alphanumeric characters with underscores and convert to lowercase
    let name = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase();

    format!("qa_{}", name)
}
