use crate::embeddings::{Embedding, TextEmbedder};
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_EMBEDDINGS_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent";
const DEFAULT_EMBEDDING_MODEL: &str = "models/text-embedding-004";

/// Configuration for Gemini API
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub embeddings_url: String,
    pub model: String,
}

impl GeminiConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY").context("GEMINI_API_KEY not set")?;
        Ok(Self::from_parts(
            api_key,
            env::var("GEMINI_EMBEDDINGS_URL").ok(),
            env::var("GEMINI_EMBEDDING_MODEL").ok(),
        ))
    }

    /// An explicit URL wins; otherwise the endpoint follows the model
    fn from_parts(api_key: String, embeddings_url: Option<String>, model: Option<String>) -> Self {
        let config = GeminiConfig {
            api_key,
            embeddings_url: DEFAULT_EMBEDDINGS_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        };
        let config = match model {
            Some(model) => config.with_model(&model),
            None => config,
        };
        match embeddings_url {
            Some(embeddings_url) => GeminiConfig {
                embeddings_url,
                ..config
            },
            None => config,
        }
    }

    /// Point the configuration at another embedding model
    pub fn with_model(mut self, model: &str) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        self.embeddings_url = format!("{}/{}:embedContent", API_BASE_URL, model);
        self.model = model;
        self
    }
}

/// Embedder backed by the Gemini embedContent API
#[derive(Clone)]
pub struct GeminiEmbedder {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiEmbedder {
    /// Create a new Gemini embedder
    pub fn new(config: GeminiConfig) -> Self {
        let client = reqwest::Client::new();
        GeminiEmbedder { config, client }
    }

    /// Get the client configuration
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Generate embeddings for a text
    pub async fn get_embedding(&self, text: &str) -> Result<Embedding> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            content: EmbeddingContent {
                parts: vec![Part { text }],
            },
        };

        let url = format!("{}?key={}", self.config.embeddings_url, self.config.api_key);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to reach Gemini embeddings endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed: {} {}",
                status,
                error_text
            ));
        }

        let response_data: EmbeddingResponse = response.json().await?;
        debug!(
            "Gemini returned a {}-dimensional embedding",
            response_data.embedding.values.len()
        );

        Ok(Embedding {
            values: response_data.embedding.values,
        })
    }
}

impl TextEmbedder for GeminiEmbedder {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        self.get_embedding(text).await
    }
}

// Request/response structures for the Gemini API

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    content: EmbeddingContent<'a>,
}

#[derive(Serialize)]
struct EmbeddingContent<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    embedding: EmbeddingData,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = EmbeddingRequest {
            model: DEFAULT_EMBEDDING_MODEL,
            content: EmbeddingContent {
                parts: vec![Part { text: "hello" }],
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "models/text-embedding-004");
        assert_eq!(json["content"]["parts"][0]["text"], "hello");
    }

    #[test]
    fn test_with_model_updates_endpoint() {
        let config = GeminiConfig {
            api_key: "key".to_string(),
            embeddings_url: DEFAULT_EMBEDDINGS_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
        .with_model("embedding-001");
        assert_eq!(config.model, "models/embedding-001");
        assert_eq!(
            config.embeddings_url,
            "https://generativelanguage.googleapis.com/v1beta/models/embedding-001:embedContent"
        );
    }

    #[test]
    fn test_model_from_environment_sets_endpoint() {
        let config = GeminiConfig::from_parts("key".to_string(), None, Some("embedding-001".into()));
        assert_eq!(config.model, "models/embedding-001");
        assert_eq!(
            config.embeddings_url,
            "https://generativelanguage.googleapis.com/v1beta/models/embedding-001:embedContent"
        );

        let defaults = GeminiConfig::from_parts("key".to_string(), None, None);
        assert_eq!(defaults.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(defaults.embeddings_url, DEFAULT_EMBEDDINGS_URL);
    }

    #[test]
    fn test_explicit_url_is_kept() {
        let url = "http://localhost:8080/embed".to_string();
        let config = GeminiConfig::from_parts(
            "key".to_string(),
            Some(url.clone()),
            Some("models/embedding-001".into()),
        );
        assert_eq!(config.model, "models/embedding-001");
        assert_eq!(config.embeddings_url, url);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"embedding": {"values": [0.25, -0.5]}}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.embedding.values, vec![0.25, -0.5]);
    }
}
