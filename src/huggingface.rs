use crate::document::Document;
use crate::embeddings::{Embedding, TextEmbedder};
use crate::reader::{Span, SpanCandidate, SpanExtractor};
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_INFERENCE_URL: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/multi-qa-mpnet-base-dot-v1";
pub const DEFAULT_READER_MODEL: &str = "deepset/roberta-base-squad2";

/// Configuration for the Hugging Face inference API
#[derive(Clone)]
pub struct HuggingFaceConfig {
    pub api_token: Option<String>,
    pub inference_url: String,
}

impl HuggingFaceConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_token = env::var("HF_API_TOKEN").ok();
        let inference_url = env::var("HF_INFERENCE_URL")
            .unwrap_or_else(|_| DEFAULT_INFERENCE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(HuggingFaceConfig {
            api_token,
            inference_url,
        })
    }
}

/// Thin HTTP client shared by the embedder and the reader
#[derive(Clone)]
pub struct HuggingFaceClient {
    config: HuggingFaceConfig,
    client: reqwest::Client,
}

impl HuggingFaceClient {
    pub fn new(config: HuggingFaceConfig) -> Self {
        let client = reqwest::Client::new();
        HuggingFaceClient { config, client }
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}/{}", self.config.inference_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach inference endpoint {}", url))?;

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

        Ok(response.json().await?)
    }
}

/// Embedder backed by a hosted sentence-transformers model
#[derive(Clone)]
pub struct HuggingFaceEmbedder {
    client: HuggingFaceClient,
    model: String,
}

impl HuggingFaceEmbedder {
    pub fn new(client: HuggingFaceClient, model: impl Into<String>) -> Self {
        HuggingFaceEmbedder {
            client,
            model: model.into(),
        }
    }
}

impl TextEmbedder for HuggingFaceEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = FeatureExtractionRequest {
            inputs: texts,
            options: RequestOptions {
                wait_for_model: true,
            },
        };
        let path = format!("pipeline/feature-extraction/{}", self.model);
        let output: FeatureExtractionOutput = self.client.post_json(&path, &request).await?;

        let embeddings: Vec<Embedding> = match output {
            FeatureExtractionOutput::Pooled(vectors) => {
                vectors.into_iter().map(Embedding::new).collect()
            }
            FeatureExtractionOutput::Tokens(per_text) => {
                debug!("Mean-pooling token embeddings from {}", self.model);
                per_text.into_iter().map(mean_pool).collect()
            }
        };

        if embeddings.len() != texts.len() {
            anyhow::bail!(
                "Expected {} embeddings from {}, got {}",
                texts.len(),
                self.model,
                embeddings.len()
            );
        }
        Ok(embeddings)
    }
}

/// Average token vectors into one sentence vector
fn mean_pool(tokens: Vec<Vec<f32>>) -> Embedding {
    let dimension = tokens.first().map_or(0, Vec::len);
    let mut values = vec![0.0f32; dimension];
    for token in &tokens {
        for (acc, v) in values.iter_mut().zip(token) {
            *acc += v;
        }
    }
    if !tokens.is_empty() {
        let count = tokens.len() as f32;
        values.iter_mut().for_each(|v| *v /= count);
    }
    Embedding::new(values)
}

/// Extractor backed by a hosted extractive question-answering model
#[derive(Clone)]
pub struct HuggingFaceReader {
    client: HuggingFaceClient,
    model: String,
}

impl HuggingFaceReader {
    pub fn new(client: HuggingFaceClient, model: impl Into<String>) -> Self {
        HuggingFaceReader {
            client,
            model: model.into(),
        }
    }
}

impl SpanExtractor for HuggingFaceReader {
    fn model(&self) -> &str {
        &self.model
    }

    async fn extract(
        &self,
        query: &str,
        document: &Document,
        max_candidates: usize,
    ) -> Result<Vec<SpanCandidate>> {
        if document.content.trim().is_empty() || max_candidates == 0 {
            return Ok(Vec::new());
        }

        let request = QuestionAnsweringRequest {
            inputs: QuestionAnsweringInputs {
                question: query,
                context: &document.content,
            },
            parameters: QuestionAnsweringParameters {
                top_k: max_candidates,
            },
            options: RequestOptions {
                wait_for_model: true,
            },
        };
        let path = format!("models/{}", self.model);
        let output: QuestionAnsweringOutput = self.client.post_json(&path, &request).await?;
        let answers = match output {
            QuestionAnsweringOutput::Many(answers) => answers,
            QuestionAnsweringOutput::One(answer) => vec![answer],
        };

        let candidates = answers
            .into_iter()
            .filter_map(|answer| {
                let start = char_to_byte(&document.content, answer.start);
                let end = char_to_byte(&document.content, answer.end);
                match (start, end) {
                    (Some(start), Some(end)) if start < end => Some(SpanCandidate {
                        span: Span { start, end },
                        score: answer.score,
                        context: None,
                    }),
                    _ => {
                        warn!(
                            "Ignoring answer {:?} at {}..{} outside document {}",
                            answer.answer, answer.start, answer.end, document.id
                        );
                        None
                    }
                }
            })
            .collect();

        Ok(candidates)
    }
}

/// Byte offset of the `index`-th character; `index == char count` maps to the end
fn char_to_byte(text: &str, index: usize) -> Option<usize> {
    text.char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()))
        .nth(index)
}

// Request/response structures for the inference API

#[derive(Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
    options: RequestOptions,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum FeatureExtractionOutput {
    Pooled(Vec<Vec<f32>>),
    Tokens(Vec<Vec<Vec<f32>>>),
}

#[derive(Serialize)]
struct QuestionAnsweringRequest<'a> {
    inputs: QuestionAnsweringInputs<'a>,
    parameters: QuestionAnsweringParameters,
    options: RequestOptions,
}

#[derive(Serialize)]
struct QuestionAnsweringInputs<'a> {
    question: &'a str,
    context: &'a str,
}

#[derive(Serialize)]
struct QuestionAnsweringParameters {
    top_k: usize,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum QuestionAnsweringOutput {
    Many(Vec<QuestionAnsweringAnswer>),
    One(QuestionAnsweringAnswer),
}

#[derive(Deserialize, Debug)]
struct QuestionAnsweringAnswer {
    score: f64,
    start: usize,
    end: usize,
    answer: String,
}
