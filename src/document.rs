use crate::embeddings::Embedding;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Free-form document metadata
pub type Meta = BTreeMap<String, Value>;

/// A unit of text stored, retrieved and read by the pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Content-derived identifier unless set explicitly
    pub id: String,
    /// The actual text content of the document
    pub content: String,
    /// Metadata carried alongside the content
    #[serde(default)]
    pub meta: Meta,
    /// Vector representation, set by a document embedder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    /// Similarity score, set by retrieval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Document {
    /// Create a document without metadata
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_meta(content, Meta::new())
    }

    /// Create a document with metadata; the id is derived from both
    pub fn with_meta(content: impl Into<String>, meta: Meta) -> Self {
        let content = content.into();
        let id = content_id(&content, &meta);
        Document {
            id,
            content,
            meta,
            embedding: None,
            score: None,
        }
    }

    /// Replace the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Load a document from a text or PDF file
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        path.file_name()
            .context("Invalid file name")?
            .to_str()
            .context("Invalid file name encoding")?;

        // Detect MIME type
        let mime = from_path(path).first_or_octet_stream();
        let mime_type = mime.to_string();
        debug!("Detected MIME type: {}", mime_type);

        // Read content based on file type
        let content = read_document_content(path, &mime_type)?;

        let mut meta = Meta::new();
        meta.insert(
            "file_path".to_string(),
            Value::String(path.display().to_string()),
        );
        meta.insert("mime_type".to_string(), Value::String(mime_type));

        Ok(Document::with_meta(content, meta))
    }

    /// Look up a string meta field
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(Value::as_str)
    }
}

/// Hex SHA-256 over content and serialized metadata
fn content_id(content: &str, meta: &Meta) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    // BTreeMap serializes with sorted keys, so equal maps hash equally
    if let Ok(serialized) = serde_json::to_vec(meta) {
        hasher.update(&serialized);
    }
    format!("{:x}", hasher.finalize())
}

/// Read content from a document based on its MIME type
pub fn read_document_content<P: AsRef<Path>>(file_path: P, mime_type: &str) -> Result<String> {
    let path = file_path.as_ref();

    match mime_type {
        // Handle PDF documents
        mime if mime.starts_with("application/pdf") => {
            info!("Processing PDF document: {}", path.display());
            let content = extract_text(path)
                .with_context(|| format!("Failed to extract text from PDF: {}", path.display()))?;

            // PDF extraction can sometimes include excessive whitespace
            let cleaned_content = normalize_whitespace(&content);

            if cleaned_content.is_empty() {
                warn!("Extracted PDF content is empty or contains only whitespace");
            }

            Ok(cleaned_content)
        }

        // Handle plain text documents
        mime if mime.starts_with("text/") => {
            info!("Processing text document: {}", path.display());
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read text file: {}", path.display()))?;
            Ok(content)
        }

        // Unsupported format
        _ => Err(anyhow::anyhow!(
            "Unsupported document format: {}. Only text and PDF files are supported.",
            mime_type
        )),
    }
}

/// Collapse space runs and keep at most one blank line between paragraphs
fn normalize_whitespace(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut pending_newlines = 0;
    let mut prev_char = ' ';

    for c in text.chars().filter(|&c| c != '\r') {
        if c == '\n' {
            pending_newlines += 1;
            continue;
        }

        if pending_newlines > 0 {
            normalized.push_str(if pending_newlines >= 2 { "\n\n" } else { "\n" });
            pending_newlines = 0;
        }

        if !(c == ' ' && prev_char == ' ') {
            normalized.push(c);
        }
        prev_char = c;
    }

    normalized.trim().to_string()
}
