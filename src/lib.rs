pub mod backends;
pub mod chunking;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod gemini;
pub mod huggingface;
pub mod lexical;
pub mod pipeline;
pub mod qdrant;
pub mod reader;
pub mod retriever;
pub mod samples;
pub mod text;
