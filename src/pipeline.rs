use crate::chunking::TokenTextSplitter;
use crate::database::{DocumentStore, DuplicatePolicy};
use crate::document::Document;
use crate::embeddings::{DocumentEmbedder, TextEmbedder};
use crate::reader::{ExtractedAnswer, ExtractiveReader, SpanExtractor};
use crate::retriever::EmbeddingRetriever;
use anyhow::Result;
use log::info;
use std::io::{self, Write};

pub const DEFAULT_RETRIEVER_TOP_K: usize = 3;
pub const DEFAULT_READER_TOP_K: usize = 1;

/// Outcome of an indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexingReport {
    pub documents: usize,
    pub chunks: usize,
    pub written: usize,
}

/// Splits (optionally), embeds and stores documents
pub struct IndexingPipeline<E, S> {
    splitter: Option<TokenTextSplitter>,
    embedder: DocumentEmbedder<E>,
    store: S,
    policy: DuplicatePolicy,
}

impl<E: TextEmbedder, S: DocumentStore> IndexingPipeline<E, S> {
    pub fn new(embedder: E, store: S) -> Self {
        IndexingPipeline {
            splitter: None,
            embedder: DocumentEmbedder::new(embedder),
            store,
            policy: DuplicatePolicy::default(),
        }
    }

    pub fn with_splitter(mut self, splitter: TokenTextSplitter) -> Self {
        self.splitter = Some(splitter);
        self
    }

    pub fn with_document_embedder(mut self, embedder: DocumentEmbedder<E>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Index documents into the store
    pub async fn run(&self, documents: Vec<Document>) -> Result<IndexingReport> {
        let input = documents.len();

        let documents = match &self.splitter {
            Some(splitter) => {
                let chunks = splitter.split_documents(&documents);
                info!(
                    "Split {} documents into {} chunks of at most {} tokens",
                    input,
                    chunks.len(),
                    splitter.chunk_size()
                );
                chunks
            }
            None => documents,
        };
        let chunks = documents.len();

        let documents = self.embedder.run(documents).await?;
        let written = self.store.write_documents(documents, self.policy).await?;
        info!("Wrote {} documents to the store", written);

        Ok(IndexingReport {
            documents: input,
            chunks,
            written,
        })
    }
}

/// Per-query knobs for the question-answering pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryParams {
    pub retriever_top_k: usize,
    pub reader_top_k: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        QueryParams {
            retriever_top_k: DEFAULT_RETRIEVER_TOP_K,
            reader_top_k: DEFAULT_READER_TOP_K,
        }
    }
}

/// Retrieved documents and ranked answers for one query
#[derive(Debug, Clone)]
pub struct QaResult {
    pub documents: Vec<Document>,
    pub answers: Vec<ExtractedAnswer>,
}

impl QaResult {
    /// Highest-scoring answer that has text
    pub fn best_answer(&self) -> Option<&ExtractedAnswer> {
        self.answers.iter().find(|answer| !answer.is_no_answer())
    }
}

/// Embeds the query, retrieves documents and extracts answers from them
pub struct ExtractiveQaPipeline<E, S, X> {
    embedder: E,
    retriever: EmbeddingRetriever<S>,
    reader: ExtractiveReader<X>,
}

impl<E, S, X> ExtractiveQaPipeline<E, S, X>
where
    E: TextEmbedder,
    S: DocumentStore,
    X: SpanExtractor,
{
    pub fn new(embedder: E, retriever: EmbeddingRetriever<S>, reader: ExtractiveReader<X>) -> Self {
        ExtractiveQaPipeline {
            embedder,
            retriever,
            reader,
        }
    }

    /// Answer one query
    pub async fn run(&self, query: &str, params: QueryParams) -> Result<QaResult> {
        let query_embedding = self.embedder.embed_text(query).await?;
        let documents = self
            .retriever
            .run(&query_embedding, Some(params.retriever_top_k))
            .await?;
        let answers = self
            .reader
            .run(query, &documents, Some(params.reader_top_k))
            .await?;

        Ok(QaResult { documents, answers })
    }

    /// Answer questions from stdin until `exit`
    pub async fn run_query_loop(&self, params: QueryParams) -> Result<()> {
        info!("Ready to answer questions. Type 'exit' to quit.");

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut buffer = String::new();

        loop {
            print!("\nYour question: ");
            stdout.flush()?;

            buffer.clear();
            if stdin.read_line(&mut buffer)? == 0 {
                break;
            }

            let question = buffer.trim();
            if question.is_empty() {
                continue;
            }
            if question.eq_ignore_ascii_case("exit") {
                info!("Goodbye!");
                break;
            }

            let result = self.run(question, params).await?;
            print_best_answer(&result);
        }

        Ok(())
    }
}

/// Print the best answer of a result, logging its score
pub fn print_best_answer(result: &QaResult) {
    match result.best_answer() {
        Some(answer) => {
            info!("Answer score {:.3}", answer.score);
            println!("{}", format_answer(answer));
        }
        None => println!("No answer found in the indexed documents."),
    }
}

/// One-line rendering of an answer for the terminal
pub fn format_answer(answer: &ExtractedAnswer) -> String {
    match &answer.data {
        Some(data) => format!("Response: {}", data),
        None => "No answer found in the indexed documents.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{Encoding, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
    use crate::database::InMemoryDocumentStore;
    use crate::embeddings::HashingEmbedder;
    use crate::lexical::LexicalExtractor;
    use crate::samples::{
        sample_documents, tech_report_document, BASIC_EXPECTED, BASIC_QUERY, CHUNKED_EXPECTED,
        CHUNKED_QUERY,
    };

    fn qa_pipeline(
        store: InMemoryDocumentStore,
    ) -> ExtractiveQaPipeline<HashingEmbedder, InMemoryDocumentStore, LexicalExtractor> {
        ExtractiveQaPipeline::new(
            HashingEmbedder::default(),
            EmbeddingRetriever::new(store),
            ExtractiveReader::new(LexicalExtractor::new()),
        )
    }

    #[tokio::test]
    async fn test_basic_scenario() {
        let store = InMemoryDocumentStore::default();
        let report = IndexingPipeline::new(HashingEmbedder::default(), store.clone())
            .run(sample_documents())
            .await
            .unwrap();
        assert_eq!(report.written, 5);

        let result = qa_pipeline(store)
            .run(BASIC_QUERY, QueryParams::default())
            .await
            .unwrap();

        assert_eq!(result.documents.len(), 3);
        assert_eq!(result.documents[0].meta_str("name"), Some("text5"));
        let best = result.best_answer().unwrap();
        assert_eq!(best.data.as_deref(), Some(BASIC_EXPECTED));
        assert_eq!(result.answers[0].data.as_deref(), Some(BASIC_EXPECTED));
    }

    #[tokio::test]
    async fn test_chunked_scenario() {
        let store = InMemoryDocumentStore::default();
        let splitter =
            TokenTextSplitter::new(Encoding::Cl100kBase, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
                .unwrap();
        let report = IndexingPipeline::new(HashingEmbedder::default(), store.clone())
            .with_splitter(splitter)
            .run(vec![tech_report_document()])
            .await
            .unwrap();
        assert_eq!(report.documents, 1);
        assert!(report.chunks > 1);
        assert_eq!(report.written, report.chunks);

        let result = qa_pipeline(store)
            .run(CHUNKED_QUERY, QueryParams::default())
            .await
            .unwrap();

        let best = result.best_answer().unwrap();
        assert_eq!(best.data.as_deref(), Some(CHUNKED_EXPECTED));
        let offset = best.document_offset.unwrap();
        let source = &best.document.as_ref().unwrap().content;
        assert_eq!(&source[offset.start..offset.end], CHUNKED_EXPECTED);
    }

    #[tokio::test]
    async fn test_reindexing_same_documents_fails_by_default() {
        let store = InMemoryDocumentStore::default();
        let indexing = IndexingPipeline::new(HashingEmbedder::default(), store.clone());
        indexing.run(sample_documents()).await.unwrap();
        assert!(indexing.run(sample_documents()).await.is_err());

        let skipping = IndexingPipeline::new(HashingEmbedder::default(), store.clone())
            .with_policy(DuplicatePolicy::Skip);
        let report = skipping.run(sample_documents()).await.unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(store.count_documents().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_empty_store_gives_no_answer_only() {
        let result = qa_pipeline(InMemoryDocumentStore::default())
            .run(BASIC_QUERY, QueryParams::default())
            .await
            .unwrap();
        assert!(result.documents.is_empty());
        assert!(result.best_answer().is_none());
        assert_eq!(result.answers.len(), 1);
    }

    #[test]
    fn test_format_answer() {
        let answer = ExtractedAnswer {
            query: "q".to_string(),
            score: 0.5,
            data: Some("92%".to_string()),
            document: None,
            context: None,
            document_offset: None,
        };
        assert_eq!(format_answer(&answer), "Response: 92%");
    }
}
