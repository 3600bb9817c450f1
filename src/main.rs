use anyhow::{Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use log::{error, info};
use std::path::Path;

use extractive_qa::backends::{
    Embedder, EmbedderKind, Extractor, ReaderKind, Store, StoreKind,
};
use extractive_qa::chunking::{
    Encoding, TokenTextSplitter, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
use extractive_qa::database::{DuplicatePolicy, SimilarityFunction};
use extractive_qa::document::Document;
use extractive_qa::pipeline::{
    print_best_answer, ExtractiveQaPipeline, IndexingPipeline, QueryParams,
    DEFAULT_READER_TOP_K, DEFAULT_RETRIEVER_TOP_K,
};
use extractive_qa::reader::{ExtractiveReader, ReaderOptions};
use extractive_qa::retriever::EmbeddingRetriever;
use extractive_qa::samples;

/// Extractive question answering over a document store with embedding retrieval
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a bundled scenario end to end
    Demo {
        #[arg(value_enum, default_value_t = Scenario::Basic)]
        scenario: Scenario,
    },
    /// Index files (text and PDF) and answer questions about them
    Ask {
        #[arg(required = true)]
        files: Vec<String>,

        /// Answer this question and exit instead of starting the interactive loop
        #[arg(short, long)]
        query: Option<String>,

        /// Index whole files without splitting them
        #[arg(long)]
        no_chunking: bool,

        /// What to do with documents already in the store
        #[arg(long, value_enum, default_value_t = DuplicatePolicy::Skip)]
        duplicates: DuplicatePolicy,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Five short snippets, no chunking
    Basic,
    /// A long report split into token chunks
    Chunked,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    #[arg(long, global = true, value_enum, default_value_t = EmbedderKind::Hashing)]
    embedder: EmbedderKind,

    #[arg(long, global = true)]
    embedding_model: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Memory)]
    store: StoreKind,

    #[arg(long, global = true, value_enum, default_value_t = SimilarityFunction::DotProduct)]
    similarity: SimilarityFunction,

    #[arg(long, global = true, value_enum, default_value_t = ReaderKind::Lexical)]
    reader: ReaderKind,

    #[arg(long, global = true)]
    reader_model: Option<String>,

    #[arg(long, global = true, default_value_t = DEFAULT_RETRIEVER_TOP_K,
          value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    retriever_top_k: usize,

    #[arg(long, global = true, default_value_t = DEFAULT_READER_TOP_K,
          value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    reader_top_k: usize,

    /// Maximum chunk length in tokens
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Tokens shared between consecutive chunks
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    #[arg(long, global = true, value_enum, default_value_t = Encoding::Cl100kBase)]
    encoding: Encoding,

    /// Drop answers scoring below this value
    #[arg(long, global = true)]
    score_threshold: Option<f64>,

    /// Include the no-answer entry when ranking answers
    #[arg(long, global = true, default_value_t = true, action = clap::ArgAction::Set)]
    no_answer: bool,
}

impl PipelineArgs {
    fn query_params(&self) -> QueryParams {
        QueryParams {
            retriever_top_k: self.retriever_top_k,
            reader_top_k: self.reader_top_k,
        }
    }

    fn splitter(&self) -> Result<TokenTextSplitter> {
        TokenTextSplitter::new(self.encoding, self.chunk_size, self.chunk_overlap)
            .context("Invalid chunking settings")
    }

    /// `fallback_model` applies when no `--reader-model` was given
    fn qa_pipeline(
        &self,
        embedder: Embedder,
        store: Store,
        fallback_model: Option<&str>,
    ) -> Result<ExtractiveQaPipeline<Embedder, Store, Extractor>> {
        let model = self.reader_model.as_deref().or(fallback_model);
        let extractor = Extractor::from_kind(self.reader, model)?;
        let options = ReaderOptions {
            score_threshold: self.score_threshold,
            no_answer: self.no_answer,
            ..ReaderOptions::default()
        };

        Ok(ExtractiveQaPipeline::new(
            embedder,
            EmbeddingRetriever::new(store),
            ExtractiveReader::with_options(extractor, options),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let args = &cli.pipeline;

    let embedder = Embedder::from_kind(args.embedder, args.embedding_model.as_deref())
        .context("Failed to initialize embedder")?;
    let store = Store::from_kind(args.store, args.similarity)
        .context("Failed to initialize document store")?;

    match &cli.command {
        Command::Demo { scenario } => run_demo(args, *scenario, embedder, store).await,
        Command::Ask {
            files,
            query,
            no_chunking,
            duplicates,
        } => {
            let mut documents = Vec::with_capacity(files.len());
            for file_path in files {
                if !Path::new(file_path).exists() {
                    error!("File not found: {}", file_path);
                    return Err(anyhow::anyhow!("File not found"));
                }
                info!("Processing file: {}", file_path);
                let document = Document::from_file(file_path)
                    .with_context(|| format!("Failed to process {}", file_path))?;
                documents.push(document);
            }

            let mut indexing =
                IndexingPipeline::new(embedder.clone(), store.clone()).with_policy(*duplicates);
            if !no_chunking {
                indexing = indexing.with_splitter(args.splitter()?);
            }
            let report = indexing
                .run(documents)
                .await
                .context("Failed to index documents")?;
            info!(
                "Indexed {} files as {} chunks ({} new)",
                report.documents, report.chunks, report.written
            );

            let qa = args.qa_pipeline(embedder, store, None)?;
            match query {
                Some(query) => answer_once(&qa, query, args.query_params()).await,
                None => qa
                    .run_query_loop(args.query_params())
                    .await
                    .context("Error in query loop"),
            }
        }
    }
}

async fn run_demo(
    args: &PipelineArgs,
    scenario: Scenario,
    embedder: Embedder,
    store: Store,
) -> Result<()> {
    let indexing = IndexingPipeline::new(embedder.clone(), store.clone())
        .with_policy(DuplicatePolicy::Overwrite);

    let query = match scenario {
        Scenario::Basic => {
            indexing.run(samples::sample_documents()).await?;
            samples::BASIC_QUERY
        }
        Scenario::Chunked => {
            indexing
                .with_splitter(args.splitter()?)
                .run(vec![samples::tech_report_document()])
                .await?;
            samples::CHUNKED_QUERY
        }
    };
    info!("Query: {}", query);

    // The chunked scenario was tuned against a specific hosted reader
    let fallback_model = match (scenario, args.reader) {
        (Scenario::Chunked, ReaderKind::Huggingface) => Some(samples::CHUNKED_READER_MODEL),
        _ => None,
    };
    let qa = args.qa_pipeline(embedder, store, fallback_model)?;
    answer_once(&qa, query, args.query_params()).await
}

async fn answer_once(
    qa: &ExtractiveQaPipeline<Embedder, Store, Extractor>,
    query: &str,
    params: QueryParams,
) -> Result<()> {
    let result = qa.run(query, params).await.context("Failed to answer query")?;
    print_best_answer(&result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_flags_reject_zero() {
        let parsed = Cli::try_parse_from(["extractive-qa", "demo", "--retriever-top-k", "0"]);
        assert!(parsed.is_err());
        let parsed = Cli::try_parse_from(["extractive-qa", "demo", "--reader-top-k", "0"]);
        assert!(parsed.is_err());

        let cli = Cli::try_parse_from(["extractive-qa", "demo", "chunked", "--retriever-top-k", "5"])
            .unwrap();
        assert_eq!(cli.pipeline.query_params().retriever_top_k, 5);
        assert_eq!(cli.pipeline.query_params().reader_top_k, DEFAULT_READER_TOP_K);
    }
}
