use crate::document::Document;
use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_K: usize = 20;
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.01;

/// Byte range of an answer inside its document's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the intersection with another span
    pub fn overlap(&self, other: &Span) -> usize {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        end.saturating_sub(start)
    }
}

/// An answer span pulled from a document, or the "no answer" entry when `data` is empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedAnswer {
    pub query: String,
    pub score: f64,
    pub data: Option<String>,
    pub document: Option<Document>,
    /// Text surrounding the answer, typically its sentence
    pub context: Option<String>,
    pub document_offset: Option<Span>,
}

impl ExtractedAnswer {
    pub fn is_no_answer(&self) -> bool {
        self.data.is_none()
    }
}

/// A scored span proposed for one document
#[derive(Debug, Clone, PartialEq)]
pub struct SpanCandidate {
    pub span: Span,
    /// Confidence in [0, 1]
    pub score: f64,
    pub context: Option<String>,
}

/// Proposes answer spans for a query within a single document
#[allow(async_fn_in_trait)]
pub trait SpanExtractor {
    /// Name of the model or method behind this extractor
    fn model(&self) -> &str;

    /// Up to `max_candidates` spans, in any order
    async fn extract(
        &self,
        query: &str,
        document: &Document,
        max_candidates: usize,
    ) -> Result<Vec<SpanCandidate>>;
}

/// Post-processing knobs shared by every extractor
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub top_k: usize,
    pub score_threshold: Option<f64>,
    pub no_answer: bool,
    /// Drop an answer overlapping a better one from the same document by more than this fraction
    pub answers_overlap_threshold: Option<f64>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            top_k: DEFAULT_TOP_K,
            score_threshold: None,
            no_answer: true,
            answers_overlap_threshold: Some(DEFAULT_OVERLAP_THRESHOLD),
        }
    }
}

/// Runs an extractor over retrieved documents and ranks the resulting answers
pub struct ExtractiveReader<X> {
    extractor: X,
    options: ReaderOptions,
}

impl<X: SpanExtractor> ExtractiveReader<X> {
    pub fn new(extractor: X) -> Self {
        Self::with_options(extractor, ReaderOptions::default())
    }

    pub fn with_options(extractor: X, options: ReaderOptions) -> Self {
        ExtractiveReader { extractor, options }
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn extractor(&self) -> &X {
        &self.extractor
    }

    /// Answer `query` from `documents`; `top_k` overrides the configured default
    pub async fn run(
        &self,
        query: &str,
        documents: &[Document],
        top_k: Option<usize>,
    ) -> Result<Vec<ExtractedAnswer>> {
        let top_k = top_k.unwrap_or(self.options.top_k);
        info!(
            "Reading {} documents with {}",
            documents.len(),
            self.extractor.model()
        );

        let mut answers = Vec::new();
        for document in documents {
            let candidates = self.extractor.extract(query, document, top_k).await?;
            for candidate in candidates {
                let span = candidate.span;
                let Some(data) = span_text(&document.content, span) else {
                    warn!(
                        "Discarding span {}..{} outside document {}",
                        span.start, span.end, document.id
                    );
                    continue;
                };
                answers.push(ExtractedAnswer {
                    query: query.to_string(),
                    score: candidate.score.clamp(0.0, 1.0),
                    data: Some(data.to_string()),
                    document: Some(document.clone()),
                    context: candidate.context,
                    document_offset: Some(span),
                });
            }
        }
        debug!("Collected {} candidate answers", answers.len());

        Ok(self.rank(query, answers, top_k))
    }

    fn rank(
        &self,
        query: &str,
        mut answers: Vec<ExtractedAnswer>,
        top_k: usize,
    ) -> Vec<ExtractedAnswer> {
        sort_by_score(&mut answers);

        if let Some(threshold) = self.options.answers_overlap_threshold {
            answers = deduplicate_by_overlap(answers, threshold);
        }
        answers.truncate(top_k);

        if let Some(threshold) = self.options.score_threshold {
            answers.retain(|answer| answer.score >= threshold);
        }

        if self.options.no_answer {
            let score = answers.iter().map(|a| 1.0 - a.score).product();
            answers.push(ExtractedAnswer {
                query: query.to_string(),
                score,
                data: None,
                document: None,
                context: None,
                document_offset: None,
            });
            sort_by_score(&mut answers);
        }

        answers
    }
}

fn sort_by_score(answers: &mut [ExtractedAnswer]) {
    answers.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// The substring for a span, if the span lies on character boundaries inside `content`
fn span_text(content: &str, span: Span) -> Option<&str> {
    if span.is_empty() {
        return None;
    }
    content.get(span.start..span.end)
}

/// Keep answers in order, dropping those that overlap an already kept answer
/// from the same document by more than `threshold` of the shorter span
fn deduplicate_by_overlap(answers: Vec<ExtractedAnswer>, threshold: f64) -> Vec<ExtractedAnswer> {
    let mut kept: Vec<ExtractedAnswer> = Vec::with_capacity(answers.len());

    for answer in answers {
        let duplicate = kept.iter().any(|other| {
            let (Some(a), Some(b)) = (answer.document_offset, other.document_offset) else {
                return false;
            };
            let same_document = match (&answer.document, &other.document) {
                (Some(x), Some(y)) => x.id == y.id,
                _ => false,
            };
            let shorter = a.len().min(b.len());
            same_document && shorter > 0 && a.overlap(&b) as f64 / shorter as f64 > threshold
        });

        if !duplicate {
            kept.push(answer);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns fixed candidates for every document
    struct FixedExtractor(Vec<SpanCandidate>);

    impl SpanExtractor for FixedExtractor {
        fn model(&self) -> &str {
            "fixed"
        }

        async fn extract(
            &self,
            _query: &str,
            _document: &Document,
            _max_candidates: usize,
        ) -> Result<Vec<SpanCandidate>> {
            Ok(self.0.clone())
        }
    }

    fn candidate(start: usize, end: usize, score: f64) -> SpanCandidate {
        SpanCandidate {
            span: Span { start, end },
            score,
            context: None,
        }
    }

    #[tokio::test]
    async fn test_ranks_and_adds_no_answer() {
        let reader = ExtractiveReader::new(FixedExtractor(vec![
            candidate(0, 4, 0.5),
            candidate(10, 13, 0.8),
        ]));
        let docs = vec![Document::new("2023 rate 92% done")];

        let answers = reader.run("q", &docs, Some(5)).await.unwrap();
        assert_eq!(answers.len(), 3);
        assert_eq!(answers[0].data.as_deref(), Some("92%"));
        assert_eq!(answers[1].data.as_deref(), Some("2023"));
        assert!(answers[2].is_no_answer());
        assert!((answers[2].score - 0.5 * 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_overlapping_answers_deduplicated() {
        let options = ReaderOptions {
            no_answer: false,
            ..ReaderOptions::default()
        };
        let reader = ExtractiveReader::with_options(
            FixedExtractor(vec![candidate(0, 12, 0.9), candidate(4, 12, 0.7)]),
            options,
        );
        let docs = vec![Document::new("$500 billion in spending")];

        let answers = reader.run("q", &docs, None).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].data.as_deref(), Some("$500 billion"));
    }

    #[tokio::test]
    async fn test_same_span_in_different_documents_is_kept() {
        let options = ReaderOptions {
            no_answer: false,
            ..ReaderOptions::default()
        };
        let reader =
            ExtractiveReader::with_options(FixedExtractor(vec![candidate(0, 3, 0.6)]), options);
        let docs = vec![Document::new("92% first"), Document::new("92% second")];

        let answers = reader.run("q", &docs, None).await.unwrap();
        assert_eq!(answers.len(), 2);
    }

    #[tokio::test]
    async fn test_threshold_and_invalid_spans() {
        let options = ReaderOptions {
            score_threshold: Some(0.5),
            no_answer: false,
            ..ReaderOptions::default()
        };
        let reader = ExtractiveReader::with_options(
            FixedExtractor(vec![
                candidate(0, 3, 0.9),
                candidate(4, 8, 0.2),
                candidate(5, 500, 0.95),
            ]),
            options,
        );
        let docs = vec![Document::new("abc defgh")];

        let answers = reader.run("q", &docs, None).await.unwrap();
        assert_eq!(answers.len(), 1);
        let answer = &answers[0];
        let offset = answer.document_offset.unwrap();
        let content = &answer.document.as_ref().unwrap().content;
        assert_eq!(&content[offset.start..offset.end], answer.data.as_deref().unwrap());
    }

    #[tokio::test]
    async fn test_no_documents() {
        let reader = ExtractiveReader::new(FixedExtractor(vec![]));
        let answers = reader.run("q", &[], None).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert!(answers[0].is_no_answer());
        assert_eq!(answers[0].score, 1.0);
    }
}
