//! Heuristic extractive reader that needs no model.
//!
//! Sentences are scored by how many query terms they contain; inside the
//! best sentences, numeric expressions and capitalized names are proposed
//! as answers and weighted by the kind of answer the question asks for and
//! by their distance to the matched query terms.

use crate::document::Document;
use crate::reader::{Span, SpanCandidate, SpanExtractor};
use crate::text::{content_terms, is_stopword, tokenize, Token};
use anyhow::Result;
use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Weight of a candidate whose kind is not the one the question asks for
const KIND_MISMATCH_FACTOR: f64 = 0.35;
/// Token distance at which proximity weight halves
const PROXIMITY_SCALE: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnswerKind {
    Percent,
    Money,
    Year,
    Number,
    Name,
}

struct Patterns {
    sentence_end: Regex,
    money: Regex,
    percent: Regex,
    number: Regex,
    name: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        sentence_end: Regex::new(r"[.!?]+(?:\s+|$)|\n\s*\n").expect("sentence pattern is valid"),
        money: Regex::new(
            r"[$€£]\s?\d+(?:,\d{3})*(?:\.\d+)?(?:\s(?:trillion|billion|million|thousand))?",
        )
        .expect("money pattern is valid"),
        percent: Regex::new(r"\d+(?:,\d{3})*(?:\.\d+)?\s?(?:%|percent\b)")
            .expect("percent pattern is valid"),
        number: Regex::new(
            r"\b\d+(?:,\d{3})*(?:\.\d+)?(?:\s(?:trillion|billion|million|thousand))?(?:\s(?:tons|students|games|people|patients|subscribers|units))?",
        )
        .expect("number pattern is valid"),
        name: Regex::new(r"\b[A-Z][\w&+-]*(?:\s+(?:[A-Z][\w&+-]*|&|of))*")
            .expect("name pattern is valid"),
    })
}

/// Answer kinds the question's wording asks for, most specific first
fn expected_kinds(query: &str) -> Vec<AnswerKind> {
    let words: HashSet<String> = tokenize(query).into_iter().map(|t| t.term).collect();
    let has = |cues: &[&str]| cues.iter().any(|cue| words.contains(*cue));

    // "reduce ... by", "grew by": the change is usually given as a percentage
    let asks_change = words.contains("by")
        && has(&[
            "reduce", "reduced", "cut", "increase", "increased", "grow", "grew", "rise", "rose",
            "decline", "declined", "drop", "dropped", "fall", "fell",
        ]);

    let mut kinds = Vec::new();
    if asks_change || has(&["percent", "percentage", "rate", "share", "proportion"]) {
        kinds.push(AnswerKind::Percent);
    }
    if has(&[
        "spending", "cost", "price", "revenue", "gdp", "worth", "budget", "capitalization",
        "valuation", "much",
    ]) {
        kinds.push(AnswerKind::Money);
    }
    if has(&["when", "year"]) {
        kinds.push(AnswerKind::Year);
    }
    if has(&["many", "number", "population", "count", "emission"]) {
        kinds.push(AnswerKind::Number);
    }
    if has(&["who", "whom", "which", "company", "organization"]) {
        kinds.push(AnswerKind::Name);
    }
    kinds
}

#[derive(Debug, Clone)]
struct Candidate {
    span: Span,
    kind: AnswerKind,
}

/// Sentence byte ranges, trimmed of surrounding whitespace
fn sentences(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start = 0;

    let mut push = |start: usize, end: usize| {
        let raw = &text[start..end];
        let lead = raw.len() - raw.trim_start().len();
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            spans.push(Span {
                start: start + lead,
                end: start + lead + trimmed.len(),
            });
        }
    };

    for m in patterns().sentence_end.find_iter(text) {
        push(start, m.end());
        start = m.end();
    }
    if start < text.len() {
        push(start, text.len());
    }
    spans
}

/// Numeric and name candidates inside `sentence`, non-overlapping
fn candidates_in(text: &str, sentence: Span, want_names: bool) -> Vec<Candidate> {
    let slice = &text[sentence.start..sentence.end];
    let p = patterns();
    let mut found: Vec<Candidate> = Vec::new();

    let add = |found: &mut Vec<Candidate>, start: usize, end: usize, kind: AnswerKind| {
        let span = Span {
            start: sentence.start + start,
            end: sentence.start + end,
        };
        if !found.iter().any(|c| c.span.overlap(&span) > 0) {
            found.push(Candidate { span, kind });
        }
    };

    for m in p.money.find_iter(slice) {
        add(&mut found, m.start(), m.end(), AnswerKind::Money);
    }
    for m in p.percent.find_iter(slice) {
        add(&mut found, m.start(), m.end(), AnswerKind::Percent);
    }
    for m in p.number.find_iter(slice) {
        let value = m.as_str();
        let kind = if value.len() == 4
            && value.chars().all(|c| c.is_ascii_digit())
            && (value.starts_with("19") || value.starts_with("20"))
        {
            AnswerKind::Year
        } else {
            AnswerKind::Number
        };
        add(&mut found, m.start(), m.end(), kind);
    }
    if want_names {
        for m in p.name.find_iter(slice) {
            let (start, end) = trim_name(slice, m.start(), m.end());
            if start < end && !is_stopword(&slice[start..end].to_lowercase()) {
                add(&mut found, start, end, AnswerKind::Name);
            }
        }
    }

    found.sort_by_key(|c| c.span.start);
    found
}

/// Strip leading stopwords ("In", "The") and trailing connectors from a name match
fn trim_name(slice: &str, start: usize, end: usize) -> (usize, usize) {
    let words: Vec<(usize, &str)> = slice[start..end]
        .split_whitespace()
        .map(|w| (w.as_ptr() as usize - slice.as_ptr() as usize, w))
        .collect();

    let first = words
        .iter()
        .position(|(_, w)| !is_stopword(&w.to_lowercase()));
    let last = words
        .iter()
        .rposition(|(_, w)| *w != "&" && *w != "of");

    match (first, last) {
        (Some(first), Some(last)) if first <= last => {
            let (s, _) = words[first];
            let (e, w) = words[last];
            (s, e + w.len())
        }
        _ => (start, start),
    }
}

/// Local extractor scoring spans by query-term overlap and proximity
#[derive(Debug, Clone, Default)]
pub struct LexicalExtractor;

impl LexicalExtractor {
    pub fn new() -> Self {
        LexicalExtractor
    }

    /// Synchronous extraction; the trait method delegates here
    pub fn candidates(
        &self,
        query: &str,
        content: &str,
        max_candidates: usize,
    ) -> Vec<SpanCandidate> {
        let query_terms: HashSet<String> = content_terms(query).into_iter().collect();
        if query_terms.is_empty() {
            return Vec::new();
        }
        let kinds = expected_kinds(query);
        let want_names = kinds.is_empty() || kinds.contains(&AnswerKind::Name);

        let mut scored = Vec::new();
        for sentence in sentences(content) {
            let tokens = tokenize(&content[sentence.start..sentence.end]);
            let tokens: Vec<Token> = tokens
                .into_iter()
                .map(|t| Token {
                    start: t.start + sentence.start,
                    end: t.end + sentence.start,
                    term: t.term,
                })
                .collect();

            let matched: HashSet<&str> = tokens
                .iter()
                .map(|t| t.term.as_str())
                .filter(|t| query_terms.contains(*t))
                .collect();
            if matched.is_empty() {
                continue;
            }
            let coverage = matched.len() as f64 / query_terms.len() as f64;
            let context = content[sentence.start..sentence.end].to_string();

            for candidate in candidates_in(content, sentence, want_names) {
                let inside: Vec<usize> = tokens
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.start >= candidate.span.start && t.end <= candidate.span.end)
                    .map(|(i, _)| i)
                    .collect();
                let (Some(&first), Some(&last)) = (inside.first(), inside.last()) else {
                    continue;
                };

                // The question already states it, so it cannot be the answer
                if inside.iter().all(|&i| query_terms.contains(&tokens[i].term)) {
                    continue;
                }

                let distance = tokens
                    .iter()
                    .enumerate()
                    .filter(|(i, t)| (*i < first || *i > last) && query_terms.contains(&t.term))
                    .map(|(i, _)| if i < first { first - i } else { i - last })
                    .min();
                let Some(distance) = distance else {
                    continue;
                };

                let proximity = 1.0 / (1.0 + distance as f64 / PROXIMITY_SCALE);
                let kind_factor = if kinds.is_empty() || kinds.contains(&candidate.kind) {
                    1.0
                } else {
                    KIND_MISMATCH_FACTOR
                };
                let score = coverage * (0.4 + 0.6 * proximity) * kind_factor;

                scored.push(SpanCandidate {
                    span: candidate.span,
                    score: score.clamp(0.0, 1.0),
                    context: Some(context.clone()),
                });
            }
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(max_candidates);
        scored
    }
}

impl SpanExtractor for LexicalExtractor {
    fn model(&self) -> &str {
        "lexical"
    }

    async fn extract(
        &self,
        query: &str,
        document: &Document,
        max_candidates: usize,
    ) -> Result<Vec<SpanCandidate>> {
        let candidates = self.candidates(query, &document.content, max_candidates);
        debug!(
            "Document {} yielded {} lexical candidates",
            document.id,
            candidates.len()
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::{SAMPLE_TEXTS, TECH_REPORT};

    fn best(query: &str, content: &str) -> Option<String> {
        LexicalExtractor::new()
            .candidates(query, content, 5)
            .first()
            .map(|c| content[c.span.start..c.span.end].to_string())
    }

    #[test]
    fn test_sentences_keep_decimals_together() {
        let text = "GDP grew by 3.5%, reaching $1.5 trillion. Growth was strong.";
        let spans = sentences(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(
            &text[spans[0].start..spans[0].end],
            "GDP grew by 3.5%, reaching $1.5 trillion."
        );
        assert_eq!(&text[spans[1].start..spans[1].end], "Growth was strong.");
    }

    #[test]
    fn test_patterns_compile() {
        let p = patterns();
        assert!(p.money.is_match("$500 billion"));
        assert!(p.percent.is_match("92%"));
        assert!(p.number.is_match("80,000 tons"));
        assert!(p.name.is_match("McKinsey & Company"));
        assert!(p.sentence_end.is_match("Done. Next"));
    }

    #[test]
    fn test_expected_kinds() {
        assert_eq!(
            expected_kinds("What was the graduation rate?"),
            vec![AnswerKind::Percent]
        );
        assert_eq!(
            expected_kinds("How much is the projected spending?"),
            vec![AnswerKind::Money]
        );
        assert!(expected_kinds("Describe the school").is_empty());
    }

    #[test]
    fn test_graduation_rate() {
        let (_, text) = SAMPLE_TEXTS[4];
        assert_eq!(
            best("What was the graduation rate for School E in 2023?", text).as_deref(),
            Some("92%")
        );
    }

    #[test]
    fn test_projected_spending() {
        assert_eq!(
            best(
                "What is the projected global spending on AI systems in 2023?",
                TECH_REPORT
            )
            .as_deref(),
            Some("$500 billion")
        );
    }

    #[test]
    fn test_change_question_prefers_percent() {
        let (_, text) = SAMPLE_TEXTS[3];
        assert_eq!(
            best("By how much did Company D reduce its carbon emissions?", text).as_deref(),
            Some("20%")
        );
        assert_eq!(
            best("What are the total emissions of Company D per year?", text).as_deref(),
            Some("80,000 tons")
        );
    }

    #[test]
    fn test_population_with_scale_word() {
        let (_, text) = SAMPLE_TEXTS[1];
        assert_eq!(
            best("What is the population of City B?", text).as_deref(),
            Some("2.3 million")
        );
    }

    #[test]
    fn test_name_answer() {
        let text = "Telehealth services surged, with a report from McKinsey & Company indicating that 40% of patients used them.";
        assert_eq!(
            best("Which firm published the telehealth report?", text).as_deref(),
            Some("McKinsey & Company")
        );
    }

    #[test]
    fn test_unrelated_query_yields_nothing() {
        let (_, text) = SAMPLE_TEXTS[2];
        assert!(best("Who painted the ceiling?", text).is_none());
        assert!(best("what is the", text).is_none());
    }

    #[test]
    fn test_spans_are_within_content() {
        for (_, text) in SAMPLE_TEXTS {
            for candidate in LexicalExtractor::new().candidates("What was the rate in 2023?", text, 20) {
                assert!(candidate.span.end <= text.len());
                assert!(text.get(candidate.span.start..candidate.span.end).is_some());
                assert!((0.0..=1.0).contains(&candidate.score));
            }
        }
    }
}
