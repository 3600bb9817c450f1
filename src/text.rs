use regex::Regex;
use std::sync::OnceLock;

/// Words that carry no retrieval signal on their own
const STOPWORDS: &[&str] = &[
    "a", "about", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by",
    "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "how", "i", "if",
    "in", "into", "is", "it", "its", "many", "much", "of", "on", "or", "our", "so", "than",
    "that", "the", "their", "them", "there", "these", "they", "this", "to", "was", "we", "were",
    "what", "when", "where", "which", "who", "whom", "why", "will", "with", "would", "you",
];

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("word pattern is valid"))
}

/// A word token with its byte range in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Normalized form (lowercase, lightly stemmed)
    pub term: String,
    pub start: usize,
    pub end: usize,
}

/// Split text into normalized word tokens, keeping stopwords
pub fn tokenize(text: &str) -> Vec<Token> {
    word_regex()
        .find_iter(text)
        .map(|m| Token {
            term: normalize_term(m.as_str()),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// Normalized content terms of a text, stopwords removed, in order of appearance
pub fn content_terms(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .map(|t| t.term)
        .filter(|t| !is_stopword(t))
        .collect()
}

pub fn is_stopword(term: &str) -> bool {
    STOPWORDS.binary_search(&term).is_ok()
}

/// Lowercase and strip a plural suffix so "systems" matches "system"
pub fn normalize_term(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.len() > 3
        && lower.ends_with('s')
        && !lower.ends_with("ss")
        && !lower.ends_with("us")
        && !lower.ends_with("is")
        && lower.chars().all(|c| c.is_alphabetic())
    {
        lower[..lower.len() - 1].to_string()
    } else {
        lower
    }
}
