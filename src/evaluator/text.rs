//! Cleaning and tokenizing for answer scoring

use std::collections::HashSet;
use std::sync::OnceLock;

/// Common English function words, ignored when matching keywords
const STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you",
    "you're", "you've", "you'll", "you'd", "your", "yours", "yourself",
    "yourselves", "he", "him", "his", "himself", "she", "she's", "her",
    "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this",
    "that", "that'll", "these", "those", "am", "is", "are", "was", "were",
    "be", "been", "being", "have", "has", "had", "having", "do", "does",
    "did", "doing", "a", "an", "the", "and", "but", "if", "or", "because",
    "as", "until", "while", "of", "at", "by", "for", "with", "about",
    "against", "between", "into", "through", "during", "before", "after",
    "above", "below", "to", "from", "up", "down", "in", "out", "on", "off",
    "over", "under", "again", "further", "then", "once", "here", "there",
    "when", "where", "why", "how", "all", "any", "both", "each", "few",
    "more", "most", "other", "some", "such", "no", "nor", "not", "only",
    "own", "same", "so", "than", "too", "very", "s", "t", "can", "will",
    "just", "don", "don't", "should", "should've", "now", "d", "ll", "m",
    "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't",
    "didn", "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn",
    "hasn't", "haven", "haven't", "isn", "isn't", "ma", "mightn",
    "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
    "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won",
    "won't", "wouldn", "wouldn't",
];

static STOP_WORD_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();

pub fn is_stop_word(word: &str) -> bool
{   STOP_WORD_SET
      .get_or_init(|| STOP_WORDS.iter().copied().collect())
      .contains(word)
}

/// Trim and collapse whitespace runs to one space; case is kept.
pub fn collapse_whitespace(text: &str) -> String
{   text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-case, trim, collapse whitespace runs to one space.
pub fn clean(text: &str) -> String
{   collapse_whitespace(text).to_lowercase()
}

/// Alphanumeric tokens of the cleaned text, stop words removed.
pub fn content_tokens(text: &str) -> Vec<String>
{   clean(text)
      .split(|c: char| !c.is_alphanumeric())
      .filter(|t| !t.is_empty() && !is_stop_word(t))
      .map(str::to_string)
      .collect()
}

/// Clean keywords, dropping empties and repeats; first occurrence wins.
pub fn clean_keywords<S: AsRef<str>>(keywords: &[S]) -> Vec<String>
{   let mut seen = HashSet::new();
    keywords.iter()
      .map(|k| clean(k.as_ref()))
      .filter(|k| !k.is_empty() && seen.insert(k.clone()))
      .collect()
}
