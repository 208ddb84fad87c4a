use regex::Regex;
use std::sync::LazyLock;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-z]+\b").expect("valid regex"));

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "up", "down", "out", "over", "under", "is", "are", "was", "were", "be", "been",
    "being", "have", "has", "had", "do", "does", "did", "will", "would", "could", "should",
    "may", "might", "must", "can", "this", "that", "these", "those",
];

const MAX_KEYWORDS: usize = 10;

/// Returns up to ten content words from `text`, most frequent first.
///
/// Words are lowercase ASCII runs longer than three letters that are not
/// stop words. Ties keep first-occurrence order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut counts: Vec<(&str, usize)> = Vec::new();

    for m in WORD.find_iter(&lowered) {
        let word = m.as_str();
        if word.len() <= 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        match counts.iter_mut().find(|(w, _)| *w == word) {
            Some((_, n)) => *n += 1,
            None => counts.push((word, 1)),
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(w, _)| w.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequent_words_rank_first() {
        let keywords =
            extract_keywords("Digital residency in Europe: which digital programs fund digital art?");
        assert_eq!(keywords[0], "digital");
        assert_eq!(&keywords[1..], ["residency", "europe", "which", "programs", "fund"]);
    }

    #[test]
    fn short_and_stop_words_are_dropped() {
        assert!(extract_keywords("Is the art for me?").is_empty());
    }

    #[test]
    fn at_most_ten_keywords() {
        let text = "alpha bravo charlie delta echoes foxtrot golfer hotel india juliet kilos limas";
        assert_eq!(extract_keywords(text).len(), 10);
    }
}
