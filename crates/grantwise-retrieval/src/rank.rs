use grantwise_types::SearchHit;
use std::collections::HashSet;

const TERM_BOOST: f64 = 0.1;
const DEADLINE_BOOST: f64 = 0.15;
const LOCATION_BOOST: f64 = 0.2;
const DISCIPLINE_BOOST: f64 = 0.15;
const FINGERPRINT_CHARS: usize = 100;

/// Reorders hits by vector score plus lexical and metadata boosts.
///
/// Each distinct whitespace-separated query word found in the chunk text
/// adds a small boost; so do a deadline on deadline questions and query
/// words that appear in the location or disciplines. The sort is stable.
pub fn rerank(query: &str, hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let lower = query.to_lowercase();
    let words: HashSet<&str> = lower.split_whitespace().collect();
    let asks_deadline = lower.contains("deadline");

    let mut scored: Vec<(f64, SearchHit)> = hits
        .into_iter()
        .map(|hit| {
            let mut score = hit.score;
            let text = hit.text.to_lowercase();
            score += words.iter().filter(|w| text.contains(*w)).count() as f64 * TERM_BOOST;

            let meta = &hit.metadata;
            if asks_deadline && !meta.deadline.is_empty() {
                score += DEADLINE_BOOST;
            }
            if mentions_any(&meta.location, &words) {
                score += LOCATION_BOOST;
            }
            if mentions_any(&meta.disciplines, &words) {
                score += DISCIPLINE_BOOST;
            }
            (score, hit)
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, hit)| hit).collect()
}

fn mentions_any(field: &str, words: &HashSet<&str>) -> bool {
    if field.is_empty() {
        return false;
    }
    let field = field.to_lowercase();
    words.iter().any(|w| field.contains(*w))
}

/// Drops repeated chunks and limits runs from a single entry.
///
/// A hit is dropped only when both its `(source, chunk)` key and its text
/// fingerprint were seen before. A kept hit that makes two of the last
/// three kept hits come from the same entry, directly after another chunk
/// of that entry, is removed again.
pub fn deduplicate(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut unique: Vec<SearchHit> = Vec::with_capacity(hits.len());
    let mut seen_keys = HashSet::new();
    let mut seen_texts = HashSet::new();

    for hit in hits {
        let key = format!("{}_{}", hit.metadata.source_id, hit.metadata.chunk_index);
        let fingerprint: String = hit
            .text
            .chars()
            .take(FINGERPRINT_CHARS)
            .collect::<String>()
            .to_lowercase()
            .trim()
            .to_string();

        if seen_keys.contains(&key) && seen_texts.contains(&fingerprint) {
            continue;
        }
        seen_keys.insert(key);
        seen_texts.insert(fingerprint);

        let source = hit.metadata.source_id.clone();
        unique.push(hit);

        let len = unique.len();
        if len >= 2 && unique[len - 2].metadata.source_id == source {
            let same_source = unique[len.saturating_sub(3)..]
                .iter()
                .filter(|h| h.metadata.source_id == source)
                .count();
            if same_source >= 2 {
                unique.pop();
            }
        }
    }
    unique
}
