//! Cheap text heuristics applied to generated answers.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

const BASE_CONFIDENCE: f64 = 0.8;
const MAX_SOURCES: usize = 5;

const UNCERTAINTY_PHRASES: &[&str] = &[
    "i don't have",
    "no information",
    "not found",
    "unable to find",
    "not mentioned",
    "unclear",
    "not specified",
    "might",
    "possibly",
    "it seems",
    "appears to be",
];

static SPECIFIC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b\d{4}\b|\b\d{1,2}/\d{1,2}\b",
        r"https?://\S+|www\.\S+",
        r"\$[\d,]+|\d+\s*(?:USD|EUR|GBP)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Scores a response in `[0.1, 1.0]`.
///
/// Hedging phrases lower the score; concrete dates, links and amounts
/// raise it slightly.
pub fn calculate_confidence(response: &str, _context: &str) -> f64 {
    let lower = response.to_lowercase();
    let mut confidence = BASE_CONFIDENCE;

    for phrase in UNCERTAINTY_PHRASES {
        if lower.contains(phrase) {
            confidence -= 0.1;
        }
    }

    let specifics: usize = SPECIFIC_PATTERNS
        .iter()
        .map(|re| re.find_iter(response).count())
        .sum();
    confidence += (specifics as f64 * 0.05).min(0.15);

    confidence.clamp(0.1, 1.0)
}

/// Pulls source names out of a formatted context block.
///
/// Bold header lines (`**Name**`) yield the name; `Name by Org` lines
/// yield the organization. At most five distinct sources are returned.
pub fn extract_sources(context: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for line in context.lines() {
        let line = line.trim();
        let candidate = if line.len() >= 4 && line.starts_with("**") && line.ends_with("**") {
            Some(line.trim_matches('*').trim().to_string())
        } else if line.contains(" by ") && !line.starts_with('[') {
            let parts: Vec<&str> = line.split(" by ").collect();
            (parts.len() == 2).then(|| parts[1].trim().to_string())
        } else {
            None
        };

        if let Some(name) = candidate {
            if !name.is_empty() && seen.insert(name.clone()) {
                sources.push(name);
            }
        }
    }

    sources.truncate(MAX_SOURCES);
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hedging_lowers_confidence() {
        let sure = calculate_confidence("Apply through the portal.", "");
        let unsure = calculate_confidence("It seems this might possibly be open.", "");
        assert!((sure - 0.8).abs() < 1e-9);
        assert!((unsure - 0.5).abs() < 1e-9);
    }

    #[test]
    fn specifics_raise_confidence_up_to_cap() {
        let one = calculate_confidence("The deadline is in 2025.", "");
        assert!((one - 0.85).abs() < 1e-9);
        let many = calculate_confidence(
            "Deadline 3/15 2025, award $5,000 or 4000 EUR, see https://example.org",
            "",
        );
        assert!((many - 0.95).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_floored() {
        let text = "I don't have it, no information, not found, unable to find, not mentioned, \
                    unclear, not specified, might, possibly, it seems";
        assert!((calculate_confidence(text, "") - 0.1).abs() < 1e-9);
    }

    #[test]
    fn sources_from_headers_and_bylines() {
        let context = "**Berlin Residency**\n[Type: residency]\nText\n\n---\n\n\
                       Helsinki Grant by Kone Foundation\n**Berlin Residency**\n**Source 3**";
        assert_eq!(
            extract_sources(context),
            vec!["Berlin Residency", "Kone Foundation", "Source 3"]
        );
    }

    #[test]
    fn sources_are_capped() {
        let context: String = (0..8).map(|i| format!("**Entry {i}**\n")).collect();
        assert_eq!(extract_sources(&context).len(), 5);
    }
}
