use grantwise_text::extract_keywords;

const MAX_KEYWORDS: usize = 5;

/// Trigger substrings and the domain terms they pull into the query.
const DOMAIN_EXPANSIONS: &[(&[&str], &[&str])] = &[
    (
        &["digital", "new media", "technology"],
        &["digital art", "new media", "technology-based"],
    ),
    (&["europe", "european", "eu"], &["European", "EU", "Europe-based"]),
    (
        &["residency", "residence"],
        &["artist residency", "residential program"],
    ),
    (
        &["grant", "funding", "fellowship"],
        &["grant", "funding", "financial support"],
    ),
    (
        &["emerging", "early career", "young"],
        &["emerging artist", "early career", "young artist"],
    ),
];

/// Expands a user query with its top keywords and related domain terms to
/// widen the embedding search.
pub fn enhance_query(query: &str) -> String {
    let lower = query.to_lowercase();
    let keywords = extract_keywords(query);

    let domain_terms: Vec<&str> = DOMAIN_EXPANSIONS
        .iter()
        .filter(|(triggers, _)| triggers.iter().any(|t| lower.contains(t)))
        .flat_map(|(_, terms)| terms.iter().copied())
        .collect();

    let mut parts = vec![query.to_string()];
    if !keywords.is_empty() {
        let top: Vec<&str> = keywords.iter().take(MAX_KEYWORDS).map(String::as_str).collect();
        parts.push(top.join(" "));
    }
    if !domain_terms.is_empty() {
        parts.push(domain_terms.join(" "));
    }
    parts.join(" ")
}
