use grantwise_text::{format_context, CONTEXT_SEPARATOR};
use grantwise_types::SearchHit;

pub const NO_RESULTS: &str = "No relevant information found.";

/// Renders hits as labelled context blocks for the prompt.
pub fn format_results(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }

    let blocks: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let meta = &hit.metadata;

            let mut header = Vec::new();
            if !meta.entry_name.is_empty() {
                header.push(format!("**{}**", meta.entry_name));
            }
            if !meta.organization.is_empty() {
                header.push(format!("by {}", meta.organization));
            }
            let header = if header.is_empty() {
                format!("**Source {}**", i + 1)
            } else {
                header.join(" ")
            };

            let mut details = Vec::new();
            if !meta.kind.is_empty() {
                details.push(format!("Type: {}", meta.kind));
            }
            if !meta.location.is_empty() {
                details.push(format!("Location: {}", meta.location));
            }
            if !meta.deadline.is_empty() {
                details.push(format!("Deadline: {}", meta.deadline));
            }

            let mut parts = vec![header];
            if !details.is_empty() {
                parts.push(format!("[{}]", details.join(", ")));
            }
            parts.push(hit.text.clone());
            parts.join("\n")
        })
        .collect();

    format_context(&blocks, CONTEXT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grantwise_types::ChunkMetadata;

    #[test]
    fn formats_headers_and_details() {
        let hits = vec![
            SearchHit {
                id: "a_chunk_0".into(),
                text: "Studio and stipend.".into(),
                metadata: ChunkMetadata {
                    entry_name: "Saari Residence".into(),
                    organization: "Kone Foundation".into(),
                    kind: "residency".into(),
                    location: "Finland".into(),
                    ..ChunkMetadata::default()
                },
                score: 0.9,
            },
            SearchHit {
                id: "b_chunk_0".into(),
                text: "Anonymous chunk.".into(),
                metadata: ChunkMetadata::default(),
                score: 0.5,
            },
        ];
        assert_eq!(
            format_results(&hits),
            "**Saari Residence** by Kone Foundation\n[Type: residency, Location: Finland]\nStudio and stipend.\
             \n\n---\n\n**Source 2**\nAnonymous chunk."
        );
    }

    #[test]
    fn empty_hits() {
        assert_eq!(format_results(&[]), NO_RESULTS);
    }
}
