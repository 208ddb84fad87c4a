use regex::Regex;
use std::sync::LazyLock;

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid link regex"));
static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));

/// Rewrites a markdown answer into text suited for a text-to-speech avatar.
///
/// Bold markers are dropped, links are reduced to their label, bare URLs
/// are spoken as "link in description", and list items and paragraph
/// breaks become pauses.
pub fn format_for_speech(text: &str) -> String {
    let text = text.replace("**", "");
    let text = MARKDOWN_LINK.replace_all(&text, "$1");
    let text = BARE_URL.replace_all(&text, "link in description");
    text.replace("\n- ", "\n... ")
        .replace("\n* ", "\n... ")
        .replace("\n\n", " ... ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_for_speech() {
        let input = "**Deadline:** March\n\nSee [the site](https://x.org) or https://y.org/apply\n- one\n* two";
        assert_eq!(
            format_for_speech(input),
            "Deadline: March ... See the site or link in description\n... one\n... two"
        );
    }
}
