//! Whitespace, control-character, and sentence normalisation.

/// Collapses whitespace, strips control characters, straightens curly
/// quotes, and trims.
pub fn clean_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    collapsed
        .chars()
        .filter(|c| !is_stripped_control(*c))
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_stripped_control(c: char) -> bool {
    matches!(c,
        '\u{00}'..='\u{08}'
        | '\u{0B}'..='\u{0C}'
        | '\u{0E}'..='\u{1F}'
        | '\u{7F}'..='\u{9F}')
}

/// Splits text into sentences.
///
/// A boundary is a run of whitespace preceded by `.`, `!` or `?` and
/// followed by an uppercase ASCII letter. Each piece is further split on
/// newlines; pieces missing terminal punctuation get a trailing `.`.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (_, c) = chars[i];
        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            if j > i + 1 && j < chars.len() && chars[j].1.is_ascii_uppercase() {
                let end = chars[i + 1].0;
                pieces.push(&text[start..end]);
                start = chars[j].0;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    pieces.push(&text[start..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .flat_map(|sentence| sentence.split('\n'))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part.ends_with(['.', '!', '?']) {
                part.to_string()
            } else {
                format!("{}.", part)
            }
        })
        .collect()
}
