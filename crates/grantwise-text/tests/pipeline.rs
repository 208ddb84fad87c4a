use grantwise_text::{extract_keywords, format_context, TextProcessor, CONTEXT_SEPARATOR};

const ENTRY: &str = "# Nordic Light Residency
**Organization:** Nordic Art Foundation
**Type:** residency

## Description
A two-month residency in Tromsø for lens-based artists. Residents receive a private studio and a monthly stipend.

## Benefits
- Studio
- Stipend";

#[test]
fn rendered_entry_fits_in_one_default_chunk() {
    let processor = TextProcessor::for_model("gpt-4").unwrap();
    let chunks = processor.create_chunks(ENTRY, 1000, 200);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].starts_with("# Nordic Light Residency"));
    assert!(!chunks[0].contains('\n'));
}

#[test]
fn unknown_model_falls_back_to_default_vocabulary() {
    let processor = TextProcessor::for_model("not-a-model").unwrap();
    assert!(processor.count_tokens("residency") > 0);
}

#[test]
fn keywords_and_context_helpers() {
    assert_eq!(
        extract_keywords("Residency residency studio")[..2],
        ["residency".to_string(), "studio".to_string()]
    );
    let joined = format_context(&["a".into(), "b".into()], CONTEXT_SEPARATOR);
    assert_eq!(joined, "a\n\n---\n\nb");
}
