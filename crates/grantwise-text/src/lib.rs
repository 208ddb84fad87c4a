//! Text processing for knowledge-base ingestion and query handling.
//!
//! - [`clean_text`] and [`split_into_sentences`] normalise raw entry text.
//! - [`TextProcessor`] packs sentences into token-bounded, overlapping
//!   chunks using the cl100k BPE vocabulary.
//! - [`extract_keywords`] pulls frequent content words out of a query.

mod chunker;
mod error;
mod keywords;
mod normalize;

pub use chunker::TextProcessor;
pub use error::TextError;
pub use keywords::extract_keywords;
pub use normalize::{clean_text, split_into_sentences};

/// Separator placed between context blocks handed to the language model.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Joins chunks into a single context string.
pub fn format_context(chunks: &[String], separator: &str) -> String {
    chunks.join(separator)
}
