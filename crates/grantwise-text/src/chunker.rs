//! Token-aware chunking.

use crate::error::TextError;
use crate::normalize::{clean_text, split_into_sentences};
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Splits entry text into overlapping chunks bounded by BPE token counts.
///
/// Cloning is cheap; the vocabulary is shared.
#[derive(Clone)]
pub struct TextProcessor {
    bpe: Arc<CoreBPE>,
}

impl fmt::Debug for TextProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextProcessor").finish_non_exhaustive()
    }
}

impl TextProcessor {
    /// Creates a processor using the cl100k vocabulary.
    pub fn new() -> Result<Self, TextError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| TextError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    /// Creates a processor for a model name, falling back to cl100k when
    /// the model is unknown.
    pub fn for_model(model: &str) -> Result<Self, TextError> {
        match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Ok(Self { bpe: Arc::new(bpe) }),
            Err(e) => {
                tracing::debug!(model, error = %e, "unknown tokenizer model, using cl100k_base");
                Self::new()
            }
        }
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Truncates `text` to at most `max_tokens` tokens.
    pub fn truncate_text(&self, text: &str, max_tokens: usize) -> Result<String, TextError> {
        let tokens = self.bpe.encode_with_special_tokens(text);
        if tokens.len() <= max_tokens {
            return Ok(text.to_string());
        }
        self.bpe
            .decode(tokens[..max_tokens].to_vec())
            .map_err(|e| TextError::Decode(e.to_string()))
    }

    /// Cleans `text` and packs its sentences into chunks of at most
    /// `chunk_size` tokens.
    ///
    /// When a chunk is full, the next one starts with the longest run of
    /// trailing sentences from it whose token total fits in
    /// `chunk_overlap`. A sentence longer than `chunk_size` becomes a chunk
    /// of its own rather than being cut.
    pub fn create_chunks(&self, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
        let cleaned = clean_text(text);
        let sentences = split_into_sentences(&cleaned);

        let mut chunks = Vec::new();
        let mut current: Vec<(String, usize)> = Vec::new();
        let mut current_tokens = 0;

        for sentence in sentences {
            let sentence_tokens = self.count_tokens(&sentence);

            if current_tokens + sentence_tokens > chunk_size && !current.is_empty() {
                chunks.push(join_sentences(&current));

                let mut overlap = Vec::new();
                let mut overlap_tokens = 0;
                if chunk_overlap > 0 {
                    for (prev, prev_tokens) in current.iter().rev() {
                        if overlap_tokens + prev_tokens > chunk_overlap {
                            break;
                        }
                        overlap.push((prev.clone(), *prev_tokens));
                        overlap_tokens += prev_tokens;
                    }
                    overlap.reverse();
                }
                current = overlap;
                current_tokens = overlap_tokens;
            }

            current_tokens += sentence_tokens;
            current.push((sentence, sentence_tokens));
        }

        if !current.is_empty() {
            chunks.push(join_sentences(&current));
        }

        chunks
    }
}

fn join_sentences(sentences: &[(String, usize)]) -> String {
    sentences
        .iter()
        .map(|(s, _)| s.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
