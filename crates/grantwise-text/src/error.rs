use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextError {
    #[error("tokenizer unavailable: {0}")]
    Tokenizer(String),

    #[error("failed to decode tokens: {0}")]
    Decode(String),
}
