use thiserror::Error;

/// Failure to turn a binary record back into JSON text.
///
/// Every variant carries the input offset at which decoding stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("invalid additional information {info} for major type {major} at offset {offset}")]
    InvalidAdditionalInfo { major: u8, info: u8, offset: usize },

    #[error("unexpected break marker at offset {offset}")]
    UnexpectedBreak { offset: usize },

    #[error("unsupported tag {tag} at offset {offset}")]
    UnsupportedTag { tag: u64, offset: usize },

    #[error("unsupported simple value {value} at offset {offset}")]
    UnsupportedSimple { value: u8, offset: usize },

    #[error("expected {expected} at offset {offset}")]
    UnexpectedType { expected: &'static str, offset: usize },

    #[error("map key is not a string at offset {offset}")]
    InvalidMapKey { offset: usize },

    #[error("indefinite string chunk of the wrong type at offset {offset}")]
    InvalidChunk { offset: usize },

    #[error("network address of {len} bytes at offset {offset}")]
    InvalidAddress { len: usize, offset: usize },

    #[error("timestamp out of range at offset {offset}")]
    InvalidTimestamp { offset: usize },

    #[error("nesting deeper than {limit} levels at offset {offset}")]
    TooDeep { limit: usize, offset: usize },
}

impl DecodeError {
    /// Input offset at which decoding stopped.
    pub fn offset(&self) -> usize {
        match *self {
            DecodeError::UnexpectedEof { offset }
            | DecodeError::InvalidAdditionalInfo { offset, .. }
            | DecodeError::UnexpectedBreak { offset }
            | DecodeError::UnsupportedTag { offset, .. }
            | DecodeError::UnsupportedSimple { offset, .. }
            | DecodeError::UnexpectedType { offset, .. }
            | DecodeError::InvalidMapKey { offset }
            | DecodeError::InvalidChunk { offset }
            | DecodeError::InvalidAddress { offset, .. }
            | DecodeError::InvalidTimestamp { offset }
            | DecodeError::TooDeep { offset, .. } => offset,
        }
    }
}
