#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("header truncated: need {needed} bytes, got {len}")]
    Truncated { needed: usize, len: usize },

    #[error("start of DialogID (0x80) not found at index {offset}, found {found:#04x}")]
    TagMismatch { offset: usize, found: u8 },

    #[error("DialogID has zero length")]
    EmptyIdentifier,

    #[error("long-form DialogID length {0:#04x} is not supported")]
    LongFormIdentifierLength(u8),
}
