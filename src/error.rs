use thiserror::Error;

/// Errors produced while decoding or encoding an archive.
#[derive(Debug, Error)]
pub enum PakError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk: {0}")]
    Walk(#[from] walkdir::Error),

    /// The header table could not be read, even after the legacy retry.
    #[error("invalid pak: {0}")]
    Format(String),

    /// A record or payload slice falls outside the logical buffer.
    #[error("offset {offset:#x} + {size:#x} is outside a buffer of {len:#x} bytes")]
    Offset { offset: u64, size: u64, len: usize },

    /// The overflow attach offset stored in the primary file is zero.
    #[error("pak layout with a zero pab offset is not supported")]
    UnsupportedLayout,

    #[error("invalid input: {0}")]
    Input(String),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("unsupported extension {extension:?} for {path}")]
    UnsupportedExtension { path: String, extension: String },

    #[error("path does not fit the 160-byte field: {path}")]
    PathTooLong { path: String },

    #[error("script compile failed for {path}: {message}")]
    Script { path: String, message: String },

    #[error("invalid entry: {0}")]
    InvalidEntry(String),
}

pub type PakResult<T> = Result<T, PakError>;
