use thiserror::Error;

/// Error types.
#[derive(Debug, Error)]
pub enum Error {
    #[cfg(test)]
    #[error(transparent)]
    FromHexError(#[from] hex::FromHexError),

    #[error("data parse error: {0}")]
    BinRwError(#[from] binrw::Error),

    #[error("required parameter missing: {name}")]
    MissingParameter { name: String },

    #[error("parameter value outside its domain: {name}")]
    InvalidParameter { name: String },

    #[error("nibble count mismatch: expected {expected}, got {actual}")]
    NibbleCount { expected: usize, actual: usize },

    #[error("no enumeration name for code {code:#x}")]
    UnknownCode { code: u32 },

    #[error("{marker:?} is not a legal marker character")]
    InvalidMarker { marker: char },

    #[error("binding {markers:?} does not cover {expected} nibbles")]
    MarkerCount { markers: String, expected: usize },

    #[error("template marker {marker:?} has no binding")]
    UnboundMarker { marker: char },

    #[error("binding marker {marker:?} is not consumed by the template")]
    UnusedBinding { marker: char },

    #[error("pattern does not map to whole bytes ({nibbles} nibbles)")]
    OddPatternLength { nibbles: usize },

    #[error("payload does not match the pattern")]
    Mismatch,

    #[error("no command at path segment {segment:?}")]
    CommandNotFound { segment: String },
}
