use std::io::Error as IoError;
use thiserror::Error;
use visca_protocol::ParameterMap;

/// Error types.
#[derive(Debug, Error)]
pub enum Error {
    #[cfg(test)]
    #[error(transparent)]
    FromHexError(#[from] hex::FromHexError),

    #[error(transparent)]
    IoError(#[from] IoError),

    #[error(transparent)]
    Protocol(#[from] visca_protocol::Error),

    #[error("data parse error: {0}")]
    BinRwError(#[from] binrw::Error),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("channel unavailable, likely dropped")]
    ChannelUnavailable,

    #[error("sequence counter reset failed")]
    SequenceResetFailed,

    #[error("command kind cannot be sent as a request")]
    UnsupportedCommandKind,
}

/// Faults delivered to a request's lifecycle waiters.
///
/// These are cloneable so a single fault can reject every stage future of
/// the same request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The device answered with an error reply.
    #[error("device returned error reply {name:?}")]
    Device { name: String, values: ParameterMap },

    /// No candidate reply pattern recognised an inbound payload.
    #[error("no reply pattern recognised the inbound payload")]
    ProtocolViolation,

    /// The connection was closed while the request was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// The sequence reset handshake failed, taking the connection down.
    #[error("sequence counter reset failed")]
    SequenceReset,

    /// Another request was issued under this request's sequence number.
    /// Indicates a sequence-generator bug, not a normal occurrence.
    #[error("request superseded by sequence number reuse")]
    Superseded,
}
