//! Errors raised by the encoder pipeline.
//!
//! Each variant corresponds to a row in the error table of the encoder
//! design: a flush-time failure, a programmer-error guard, or a paranoid
//! round-trip mismatch. `HighMismatchWarning` is intentionally absent here
//! -- it is advisory only and is surfaced through the `log` facade, not as
//! a `Result` error (see [`crate::driver::EncoderDriver`]).

use std::io;

/// The error type returned by the encoder pipeline.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    /// The output or index sink failed to write, flush, or close.
    #[error("sink I/O error: {0}")]
    SinkIo(#[source] io::Error),

    /// The reference provider could not supply bases for a sequence id.
    #[error("failed to fetch reference bases for sequence {sequence_id}: {message}")]
    ReferenceFetch { sequence_id: usize, message: String },

    /// A track-requiring quality preservation policy was applied to a
    /// multi-reference batch.
    #[error("lossy quality preservation is not supported on a multi-reference batch")]
    LossyMultiRefNotSupported,

    /// The paranoid round-trip assertion failed.
    #[error("round-trip mismatch for record {index}: {field} differs after re-decoding")]
    RoundTripMismatch { index: u64, field: &'static str },

    /// `write_alignment` (or `finish`) was called before `write_header`.
    #[error("write_header must be called before write_alignment or finish")]
    HeaderNotYetWritten,

    /// `write_header` was called more than once. The source this spec was
    /// distilled from left this unguarded (a noted TODO); this writer treats
    /// a second call as a programmer error instead.
    #[error("write_header must only be called once")]
    HeaderAlreadyWritten,

    /// Any other I/O failure not otherwise classified.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, EncodeError>;
