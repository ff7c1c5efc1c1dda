use std::num::ParseIntError;
use thiserror::Error;

/// Errors produced by the low-level decoders and the host layer.
///
/// Pipeline stages never surface these to the caller; a failed decode is
/// logged and the offending unit is skipped.
#[derive(Error, Debug)]
pub enum VdkError {
    /// I/O failure while reading a source or writing a config template
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed codec payload (SPS, ADTS header, bitstream underrun)
    #[error("codec error: {0}")]
    Codec(String),

    /// Host channel closed or message could not be delivered
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Container-level parse failure (TS, PES, ID3, MP4 boxes)
    #[error("parser error: {0}")]
    Parser(String),

    /// Input shorter or shaped differently than its header declares
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Malformed integer in a configuration value
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

/// Result alias used by every fallible function in the crate
pub type Result<T> = std::result::Result<T, VdkError>;
