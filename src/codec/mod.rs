//! Elementary stream parsers for the codecs carried in transport streams.

/// ADTS/AAC
pub mod aac;
/// H.264/AVC
pub mod h264;

pub use aac::{AdtsFrame, AdtsStream};
pub use h264::{H264Stream, NalUnit, NalUnitType};
