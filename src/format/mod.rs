//! Container formats the transmuxer reads.

/// Raw ADTS/AAC with ID3 timestamp tags
pub mod aac;

/// MPEG-2 transport streams
pub mod ts;
