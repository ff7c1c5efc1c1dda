//! # H.264/AVC elementary stream handling
//!
//! - [`NalByteStream`] finds NAL unit boundaries in an Annex B byte stream
//! - [`H264Stream`] tags each unit with its timestamps and type
//! - [`read_sequence_parameter_set`] decodes picture size and aspect ratio
//!
//! ## Example
//!
//! ```rust
//! use vdkmux::av::Stage;
//! use vdkmux::codec::h264::{NalByteStream, NalUnitType};
//! use bytes::Bytes;
//!
//! let mut scanner = NalByteStream::new();
//! let mut units = Vec::new();
//! scanner.push(Bytes::from_static(&[0, 0, 0, 1, 0x09, 0xf0, 0, 0, 1, 0x65, 0x88]), &mut units);
//! scanner.flush(&mut units);
//!
//! assert_eq!(units.len(), 2);
//! assert_eq!(NalUnitType::from(units[1][0] & 0x1f), NalUnitType::CodedSliceIDR);
//! ```

/// Annex B start code scanning
pub mod nal;
/// Parameter set parsing
pub mod parser;
/// NAL unit classification stage
pub mod stream;
/// NAL unit types and parsed parameter sets
pub mod types;

#[doc(inline)]
pub use nal::NalByteStream;
#[doc(inline)]
pub use parser::{discard_emulation_prevention_bytes, read_sequence_parameter_set};
#[doc(inline)]
pub use stream::H264Stream;
#[doc(inline)]
pub use types::*;
