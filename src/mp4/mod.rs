//! # Fragmented MP4 output
//!
//! - [`Mp4Box`] models a box tree and serializes it
//! - [`generator`] builds init segments (`ftyp` + `moov`) and media segment
//!   headers (`moof`) from [`Track`](crate::av::Track)s
//! - [`inspect`] reads boxes back, for consumers and tests
//!
//! ## Example
//!
//! ```rust
//! use vdkmux::av::{CodecType, Sample, Track, TrackType};
//! use vdkmux::mp4::{generator, inspect};
//!
//! let mut track = Track::new(256, TrackType::Video, CodecType::H264);
//! track.base_media_decode_time = 90_000;
//! track.samples.push(Sample::new(10, 3000));
//!
//! let moof = generator::moof(1, &[track]).to_bytes();
//! assert_eq!(inspect::base_media_decode_time(&moof), Some(90_000));
//! ```

mod boxes;

/// Box builders for init and media segments
pub mod generator;

/// Box reading helpers
pub mod inspect;

pub use boxes::Mp4Box;
pub use generator::{init_segment, mdat, moof};
