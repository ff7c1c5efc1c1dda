#![doc(html_root_url = "https://docs.rs/vdkmux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # vdkmux - streaming transmuxer
//!
//! `vdkmux` converts MPEG-2 transport streams and raw ADTS audio into
//! fragmented MP4 (`ftyp`/`moov` init segments plus `moof`/`mdat` media
//! segments) that Media Source Extensions players can append directly.
//!
//! ## Features
//!
//! ### Input
//! - MPEG-2 TS with PAT/PMT routing and PES reassembly
//! - Raw ADTS/AAC with leading ID3 tags carrying the transport timestamp
//! - 33-bit pts/dts rollover correction
//!
//! ### Elementary streams
//! - H.264/AVC NAL unit scanning and SPS parsing
//! - AAC in ADTS framing
//! - CEA-608 closed captions carried in SEI NAL units
//! - ID3v2 timed metadata
//!
//! ### Output
//! - One `moof`/`mdat` per GOP, with GOP fusion and keyframe repair
//! - Combined or per-track segments
//! - GOP alignment against another rendition
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! vdkmux = "0.1.0"
//! ```
//!
//! ```rust,no_run
//! use vdkmux::{Transmuxer, TransmuxerEvent, TransmuxerOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
//! transmuxer.push(&std::fs::read("segment0.ts")?);
//! transmuxer.flush();
//!
//! for event in transmuxer.take_events() {
//!     if let TransmuxerEvent::Data(segment) = event {
//!         if let Some(init) = &segment.init_segment {
//!             std::fs::write("init.mp4", init)?;
//!         }
//!         std::fs::write("segment0.m4s", &segment.boxes)?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Hosted on tokio
//!
//! ```rust,no_run
//! use vdkmux::{host, TransmuxerOptions};
//!
//! #[tokio::main]
//! async fn main() -> vdkmux::Result<()> {
//!     let file = tokio::fs::File::open("segment0.ts").await?;
//!     let events = host::transmux_reader(file, TransmuxerOptions::default(), 64 * 1024).await?;
//!     println!("{} events", events.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: the `Stage` seam, tracks and samples
//! - `format`: TS demuxing and raw AAC framing
//! - `codec`: H.264 and ADTS elementary stream parsing
//! - `caption`: CEA-608 caption extraction
//! - `metadata`: ID3 tag reassembly
//! - `mp4`: box writing and probing
//! - `transmuxer`: segment building and the `Transmuxer` itself
//! - `host`: async hosting on tokio
//! - `config`: options and process-wide defaults
//! - `utils`: bit reading, CRC and clock helpers

/// Pipeline seam, tracks and samples
pub mod av;

/// CEA-608 captions from SEI NAL units
pub mod caption;

/// Elementary stream parsers
pub mod codec;

/// Configuration module
pub mod config;

/// Error types and utilities
pub mod error;

/// Container demuxing (TS, raw AAC)
pub mod format;

/// Async hosting on tokio
pub mod host;

/// ID3 timed metadata
pub mod metadata;

/// Fragmented MP4 boxes
pub mod mp4;

/// Segment building and the transmuxer
pub mod transmuxer;

/// Common utilities and helper functions
pub mod utils;

pub use config::TransmuxerOptions;
pub use error::{Result, VdkError};
pub use transmuxer::{Segment, SegmentType, Transmuxer, TransmuxerEvent};
