//! # MPEG Transport Stream (TS) demuxing
//!
//! The front half of the transmux pipeline for TS input:
//!
//! - [`TransportPacketStream`] cuts a byte stream into 188 byte packets,
//!   resyncing on the `0x47` sync byte
//! - [`TransportParseStream`] reads the PAT and PMT and routes PES packets
//!   by PID
//! - [`ElementaryStream`] reassembles PES packets and announces tracks
//! - [`TimestampRolloverStream`] unwraps 33-bit pts/dts rollover
//!
//! ## Example
//!
//! ```rust
//! use vdkmux::av::Stage;
//! use vdkmux::format::ts::{writer, TransportPacketStream, TransportParseStream, TsPacket};
//! use bytes::Bytes;
//!
//! let mut input = writer::pat_packet(0x1000, 0);
//! input.extend(writer::pmt_packet(0x1000, &[(0x1b, 256)], 0));
//!
//! let mut packets = Vec::new();
//! let mut framer = TransportPacketStream::new();
//! framer.push(Bytes::from(input), &mut packets);
//! framer.flush(&mut packets);
//!
//! let mut parser = TransportParseStream::new();
//! let mut parsed = Vec::new();
//! for packet in packets {
//!     parser.push(packet, &mut parsed);
//! }
//! assert!(matches!(parsed[1], TsPacket::Pmt(ref table) if table.video == Some(256)));
//! ```

/// PAT/PMT routing and PES reassembly
pub mod demuxer;

/// Low-level TS packet parsing and probing utilities
pub mod parser;

/// PES header parsing
pub mod pes;

/// 33-bit timestamp rollover correction
pub mod rollover;

/// Core TS types and constants
pub mod types;

/// Packetizer for building transport streams
pub mod writer;

pub use demuxer::{ElementaryStream, TransportParseStream};
pub use parser::{transport_packets, TransportPacketStream};
pub use pes::PesPacket;
pub use rollover::TimestampRolloverStream;
pub use types::{
    ElementaryEvent,
    ElementaryPacket,
    ProgramMapTable,
    TsPacket,
    PID_NULL,
    PID_PAT,
    PID_PMT,
    STREAM_TYPE_AAC,
    STREAM_TYPE_H264,
    STREAM_TYPE_METADATA,
    TS_PACKET_SIZE,
};
