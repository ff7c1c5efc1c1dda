use crate::av::{Track, TrackType};
use bytes::Bytes;
use std::collections::BTreeMap;

// PIDs
/// Program association table
pub const PID_PAT: u16 = 0x0000;
/// Default program map PID
pub const PID_PMT: u16 = 0x1000;
/// Null packets
pub const PID_NULL: u16 = 0x1fff;

// Table IDs
/// PAT section table id
pub const TABLE_ID_PAT: u8 = 0x00;
/// PMT section table id
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary Stream Types
/// H.264/AVC video
pub const STREAM_TYPE_H264: u8 = 0x1b;
/// ADTS AAC
pub const STREAM_TYPE_AAC: u8 = 0x0f;
/// ID3 timed metadata in PES
pub const STREAM_TYPE_METADATA: u8 = 0x15;

// Stream IDs used when writing PES headers
/// First video stream id
pub const STREAM_ID_H264: u8 = 0xe0;
/// First audio stream id
pub const STREAM_ID_AAC: u8 = 0xc0;
/// private_stream_1
pub const STREAM_ID_METADATA: u8 = 0xbd;

// Constants
/// First byte of every packet
pub const SYNC_BYTE: u8 = 0x47;
/// Bytes per transport packet
pub const TS_PACKET_SIZE: usize = 188;
/// Fixed header bytes
pub const TS_HEADER_SIZE: usize = 4;
/// PES timestamp clock
pub const PTS_HZ: u64 = 90_000;

/// Classification of a transport packet by PID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Program association table
    Pat,
    /// Program map table
    Pmt,
    /// PES data on a mapped elementary PID
    Pes,
    /// Null or unmapped PID
    Unknown,
}

/// Active program map: which PIDs carry which elementary streams.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramMapTable {
    /// First H.264 PID listed
    pub video: Option<u16>,
    /// First ADTS PID listed
    pub audio: Option<u16>,
    /// Every ID3 metadata PID and its stream type
    pub timed_metadata: BTreeMap<u16, u8>,
    /// ES info descriptor bytes of each metadata PID
    pub metadata_descriptors: BTreeMap<u16, Bytes>,
    /// Every elementary PID and its stream type
    pub streams: BTreeMap<u16, u8>,
}

impl ProgramMapTable {
    /// Stream type registered for `pid`
    pub fn stream_type(&self, pid: u16) -> Option<u8> {
        self.streams.get(&pid).copied()
    }

    /// Track kind of a PID under this table
    pub fn track_type(&self, pid: u16) -> Option<TrackType> {
        if self.video == Some(pid) {
            Some(TrackType::Video)
        } else if self.audio == Some(pid) {
            Some(TrackType::Audio)
        } else if self.timed_metadata.contains_key(&pid) {
            Some(TrackType::TimedMetadata)
        } else {
            None
        }
    }
}

/// Output of the transport parse stage
#[derive(Debug, Clone, PartialEq)]
pub enum TsPacket {
    /// A PAT naming the PMT PID
    Pat { pmt_pid: u16 },
    /// A program map that is currently in force
    Pmt(ProgramMapTable),
    /// A PES fragment for a mapped PID
    Pes {
        /// Elementary PID
        pid: u16,
        /// Stream type from the PMT
        stream_type: u8,
        /// `payload_unit_start_indicator`
        payload_unit_start: bool,
        /// Packet payload after any adaptation field
        data: Bytes,
    },
}

/// A reassembled PES payload tagged with its track.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementaryPacket {
    /// Kind of elementary stream
    pub track_type: TrackType,
    /// Elementary PID
    pub track_id: u32,
    /// Rollover-corrected, 90kHz
    pub pts: Option<i64>,
    /// 90kHz
    pub dts: Option<i64>,
    /// `data_alignment_indicator` of the PES header
    pub data_alignment: bool,
    /// PES payload
    pub data: Bytes,
}

/// Output of the elementary stream stage
#[derive(Debug, Clone, PartialEq)]
pub enum ElementaryEvent {
    /// Tracks announced by the current program map
    Tracks(Vec<Track>),
    /// ES info descriptors of the first timed metadata PID in the program map
    MetadataDescriptor(Bytes),
    /// A complete PES payload
    Packet(ElementaryPacket),
}
