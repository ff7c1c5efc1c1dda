use super::parser::parse_pes_header_time;
use bytes::Bytes;

/// A reassembled PES packet split into header fields and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PesPacket {
    /// Declared total length including the 6 byte prefix; 6 when unbounded
    pub packet_length: usize,
    /// Whether the declared length field was zero
    pub unbounded: bool,
    /// data_alignment_indicator, set when an access unit starts here
    pub data_alignment: bool,
    /// Presentation Time Stamp (33 bits)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits), equal to the PTS when absent
    pub dts: Option<u64>,
    /// Bytes following the header
    pub payload: Bytes,
}

impl PesPacket {
    /// Parses a PES packet from the start of `data`.
    ///
    /// Returns `None` when fewer than 9 bytes are available or the buffer does
    /// not begin with the `00 00 01` start code prefix, as happens when a
    /// segment starts in the middle of a PES continued from the previous one.
    pub fn parse(data: &Bytes) -> Option<PesPacket> {
        if data.len() < 9 || data[0] != 0x00 || data[1] != 0x00 || data[2] != 0x01 {
            return None;
        }

        let length_field = (usize::from(data[4]) << 8) | usize::from(data[5]);
        let time = parse_pes_header_time(data);
        let payload_start = (9 + usize::from(data[8])).min(data.len());

        Some(PesPacket {
            packet_length: 6 + length_field,
            unbounded: length_field == 0,
            data_alignment: data[6] & 0x04 != 0,
            pts: time.map(|t| t.pts),
            dts: time.map(|t| t.dts),
            payload: data.slice(payload_start..),
        })
    }

    /// Whether `size` buffered bytes cover the declared length
    pub fn is_complete(&self, size: usize) -> bool {
        self.packet_length <= size
    }
}
