//! # Closed captions
//!
//! CEA-608 captions travel inside H.264 SEI messages as ATSC A/53 `GA94`
//! user data. [`CaptionStream`] pulls the `cc_data` byte pairs out of SEI
//! units, orders them by pts and hands them to one [`Cea608Stream`] per
//! caption channel.
//!
//! ```rust
//! use vdkmux::caption::{parse_caption_packets, parse_sei, parse_user_data};
//!
//! // sei_message: type 4, 14 byte payload, then the rbsp stop bit
//! let sei = [
//!     0x04, 0x0e, 181, 0x00, 0x31, b'G', b'A', b'9', b'4', 0x03, 0x41, 0xff, 0xfc, 0x94, 0x20,
//!     0xff, 0x80,
//! ];
//! let payload = parse_sei(&sei).unwrap();
//! let user_data = parse_user_data(payload).unwrap();
//! let packets = parse_caption_packets(1000, user_data);
//! assert_eq!(packets[0].cc_data, 0x9420);
//! ```

mod cea608;

pub use cea608::Cea608Stream;

use crate::av::Stage;
use crate::codec::h264::{NalUnit, NalUnitType};

/// SEI payload type of `user_data_registered_itu_t_t35`
pub const USER_DATA_REGISTERED_ITU_T_T35: u32 = 4;

const RBSP_TRAILING_BITS: u8 = 0x80;

/// One `cc_data` pair with the pts of the picture that carried it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionPacket {
    /// 90kHz
    pub pts: i64,
    /// `cc_type`: 0 and 1 are the CEA-608 fields, 2 and 3 carry CEA-708
    pub field: u8,
    /// The two data bytes, first byte high
    pub cc_data: u16,
}

/// A decoded caption cue.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    /// 90kHz, as carried in the input
    pub start_pts: i64,
    /// 90kHz, when the cue was cleared or replaced
    pub end_pts: i64,
    /// Displayed rows joined with `\n`
    pub text: String,
    /// Channel name, `CC1` to `CC4`
    pub stream: String,
    /// Seconds on the output timeline, filled in when the cue is emitted
    pub start_time: Option<f64>,
    /// Seconds on the output timeline, filled in when the cue is emitted
    pub end_time: Option<f64>,
}

/// Payload of the first `GA94` user data message in an SEI RBSP.
pub fn parse_sei(bytes: &[u8]) -> Option<&[u8]> {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == RBSP_TRAILING_BITS {
            break;
        }

        let mut payload_type = 0u32;
        while bytes.get(i) == Some(&0xff) {
            payload_type += 255;
            i += 1;
        }
        payload_type += u32::from(*bytes.get(i)?);
        i += 1;

        let mut payload_size = 0usize;
        while bytes.get(i) == Some(&0xff) {
            payload_size += 255;
            i += 1;
        }
        payload_size += usize::from(*bytes.get(i)?);
        i += 1;

        // only one caption message per picture
        if payload_type == USER_DATA_REGISTERED_ITU_T_T35 && bytes.get(i + 3..i + 7) == Some(b"GA94") {
            return bytes.get(i..i + payload_size);
        }

        i += payload_size;
    }
    None
}

/// `user_data_type_structure` of an ATSC caption payload, marker byte removed.
///
/// Requires country code 181, provider 49, user identifier `GA94` and user
/// data type code 3.
pub fn parse_user_data(payload: &[u8]) -> Option<&[u8]> {
    if payload.len() < 9 || payload[0] != 181 {
        return None;
    }
    if u16::from_be_bytes([payload[1], payload[2]]) != 49 {
        return None;
    }
    if &payload[3..7] != b"GA94" || payload[7] != 0x03 {
        return None;
    }
    Some(&payload[8..payload.len() - 1])
}

/// Valid `cc_data` pairs of one caption user data structure
pub fn parse_caption_packets(pts: i64, user_data: &[u8]) -> Vec<CaptionPacket> {
    let mut results = Vec::new();
    // process_cc_data_flag
    if user_data.first().map_or(true, |b| b & 0x40 == 0) {
        return results;
    }

    let count = usize::from(user_data[0] & 0x1f);
    for i in 0..count {
        let offset = i * 3;
        let Some(triple) = user_data.get(offset + 2..offset + 5) else {
            break;
        };
        if triple[0] & 0x04 != 0 {
            results.push(CaptionPacket {
                pts,
                field: triple[0] & 0x03,
                cc_data: u16::from_be_bytes([triple[1], triple[2]]),
            });
        }
    }
    results
}

/// Extracts CEA-608 captions from SEI NAL units.
///
/// Packets are buffered until a flush, then sorted by pts (keeping arrival
/// order for equal pts) and dispatched. SEI units with a dts older than the
/// newest one seen are treated as a re-downloaded segment and skipped.
pub struct CaptionStream {
    caption_packets: Vec<CaptionPacket>,
    cc_streams: [Cea608Stream; 4],
    latest_dts: Option<i64>,
    ignore_next_equal_dts: bool,
    num_same_dts: u32,
    active_cea608_channel: [Option<usize>; 2],
}

impl Default for CaptionStream {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptionStream {
    /// A stream with four fresh 608 decoders
    pub fn new() -> Self {
        Self {
            caption_packets: Vec::new(),
            cc_streams: [
                Cea608Stream::new(0, 0),
                Cea608Stream::new(0, 1),
                Cea608Stream::new(1, 0),
                Cea608Stream::new(1, 1),
            ],
            latest_dts: None,
            ignore_next_equal_dts: false,
            num_same_dts: 0,
            active_cea608_channel: [None, None],
        }
    }

    fn flush_stream(&mut self, out: &mut Vec<Caption>) {
        // stable, equal pts keep their arrival order
        self.caption_packets.sort_by_key(|packet| packet.pts);
        for packet in std::mem::take(&mut self.caption_packets) {
            if packet.field < 2 {
                self.dispatch_cea608_packet(&packet, out);
            } else {
                log::trace!("skipping CEA-708 packet {:#06x}", packet.cc_data);
            }
        }
    }

    /// XDS and Text mode data is discarded until a caption control code
    /// selects a data channel again.
    fn dispatch_cea608_packet(&mut self, packet: &CaptionPacket, out: &mut Vec<Caption>) {
        let field = usize::from(packet.field);
        let data = packet.cc_data;

        if sets_text_or_xds_active(data) {
            self.active_cea608_channel[field] = None;
        } else if data & 0x7800 == 0x1000 {
            self.active_cea608_channel[field] = Some(0);
        } else if data & 0x7800 == 0x1800 {
            self.active_cea608_channel[field] = Some(1);
        }

        if let Some(channel) = self.active_cea608_channel[field] {
            self.cc_streams[(field << 1) + channel].push(packet, out);
        }
    }
}

fn sets_text_or_xds_active(data: u16) -> bool {
    data & 0x7100 == 0x0100 || data & 0x78fe == 0x102a || data & 0x78fe == 0x182a
}

impl Stage for CaptionStream {
    type Input = NalUnit;
    type Output = Caption;

    fn push(&mut self, nal: NalUnit, _out: &mut Vec<Caption>) {
        if nal.nal_unit_type != NalUnitType::SEI {
            return;
        }
        let Some(rbsp) = nal.escaped_rbsp.as_deref() else {
            return;
        };
        let Some(user_data) = parse_sei(rbsp).and_then(parse_user_data) else {
            return;
        };

        // a segment downloaded twice replays dts values already seen
        let dts = nal.dts.unwrap_or_default();
        if let Some(latest) = self.latest_dts {
            if dts < latest {
                self.ignore_next_equal_dts = true;
                return;
            }
            if dts == latest && self.ignore_next_equal_dts {
                self.num_same_dts = self.num_same_dts.saturating_sub(1);
                if self.num_same_dts == 0 {
                    self.ignore_next_equal_dts = false;
                }
                return;
            }
        }

        let packets = parse_caption_packets(nal.pts.unwrap_or_default(), user_data);
        self.caption_packets.extend(packets);
        if self.latest_dts != Some(dts) {
            self.num_same_dts = 0;
        }
        self.num_same_dts += 1;
        self.latest_dts = Some(dts);
    }

    /// Decodes the buffered packets. Cues still on screen stay open.
    fn flush(&mut self, out: &mut Vec<Caption>) {
        self.flush_stream(out);
    }

    fn partial_flush(&mut self, out: &mut Vec<Caption>) {
        self.flush_stream(out);
    }

    fn reset(&mut self) {
        self.caption_packets.clear();
        self.latest_dts = None;
        self.ignore_next_equal_dts = false;
        self.num_same_dts = 0;
        self.active_cea608_channel = [None, None];
        for stream in &mut self.cc_streams {
            stream.reset();
        }
    }
}
