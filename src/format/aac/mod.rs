//! # Raw AAC input
//!
//! Splits a raw ADTS byte stream (as found in packed-audio HLS segments) into
//! ID3 tag chunks and whole ADTS frames. Frames carry no timestamps of their
//! own; every unit is stamped with the time announced by the most recent
//! transport timestamp `PRIV` frame.

use crate::av::{Stage, TrackType};
use crate::codec::aac::{parse_adts_size, ADTS_HEADER_SIZE};
use crate::format::ts::ElementaryPacket;
use crate::metadata::{is_id3_header, parse_syncsafe_integer, parse_transport_stream_timestamp, TRANSPORT_STREAM_TIMESTAMP_OWNER};
use bytes::{Bytes, BytesMut};

/// Track id of the single audio track of a raw AAC stream
pub const AAC_TRACK_ID: u32 = 1;

const ID3_HEADER_SIZE: usize = 10;

/// Total size of the ID3 tag at `offset`, header and footer included.
pub fn parse_id3_tag_size(header: &[u8], offset: usize) -> usize {
    let size = parse_syncsafe_integer(&header[offset + 6..offset + 10]);
    let footer_present = header[offset + 5] & 0x10 != 0;
    if footer_present {
        size + 20
    } else {
        size + ID3_HEADER_SIZE
    }
}

/// Offset of the first byte after any ID3 tags starting at `offset`
pub fn get_id3_offset(data: &[u8], mut offset: usize) -> usize {
    while data.len() >= offset + ID3_HEADER_SIZE && is_id3_header(data, offset) {
        offset += parse_id3_tag_size(data, offset);
    }
    offset
}

/// Whether `data` looks like raw ADTS, possibly behind leading ID3 tags.
///
/// The layer bits must be zero, which rules out MP3.
pub fn is_likely_aac_data(data: &[u8]) -> bool {
    let offset = get_id3_offset(data, 0);
    data.len() >= offset + 2
        && data[offset] == 0xFF
        && data[offset + 1] & 0xF0 == 0xF0
        && data[offset + 1] & 0x16 == 0x10
}

/// Transport stream timestamp carried by the ID3 tag at the start of `packet`.
pub fn parse_aac_timestamp(packet: &[u8]) -> Option<i64> {
    if packet.len() < ID3_HEADER_SIZE {
        return None;
    }

    let mut frame_start = ID3_HEADER_SIZE;
    if packet[5] & 0x40 != 0 {
        if packet.len() < 14 {
            return None;
        }
        frame_start += 4 + parse_syncsafe_integer(&packet[10..14]);
    }

    while frame_start + ID3_HEADER_SIZE <= packet.len() {
        let frame_size = parse_syncsafe_integer(&packet[frame_start + 4..frame_start + 8]);
        if frame_size < 1 {
            return None;
        }

        if &packet[frame_start..frame_start + 4] == b"PRIV" {
            let body_start = frame_start + ID3_HEADER_SIZE;
            let body = &packet[body_start..(body_start + frame_size).min(packet.len())];
            if let Some(nul) = body.iter().position(|&b| b == 0) {
                if &body[..nul] == TRANSPORT_STREAM_TIMESTAMP_OWNER.as_bytes() {
                    return parse_transport_stream_timestamp(&body[nul + 1..]);
                }
            }
        }

        frame_start += ID3_HEADER_SIZE + frame_size;
    }
    None
}

/// Splits raw AAC bytes into ID3 and ADTS units.
///
/// A unit cut off at the end of a push is held until the next push completes
/// it.
#[derive(Debug, Default)]
pub struct AacStream {
    buffer: Bytes,
    timestamp: i64,
}

impl AacStream {
    /// A splitter with no buffered bytes
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pts/dts given to subsequent units
    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    /// Pts/dts given to emitted units, 90kHz
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn unit(&self, track_type: TrackType, track_id: u32, data: Bytes) -> ElementaryPacket {
        ElementaryPacket {
            track_type,
            track_id,
            pts: Some(self.timestamp),
            dts: Some(self.timestamp),
            data_alignment: true,
            data,
        }
    }
}

impl Stage for AacStream {
    type Input = Bytes;
    type Output = ElementaryPacket;

    fn push(&mut self, bytes: Bytes, out: &mut Vec<ElementaryPacket>) {
        let everything = if self.buffer.is_empty() {
            bytes
        } else {
            let mut joined = BytesMut::with_capacity(self.buffer.len() + bytes.len());
            joined.extend_from_slice(&self.buffer);
            joined.extend_from_slice(&bytes);
            joined.freeze()
        };

        let mut i = 0;
        while everything.len() - i >= 3 {
            if is_id3_header(&everything, i) {
                if everything.len() - i < ID3_HEADER_SIZE {
                    break;
                }
                let frame_size = parse_id3_tag_size(&everything, i);
                if i + frame_size > everything.len() {
                    break;
                }

                let tag = everything.slice(i..i + frame_size);
                if let Some(timestamp) = parse_aac_timestamp(&tag) {
                    log::debug!("raw aac timestamp set to {}", timestamp);
                    self.timestamp = timestamp;
                }
                out.push(self.unit(TrackType::TimedMetadata, 0, tag));
                i += frame_size;
                continue;
            }

            if everything[i] == 0xFF && everything[i + 1] & 0xF0 == 0xF0 {
                if everything.len() - i < ADTS_HEADER_SIZE {
                    break;
                }
                let frame_size = parse_adts_size(&everything, i);
                if frame_size < ADTS_HEADER_SIZE {
                    i += 1;
                    continue;
                }
                if i + frame_size > everything.len() {
                    break;
                }

                out.push(self.unit(TrackType::Audio, AAC_TRACK_ID, everything.slice(i..i + frame_size)));
                i += frame_size;
                continue;
            }

            i += 1;
        }

        self.buffer = everything.slice(i..);
    }

    fn reset(&mut self) {
        self.buffer = Bytes::new();
        self.timestamp = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::aac::stream::test_utils::adts_frame;
    use crate::metadata::test_utils::{id3_frame, id3_tag, timestamp_priv};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_is_likely_aac_data() {
        let frame = adts_frame(3, &[0; 4]);
        assert!(is_likely_aac_data(&frame));

        let mut tagged = id3_tag(&[id3_frame("TXXX", b"\x03a\0b")]);
        tagged.extend_from_slice(&frame);
        assert!(is_likely_aac_data(&tagged));

        // mp3 layer bits set
        assert!(!is_likely_aac_data(&[0xFF, 0xFB, 0x90, 0x00]));
        // transport stream
        assert!(!is_likely_aac_data(&[0x47, 0x40, 0x00, 0x10]));
        assert!(!is_likely_aac_data(&[]));
    }

    #[test]
    fn test_parse_id3_tag_size() {
        let mut header = vec![b'I', b'D', b'3', 3, 0, 0, 0, 0, 0x02, 0x01];
        assert_eq!(parse_id3_tag_size(&header, 0), 267);
        header[5] = 0x10;
        assert_eq!(parse_id3_tag_size(&header, 0), 277);
    }

    #[test]
    fn test_parse_aac_timestamp() {
        let tag = id3_tag(&[
            id3_frame("TXXX", b"\x03a\0b"),
            id3_frame("PRIV", &timestamp_priv(900_000)),
        ]);
        assert_eq!(parse_aac_timestamp(&tag), Some(900_000));
        assert_eq!(parse_aac_timestamp(&id3_tag(&[id3_frame("PRIV", b"other\0data")])), None);
    }

    #[test]
    fn test_splits_tags_and_frames() {
        let tag = id3_tag(&[id3_frame("PRIV", &timestamp_priv(90_000))]);
        let frame = adts_frame(3, &[1; 16]);
        let mut stream_bytes = tag.clone();
        stream_bytes.extend_from_slice(&frame);
        stream_bytes.extend_from_slice(&frame);

        let mut stream = AacStream::new();
        let mut out = Vec::new();
        stream.push(Bytes::from(stream_bytes), &mut out);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].track_type, TrackType::TimedMetadata);
        assert_eq!(out[0].data.len(), tag.len());
        assert_eq!(out[0].pts, Some(90_000));
        assert_eq!(out[1].track_type, TrackType::Audio);
        assert_eq!(out[1].track_id, AAC_TRACK_ID);
        assert_eq!(out[1].data.len(), frame.len());
        assert_eq!(out[2].dts, Some(90_000));
    }

    #[test]
    fn test_partial_units_deferred() {
        let frame = adts_frame(4, &[2; 40]);
        let mut stream = AacStream::new();
        let mut out = Vec::new();

        stream.push(Bytes::copy_from_slice(&frame[..5]), &mut out);
        assert!(out.is_empty());
        stream.push(Bytes::copy_from_slice(&frame[5..30]), &mut out);
        assert!(out.is_empty());
        let mut rest = frame[30..].to_vec();
        rest.extend_from_slice(&frame);
        stream.push(Bytes::from(rest), &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(&out[0].data[..], &frame[..]);
    }

    #[test]
    fn test_garbage_skipped_and_reset() {
        let mut data = vec![0x00, 0x11, 0x22];
        data.extend_from_slice(&adts_frame(3, &[0; 2]));
        let mut stream = AacStream::new();
        stream.set_timestamp(500);
        let mut out = Vec::new();
        stream.push(Bytes::from(data), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pts, Some(500));

        stream.push(Bytes::from_static(&[0xFF, 0xF1, 0x4C]), &mut out);
        stream.reset();
        assert_eq!(stream.timestamp(), 0);
        stream.push(Bytes::copy_from_slice(&adts_frame(3, &[0; 2])), &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].pts, Some(0));
    }
}
