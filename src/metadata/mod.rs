//! # ID3 timed metadata
//!
//! Reassembles ID3v2 tags carried in metadata PES packets (or between ADTS
//! frames in raw AAC) and splits them into frames. `TXXX`, `WXXX` and `PRIV`
//! frames are decoded; other frames keep only their key and raw body.
//!
//! The `PRIV` frame owned by `com.apple.streaming.transportStreamTimestamp`
//! carries a 33-bit timestamp that stamps tags (and raw AAC) which arrive
//! without one.

use crate::av::{Stage, TrackType};
use crate::format::ts::{ElementaryPacket, STREAM_TYPE_METADATA};
use bytes::{Bytes, BytesMut};

/// Owner of the PRIV frame carrying an MPEG-2 timestamp
pub const TRANSPORT_STREAM_TIMESTAMP_OWNER: &str = "com.apple.streaming.transportStreamTimestamp";

/// ID3 header length, which the declared tag size excludes
const ID3_HEADER_SIZE: usize = 10;

/// Decodes a 28-bit syncsafe integer from four bytes.
pub fn parse_syncsafe_integer(data: &[u8]) -> usize {
    data.iter()
        .take(4)
        .fold(0usize, |acc, &b| (acc << 7) | usize::from(b & 0x7f))
}

/// Whether `data[offset..]` begins with an `ID3` signature
pub fn is_id3_header(data: &[u8], offset: usize) -> bool {
    data.len() >= offset + 3 && &data[offset..offset + 3] == b"ID3"
}

/// 33-bit timestamp carried in the private data of a transport timestamp frame
pub fn parse_transport_stream_timestamp(d: &[u8]) -> Option<i64> {
    if d.len() < 8 {
        return None;
    }
    let mut ts = (u64::from(d[3] & 0x01) << 30)
        | (u64::from(d[4]) << 22)
        | (u64::from(d[5]) << 14)
        | (u64::from(d[6]) << 6)
        | (u64::from(d[7]) >> 2);
    ts *= 4;
    ts += u64::from(d[7] & 0x03);
    Some(ts as i64)
}

fn parse_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn parse_iso_8859_1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// One frame of an ID3 tag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Id3Frame {
    /// Four character frame id
    pub key: String,
    /// Frame body as carried in the tag
    pub data: Bytes,
    /// `TXXX`/`WXXX` description
    pub description: Option<String>,
    /// `TXXX` value with trailing NULs removed
    pub value: Option<String>,
    /// `WXXX` url
    pub url: Option<String>,
    /// `PRIV` owner identifier
    pub owner: Option<String>,
    /// `PRIV` payload after the owner
    pub private_data: Option<Bytes>,
    /// Decoded transport stream timestamp, for the timestamp `PRIV` frame
    pub timestamp: Option<i64>,
}

impl Id3Frame {
    fn parse(key: String, data: Bytes) -> Self {
        let mut frame = Id3Frame {
            key,
            data,
            ..Default::default()
        };
        match frame.key.as_str() {
            "TXXX" => frame.parse_txxx(),
            "WXXX" => frame.parse_wxxx(),
            "PRIV" => frame.parse_priv(),
            _ => {}
        }
        frame
    }

    /// Splits a UTF-8 `description\0rest` body; other encodings are skipped
    fn split_described(&self) -> Option<(String, &[u8])> {
        if self.data.first() != Some(&3) {
            return None;
        }
        let end = self.data[1..].iter().position(|&b| b == 0)? + 1;
        Some((parse_utf8(&self.data[1..end]), &self.data[end + 1..]))
    }

    fn parse_txxx(&mut self) {
        if let Some((description, rest)) = self.split_described() {
            let value = parse_utf8(rest).trim_end_matches('\0').to_string();
            self.description = Some(description);
            self.value = Some(value);
        }
    }

    fn parse_wxxx(&mut self) {
        if let Some((description, rest)) = self.split_described() {
            let url = parse_utf8(rest);
            self.description = Some(description);
            self.url = Some(url);
        }
    }

    fn parse_priv(&mut self) {
        let end = self.data.iter().position(|&b| b == 0).unwrap_or(self.data.len());
        self.owner = Some(parse_iso_8859_1(&self.data[..end]));
        let private_data = self.data.slice((end + 1).min(self.data.len())..);

        if self.owner.as_deref() == Some(TRANSPORT_STREAM_TIMESTAMP_OWNER) {
            self.timestamp = parse_transport_stream_timestamp(&private_data);
        }
        self.private_data = Some(private_data);
    }
}

/// A complete ID3 tag with its frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Id3Tag {
    /// 90kHz, from the PES or the transport timestamp frame
    pub pts: Option<i64>,
    /// 90kHz
    pub dts: Option<i64>,
    /// The whole tag including its header
    pub data: Bytes,
    /// Frames in tag order
    pub frames: Vec<Id3Frame>,
    /// Presentation time in seconds, filled in when the tag is emitted
    pub cue_time: Option<f64>,
}

impl Id3Tag {
    /// Timestamp announced by a transport timestamp frame, if any
    pub fn transport_stream_timestamp(&self) -> Option<i64> {
        self.frames.iter().find_map(|f| f.timestamp)
    }

    fn parse(data: Bytes, pts: Option<i64>, dts: Option<i64>) -> Self {
        let mut tag = Id3Tag {
            pts,
            dts,
            data: data.clone(),
            frames: Vec::new(),
            cue_time: None,
        };

        let mut tag_size = data.len();
        let mut frame_start = ID3_HEADER_SIZE;
        if data[5] & 0x40 != 0 && data.len() >= 20 {
            // extended header, then clip the padding it declares
            frame_start += 4 + parse_syncsafe_integer(&data[10..14]);
            tag_size = tag_size.saturating_sub(parse_syncsafe_integer(&data[16..20]));
        }

        while frame_start < tag_size && frame_start + 10 <= data.len() {
            let frame_size = parse_syncsafe_integer(&data[frame_start + 4..frame_start + 8]);
            if frame_size < 1 {
                log::warn!("Malformed ID3 frame encountered. Skipping remaining metadata parsing.");
                break;
            }

            let key = parse_iso_8859_1(&data[frame_start..frame_start + 4]);
            let body_start = frame_start + 10;
            let body_end = (body_start + frame_size).min(data.len());
            let frame = Id3Frame::parse(key, data.slice(body_start..body_end));

            if let Some(ts) = frame.timestamp {
                if tag.pts.is_none() && tag.dts.is_none() {
                    tag.pts = Some(ts);
                    tag.dts = Some(ts);
                }
            }
            tag.frames.push(frame);
            frame_start = body_start + frame_size;
        }
        tag
    }
}

/// Reassembles ID3 tags from timed metadata packets.
pub struct MetadataStream {
    dispatch_type: String,
    buffer: Vec<ElementaryPacket>,
    buffer_size: usize,
    tag_size: usize,
}

impl MetadataStream {
    /// Creates a stream whose dispatch type includes the PMT `descriptor` bytes
    pub fn new(descriptor: Option<&[u8]>) -> Self {
        let mut stream = Self {
            dispatch_type: String::new(),
            buffer: Vec::new(),
            buffer_size: 0,
            tag_size: 0,
        };
        stream.set_descriptor(descriptor.unwrap_or_default());
        stream
    }

    /// Rebuilds the dispatch type from the PMT descriptor of the metadata PID
    pub fn set_descriptor(&mut self, descriptor: &[u8]) {
        let mut dispatch_type = format!("{:x}", STREAM_TYPE_METADATA);
        for b in descriptor {
            dispatch_type.push_str(&format!("{:02x}", b));
        }
        self.dispatch_type = dispatch_type;
    }

    /// In-band metadata track dispatch type
    pub fn dispatch_type(&self) -> &str {
        &self.dispatch_type
    }

    fn discard(&mut self) {
        self.buffer.clear();
        self.buffer_size = 0;
        self.tag_size = 0;
    }
}

impl Default for MetadataStream {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Stage for MetadataStream {
    type Input = ElementaryPacket;
    type Output = Id3Tag;

    fn push(&mut self, chunk: ElementaryPacket, out: &mut Vec<Id3Tag>) {
        if chunk.track_type != TrackType::TimedMetadata {
            return;
        }

        // an aligned chunk or a fresh header starts a new tag
        let starts_tag = chunk.data.len() >= ID3_HEADER_SIZE && is_id3_header(&chunk.data, 0);
        if chunk.data_alignment || (starts_tag && !self.buffer.is_empty()) {
            if !self.buffer.is_empty() {
                log::warn!(
                    "dropping incomplete ID3 tag ({} of {} bytes)",
                    self.buffer_size,
                    self.tag_size
                );
            }
            self.discard();
        }

        if self.buffer.is_empty() && !starts_tag {
            log::warn!("Skipping unrecognized metadata packet");
            return;
        }

        if self.buffer.is_empty() {
            self.tag_size = parse_syncsafe_integer(&chunk.data[6..10]) + ID3_HEADER_SIZE;
        }
        self.buffer_size += chunk.data.len();
        self.buffer.push(chunk);

        if self.buffer_size < self.tag_size {
            return;
        }

        let mut data = BytesMut::with_capacity(self.tag_size);
        for part in &self.buffer {
            let take = (self.tag_size - data.len()).min(part.data.len());
            data.extend_from_slice(&part.data[..take]);
        }
        let (pts, dts) = (self.buffer[0].pts, self.buffer[0].dts);
        self.discard();

        out.push(Id3Tag::parse(data.freeze(), pts, dts));
    }

    /// Drops a tag still waiting for bytes; it cannot complete in the next segment
    fn flush(&mut self, _out: &mut Vec<Id3Tag>) {
        if !self.buffer.is_empty() {
            log::warn!(
                "discarding incomplete ID3 tag at flush ({} of {} bytes)",
                self.buffer_size,
                self.tag_size
            );
        }
        self.discard();
    }

    fn reset(&mut self) {
        self.discard();
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    pub fn syncsafe(n: usize) -> [u8; 4] {
        [
            ((n >> 21) & 0x7f) as u8,
            ((n >> 14) & 0x7f) as u8,
            ((n >> 7) & 0x7f) as u8,
            (n & 0x7f) as u8,
        ]
    }

    pub fn id3_frame(key: &str, body: &[u8]) -> Vec<u8> {
        let mut frame = key.as_bytes().to_vec();
        frame.extend_from_slice(&syncsafe(body.len()));
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(body);
        frame
    }

    pub fn id3_tag(frames: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = frames.concat();
        let mut tag = b"ID3".to_vec();
        tag.extend_from_slice(&[3, 0, 0]);
        tag.extend_from_slice(&syncsafe(body.len()));
        tag.extend_from_slice(&body);
        tag
    }

    /// PRIV body announcing `ts` as the transport stream timestamp
    pub fn timestamp_priv(ts: u64) -> Vec<u8> {
        let mut body = super::TRANSPORT_STREAM_TIMESTAMP_OWNER.as_bytes().to_vec();
        body.push(0);
        body.extend_from_slice(&[0, 0, 0]);
        body.push(((ts >> 32) & 0x01) as u8);
        body.extend_from_slice(&((ts & 0xffff_ffff) as u32).to_be_bytes());
        body
    }
}
