use super::parser::{is_adts_sync, parse_adts_header};
use super::types::{AdtsFrame, ADTS_HEADER_SIZE};
use crate::av::{Stage, TrackType};
use crate::format::ts::ElementaryPacket;
use bytes::{Bytes, BytesMut};

/// Splits audio PES payloads into ADTS frames.
///
/// A frame that runs past the end of the buffered bytes is held until the
/// next push completes it. Frames found in one push are stamped with the
/// push's timestamps advanced by the duration of the frames before them.
#[derive(Debug, Default)]
pub struct AdtsStream {
    buffer: Bytes,
    base_pts: i64,
    base_dts: i64,
    /// Samples emitted since the last timed packet
    elapsed_samples: u64,
}

impl AdtsStream {
    /// An empty stream with no timestamp base yet
    pub fn new() -> Self {
        Self::default()
    }

    fn offset(&self, sample_rate: u32) -> i64 {
        (self.elapsed_samples * 90_000 / u64::from(sample_rate)) as i64
    }
}

impl Stage for AdtsStream {
    type Input = ElementaryPacket;
    type Output = AdtsFrame;

    fn push(&mut self, packet: ElementaryPacket, out: &mut Vec<AdtsFrame>) {
        if packet.track_type != TrackType::Audio {
            return;
        }

        if let Some(pts) = packet.pts {
            self.base_pts = pts;
            self.base_dts = packet.dts.unwrap_or(pts);
            self.elapsed_samples = 0;
        }

        let buffer = if self.buffer.is_empty() {
            packet.data
        } else {
            let mut joined = BytesMut::with_capacity(self.buffer.len() + packet.data.len());
            joined.extend_from_slice(&self.buffer);
            joined.extend_from_slice(&packet.data);
            joined.freeze()
        };

        let mut i = 0;
        let mut skip: Option<usize> = None;

        while i + ADTS_HEADER_SIZE < buffer.len() {
            let header = if is_adts_sync(&buffer, i) {
                parse_adts_header(&buffer[i..]).ok()
            } else {
                None
            };
            let Some(header) = header else {
                skip.get_or_insert(i);
                i += 1;
                continue;
            };
            if let Some(start) = skip.take() {
                log::warn!("adts skipping {} bytes from {} to {} looking for a sync word", i - start, start, i);
            }

            let frame_length = usize::from(header.frame_length);
            if buffer.len() - i < frame_length {
                break;
            }

            let sample_rate = header.sample_rate().unwrap_or(90_000);
            let offset = self.offset(sample_rate);
            out.push(AdtsFrame {
                pts: self.base_pts + offset,
                dts: self.base_dts + offset,
                sample_count: header.sample_count(),
                audio_object_type: header.profile.audio_object_type(),
                channel_count: header.channel_configuration,
                sample_rate,
                sampling_frequency_index: header.sample_rate_index,
                sample_size: 16,
                data: buffer.slice(i + header.header_length()..i + frame_length),
            });

            self.elapsed_samples += u64::from(header.sample_count());
            i += frame_length;
        }

        if let Some(start) = skip {
            log::warn!("adts skipping {} bytes from {} to {} looking for a sync word", i - start, start, i);
        }

        self.buffer = buffer.slice(i.min(buffer.len())..);
    }

    fn reset(&mut self) {
        self.buffer = Bytes::new();
        self.elapsed_samples = 0;
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    /// ADTS frame with `payload` bytes, AAC-LC stereo at the given index
    pub fn adts_frame(sampling_frequency_index: u8, payload: &[u8]) -> Vec<u8> {
        let length = payload.len() + 7;
        let mut frame = vec![
            0xFF,
            0xF1,
            0x40 | (sampling_frequency_index << 2),
            0x80 | ((length >> 11) as u8 & 0x03),
            (length >> 3) as u8,
            ((length as u8 & 0x07) << 5) | 0x1F,
            0xFC,
        ];
        frame.extend_from_slice(payload);
        frame
    }
}
