use super::nal::NalByteStream;
use super::parser::{discard_emulation_prevention_bytes, read_sequence_parameter_set};
use super::types::{NalUnit, NalUnitType};
use crate::av::{Stage, TrackType};
use crate::format::ts::ElementaryPacket;
use bytes::Bytes;

/// Turns video PES payloads into classified NAL units.
///
/// Units are tagged with the timestamps of the PES whose bytes completed
/// them. SEI units carry their unescaped RBSP for caption extraction and SPS
/// units their parsed picture description.
#[derive(Debug, Default)]
pub struct H264Stream {
    nal_byte_stream: NalByteStream,
    track_id: u32,
    current_pts: Option<i64>,
    current_dts: Option<i64>,
    pending: Vec<Bytes>,
}

impl H264Stream {
    /// A stream that has seen no SPS yet
    pub fn new() -> Self {
        Self::default()
    }

    fn classify(&self, data: Bytes) -> NalUnit {
        let nal_unit_type = NalUnitType::from(data[0] & 0x1f);
        let mut unit = NalUnit {
            nal_unit_type,
            data,
            escaped_rbsp: None,
            config: None,
            pts: self.current_pts,
            dts: self.current_dts,
            track_id: self.track_id,
        };

        match nal_unit_type {
            NalUnitType::SEI => {
                unit.escaped_rbsp = Some(discard_emulation_prevention_bytes(&unit.data[1..]));
            }
            NalUnitType::SPS => {
                let rbsp = discard_emulation_prevention_bytes(&unit.data[1..]);
                match read_sequence_parameter_set(&rbsp) {
                    Ok(config) => {
                        log::debug!(
                            "SPS: profile {} level {} {}x{}",
                            config.profile_idc,
                            config.level_idc,
                            config.width,
                            config.height
                        );
                        unit.config = Some(config);
                    }
                    Err(e) => log::warn!("unreadable SPS: {}", e),
                }
                unit.escaped_rbsp = Some(rbsp);
            }
            _ => {}
        }
        unit
    }

    fn drain(&mut self, out: &mut Vec<NalUnit>) {
        for data in std::mem::take(&mut self.pending) {
            if !data.is_empty() {
                out.push(self.classify(data));
            }
        }
    }
}

impl Stage for H264Stream {
    type Input = ElementaryPacket;
    type Output = NalUnit;

    fn push(&mut self, packet: ElementaryPacket, out: &mut Vec<NalUnit>) {
        if packet.track_type != TrackType::Video {
            return;
        }
        self.track_id = packet.track_id;
        self.current_pts = packet.pts;
        self.current_dts = packet.dts;

        self.nal_byte_stream.push(packet.data, &mut self.pending);
        self.drain(out);
    }

    fn flush(&mut self, out: &mut Vec<NalUnit>) {
        self.nal_byte_stream.flush(&mut self.pending);
        self.drain(out);
    }

    fn reset(&mut self) {
        self.nal_byte_stream.reset();
        self.pending.clear();
    }
}
