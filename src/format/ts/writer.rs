//! Minimal transport stream packetizer.
//!
//! Produces the PAT, PMT and PES packets the demuxer consumes. It is used to
//! build test streams and synthetic inputs; it does not schedule PCR or
//! interleave streams.

use super::types::*;
use crate::utils::Crc32Mpeg2;
use bytes::{BufMut, BytesMut};

/// Four byte transport packet header
#[derive(Debug, Clone, Copy)]
pub struct TsHeader {
    /// Elementary PID
    pub pid: u16,
    /// `payload_unit_start_indicator`
    pub payload_unit_start: bool,
    /// An adaptation field follows the header
    pub adaptation_field: bool,
    /// A payload follows
    pub payload: bool,
    /// Low four bits are written
    pub continuity_counter: u8,
}

impl TsHeader {
    /// A payload-only header with counter 0
    pub fn new(pid: u16) -> Self {
        Self {
            pid,
            payload_unit_start: false,
            adaptation_field: false,
            payload: true,
            continuity_counter: 0,
        }
    }

    /// Sets `payload_unit_start`
    pub fn payload_unit_start(mut self, value: bool) -> Self {
        self.payload_unit_start = value;
        self
    }

    /// Sets the adaptation field control bits
    pub fn adaptation(mut self, adaptation_field: bool, payload: bool) -> Self {
        self.adaptation_field = adaptation_field;
        self.payload = payload;
        self
    }

    /// Sets the continuity counter, modulo 16
    pub fn continuity_counter(mut self, counter: u8) -> Self {
        self.continuity_counter = counter & 0x0f;
        self
    }

    /// Writes the four header bytes
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(SYNC_BYTE);

        let mut b1 = ((self.pid >> 8) & 0x1f) as u8;
        if self.payload_unit_start {
            b1 |= 0x40;
        }
        buf.put_u8(b1);
        buf.put_u8((self.pid & 0xff) as u8);

        let mut b3 = self.continuity_counter & 0x0f;
        if self.adaptation_field {
            b3 |= 0x20;
        }
        if self.payload {
            b3 |= 0x10;
        }
        buf.put_u8(b3);
    }

    /// The four header bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(TS_HEADER_SIZE);
        self.write_to(&mut buf);
        buf.to_vec()
    }
}

fn finish_section(mut section: BytesMut) -> Vec<u8> {
    let crc = Crc32Mpeg2::new().calculate(&section);
    section.put_u32(crc);
    section.to_vec()
}

/// PAT section announcing a single program
pub fn pat_section(pmt_pid: u16) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(TABLE_ID_PAT);
    buf.put_u16(0xb000 | 13);
    buf.put_u16(1); // transport_stream_id
    buf.put_u8(0xc1); // version 0, current_next 1
    buf.put_u8(0);
    buf.put_u8(0);
    buf.put_u16(1); // program_number
    buf.put_u16(pmt_pid & 0x1fff | 7 << 13);
    finish_section(buf)
}

/// PMT section listing `(stream_type, pid, es_descriptors)` entries
pub fn pmt_section(streams: &[(u8, u16, Vec<u8>)]) -> Vec<u8> {
    let entries_len: usize = streams.iter().map(|(_, _, d)| 5 + d.len()).sum();
    let pcr_pid = streams.first().map(|(_, pid, _)| *pid).unwrap_or(0x1fff);

    let mut buf = BytesMut::new();
    buf.put_u8(TABLE_ID_PMT);
    buf.put_u16(0xb000 | (13 + entries_len as u16) & 0x3ff);
    buf.put_u16(1); // program_number
    buf.put_u8(0xc1);
    buf.put_u8(0);
    buf.put_u8(0);
    buf.put_u16(pcr_pid & 0x1fff | 7 << 13);
    buf.put_u16(0xf000); // program_info_length

    for (stream_type, pid, descriptors) in streams {
        buf.put_u8(*stream_type);
        buf.put_u16(pid & 0x1fff | 7 << 13);
        buf.put_u16((descriptors.len() as u16) & 0x3ff | 0xf << 12);
        buf.put_slice(descriptors);
    }
    finish_section(buf)
}

/// Wraps one PSI section in a single packet with a zero pointer field
pub fn psi_packet(pid: u16, section: &[u8], continuity_counter: u8) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
    TsHeader::new(pid)
        .payload_unit_start(true)
        .continuity_counter(continuity_counter)
        .write_to(&mut buf);
    buf.put_u8(0);
    buf.put_slice(section);
    buf.resize(TS_PACKET_SIZE, 0xff);
    buf.to_vec()
}

/// PAT packet on PID 0
pub fn pat_packet(pmt_pid: u16, continuity_counter: u8) -> Vec<u8> {
    psi_packet(PID_PAT, &pat_section(pmt_pid), continuity_counter)
}

/// PMT packet for `(stream_type, pid)` entries without descriptors
pub fn pmt_packet(pmt_pid: u16, streams: &[(u8, u16)], continuity_counter: u8) -> Vec<u8> {
    let streams: Vec<(u8, u16, Vec<u8>)> = streams.iter().map(|&(t, p)| (t, p, Vec::new())).collect();
    psi_packet(pmt_pid, &pmt_section(&streams), continuity_counter)
}

/// Fixed part of a PES header with optional timestamps.
#[derive(Debug, Clone)]
pub struct PesHeader {
    /// PES stream id
    pub stream_id: u8,
    /// `data_alignment_indicator`
    pub data_alignment: bool,
    /// 90kHz
    pub pts: Option<u64>,
    /// 90kHz, dropped without `pts`
    pub dts: Option<u64>,
}

impl PesHeader {
    /// A header with `data_alignment` set and no timestamps
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            data_alignment: true,
            pts: None,
            dts: None,
        }
    }

    /// Sets the pts
    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// DTS is only written alongside a PTS
    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = Some(dts);
        self
    }

    fn header_data_length(&self) -> usize {
        match (self.pts, self.dts) {
            (Some(_), Some(_)) => 10,
            (Some(_), None) => 5,
            _ => 0,
        }
    }

    /// Writes the header for a payload of `payload_len` bytes
    pub fn write_to(&self, buf: &mut BytesMut, payload_len: usize) {
        buf.put_slice(&[0x00, 0x00, 0x01]);
        buf.put_u8(self.stream_id);

        let packet_length = 3 + self.header_data_length() + payload_len;
        buf.put_u16(u16::try_from(packet_length).unwrap_or(0));

        buf.put_u8(if self.data_alignment { 0x84 } else { 0x80 });
        let flags = match (self.pts, self.dts) {
            (Some(_), Some(_)) => 0xc0,
            (Some(_), None) => 0x80,
            _ => 0x00,
        };
        buf.put_u8(flags);
        buf.put_u8(self.header_data_length() as u8);

        if let Some(pts) = self.pts {
            let marker = if self.dts.is_some() { 0x30 } else { 0x20 };
            write_timestamp(buf, marker, pts);
            if let Some(dts) = self.dts {
                write_timestamp(buf, 0x10, dts);
            }
        }
    }
}

fn write_timestamp(buf: &mut BytesMut, marker: u8, ts: u64) {
    let ts = ts & 0x1_ffff_ffff;
    buf.put_u8(marker | ((ts >> 29) & 0x0e) as u8 | 0x01);
    buf.put_u16((((ts >> 14) & 0xfffe) | 0x01) as u16);
    buf.put_u16((((ts << 1) & 0xfffe) | 0x01) as u16);
}

/// Splits a PES packet across transport packets.
///
/// The last packet is padded with adaptation field stuffing so every packet
/// is exactly 188 bytes.
pub fn packetize(pid: u16, pes: &[u8], first_continuity_counter: u8) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();
    let mut offset = 0;
    let mut counter = first_continuity_counter;
    let capacity = TS_PACKET_SIZE - TS_HEADER_SIZE;

    while offset < pes.len() || packets.is_empty() {
        let remaining = pes.len() - offset;
        let stuffing = capacity.saturating_sub(remaining);
        let take = remaining.min(capacity);

        let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
        TsHeader::new(pid)
            .payload_unit_start(offset == 0)
            .adaptation(stuffing > 0, true)
            .continuity_counter(counter)
            .write_to(&mut buf);

        if stuffing > 0 {
            buf.put_u8((stuffing - 1) as u8);
            if stuffing > 1 {
                buf.put_u8(0x00);
                buf.put_bytes(0xff, stuffing - 2);
            }
        }
        buf.put_slice(&pes[offset..offset + take]);

        packets.push(buf.to_vec());
        offset += take;
        counter = (counter + 1) & 0x0f;
    }
    packets
}

/// Builds a PES packet and returns its transport packets
pub fn pes_packets(
    pid: u16,
    stream_id: u8,
    pts: Option<u64>,
    dts: Option<u64>,
    payload: &[u8],
    continuity_counter: u8,
) -> Vec<Vec<u8>> {
    let mut header = PesHeader::new(stream_id);
    header.pts = pts;
    header.dts = dts.filter(|_| pts.is_some());

    let mut pes = BytesMut::new();
    header.write_to(&mut pes, payload.len());
    pes.put_slice(payload);
    packetize(pid, &pes, continuity_counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::parser::{parse_adaptation_field, parse_pid, transport_packets};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sections_carry_valid_crc() {
        let crc = Crc32Mpeg2::new();
        assert!(crc.verify(&pat_section(0x1000)));
        assert!(crc.verify(&pmt_section(&[(STREAM_TYPE_H264, 256, Vec::new())])));
    }

    #[test]
    fn test_packetize_pads_every_packet() {
        let payload: Vec<u8> = (0..500u32).map(|i| i as u8).collect();
        let packets = pes_packets(0x100, STREAM_ID_H264, Some(90_000), None, &payload, 3);

        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|p| p.len() == TS_PACKET_SIZE));
        assert_eq!(packets[0][3] & 0x0f, 3);
        assert_eq!(packets[2][3] & 0x0f, 5);
        assert_eq!(parse_adaptation_field(&packets[0]), 0);
        assert!(parse_adaptation_field(&packets[2]) > 0);

        let joined: Vec<u8> = packets.concat();
        let split = transport_packets(&joined);
        assert_eq!(split.len(), 3);
        assert!(split.iter().all(|p| parse_pid(p) == 0x100));
    }

    #[test]
    fn test_single_byte_stuffing() {
        // 14 header bytes + 169 payload bytes leave exactly one byte to stuff
        let packets = pes_packets(0x100, STREAM_ID_AAC, Some(0), None, &[0xaa; 169], 0);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0][4], 0);
        assert_eq!(packets[0][5], 0x00);
    }
}
