//! Stateless transport packet inspection and the packet sync stage.

use super::types::*;
use crate::av::{Stage, TrackType};
use crate::codec::h264::{NalByteStream, NalUnitType};
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;

/// 13-bit PID from bytes 1-2 of a packet, or the null PID when the slice is
/// too short to carry one
pub fn parse_pid(packet: &[u8]) -> u16 {
    match packet.get(1..3) {
        Some(&[hi, lo]) => (u16::from(hi & 0x1f) << 8) | u16::from(lo),
        _ => PID_NULL,
    }
}

/// Whether a PES or PSI section starts in this packet
pub fn parse_payload_unit_start_indicator(packet: &[u8]) -> bool {
    packet.get(1).is_some_and(|b| b & 0x40 != 0)
}

/// Number of bytes the adaptation field occupies after the 4-byte header,
/// including its length byte.
pub fn parse_adaptation_field(packet: &[u8]) -> usize {
    match (packet.get(3), packet.get(4)) {
        (Some(control), Some(&length)) if ((control & 0x30) >> 4) > 0x01 => usize::from(length) + 1,
        _ => 0,
    }
}

/// Classifies a packet against the known PMT PID.
///
/// Nothing but the PAT can be classified before a PMT PID is known.
pub fn parse_type(packet: &[u8], pmt_pid: Option<u16>) -> PacketType {
    let pid = parse_pid(packet);
    if pid == PID_PAT {
        PacketType::Pat
    } else if Some(pid) == pmt_pid {
        PacketType::Pmt
    } else if pmt_pid.is_some() {
        PacketType::Pes
    } else {
        PacketType::Unknown
    }
}

/// Offset of the PSI section, past the header, adaptation field and pointer field
fn psi_offset(packet: &[u8]) -> usize {
    let mut offset = TS_HEADER_SIZE + parse_adaptation_field(packet);
    if parse_payload_unit_start_indicator(packet) {
        offset += usize::from(packet.get(offset).copied().unwrap_or(0)) + 1;
    }
    offset
}

/// PMT PID named by the first program of a PAT packet
pub fn parse_pat(packet: &[u8]) -> Option<u16> {
    let offset = psi_offset(packet);
    let hi = *packet.get(offset + 10)?;
    let lo = *packet.get(offset + 11)?;
    Some((u16::from(hi & 0x1f) << 8) | u16::from(lo))
}

/// PID to stream type mapping of a PMT packet.
///
/// Returns `None` for sections that are not yet in force
/// (`current_next_indicator` clear) or that are cut short.
pub fn parse_pmt(packet: &[u8]) -> Option<BTreeMap<u16, u8>> {
    let entries = parse_pmt_entries(&packet[psi_offset(packet).min(packet.len())..])?;
    Some(entries.iter().map(|entry| (entry.pid, entry.stream_type)).collect())
}

/// One elementary stream entry of a PMT section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PmtEntry<'a> {
    /// PMT stream type
    pub stream_type: u8,
    /// Elementary PID
    pub pid: u16,
    /// ES info descriptor loop
    pub descriptors: &'a [u8],
}

pub(crate) fn parse_pmt_entries(section: &[u8]) -> Option<Vec<PmtEntry<'_>>> {
    if section.len() < 12 || section[5] & 0x01 == 0 {
        return None;
    }

    let section_length = (usize::from(section[1] & 0x0f) << 8) | usize::from(section[2]);
    let table_end = (3 + section_length).saturating_sub(4).min(section.len());
    let program_info_length = (usize::from(section[10] & 0x0f) << 8) | usize::from(section[11]);

    let mut entries = Vec::new();
    let mut offset = 12 + program_info_length;
    while offset + 5 <= table_end {
        let es_info_length = (usize::from(section[offset + 3] & 0x0f) << 8) | usize::from(section[offset + 4]);
        let descriptors_start = offset + 5;
        let descriptors_end = (descriptors_start + es_info_length).min(table_end);
        entries.push(PmtEntry {
            stream_type: section[offset],
            pid: (u16::from(section[offset + 1] & 0x1f) << 8) | u16::from(section[offset + 2]),
            descriptors: &section[descriptors_start..descriptors_end],
        });
        offset = descriptors_start + es_info_length;
    }
    Some(entries)
}

/// Track kind of a PES packet under a PMT mapping
pub fn parse_pes_type(packet: &[u8], program_map_table: &BTreeMap<u16, u8>) -> Option<TrackType> {
    match program_map_table.get(&parse_pid(packet)).copied()? {
        STREAM_TYPE_H264 => Some(TrackType::Video),
        STREAM_TYPE_AAC => Some(TrackType::Audio),
        STREAM_TYPE_METADATA => Some(TrackType::TimedMetadata),
        _ => None,
    }
}

/// Presentation and decode time carried by a PES header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesTime {
    /// 90kHz
    pub pts: u64,
    /// Equal to `pts` when the header has none
    pub dts: u64,
}

/// Decodes a 33-bit PES timestamp from its 5 byte field.
///
/// The top 31 bits are assembled first and scaled by 4 before the two low
/// bits are added in.
pub fn parse_timestamp(field: &[u8; 5]) -> u64 {
    let high = (u64::from(field[0] & 0x0e) << 27)
        | (u64::from(field[1]) << 20)
        | (u64::from(field[2] & 0xfe) << 12)
        | (u64::from(field[3]) << 5)
        | (u64::from(field[4] & 0xfe) >> 3);
    high * 4 + (u64::from(field[4] & 0x06) >> 1)
}

/// PTS and DTS of a packet that starts a PES.
///
/// `None` when the packet does not start a payload unit, carries only
/// adaptation field stuffing, or has no timestamp flags. DTS defaults to PTS.
pub fn parse_pes_time(packet: &[u8]) -> Option<PesTime> {
    if !parse_payload_unit_start_indicator(packet) {
        return None;
    }
    let offset = TS_HEADER_SIZE + parse_adaptation_field(packet);
    if offset >= packet.len() {
        return None;
    }
    parse_pes_header_time(&packet[offset..])
}

/// Timestamps of a PES header at the start of `pes`
pub fn parse_pes_header_time(pes: &[u8]) -> Option<PesTime> {
    let flags = *pes.get(7)?;
    if flags & 0xc0 == 0 || pes.len() < 14 {
        return None;
    }
    let pts = parse_timestamp(pes[9..14].try_into().ok()?);
    let dts = match pes.get(14..19) {
        Some(field) if flags & 0x40 != 0 => parse_timestamp(field.try_into().ok()?),
        _ => pts,
    };
    Some(PesTime { pts, dts })
}

/// NAL unit type of a header byte
pub fn parse_nal_unit_type(header: u8) -> NalUnitType {
    NalUnitType::from(header & 0x1f)
}

/// Whether the payload of a video packet contains an IDR slice
pub fn video_packet_contains_key_frame(packet: &[u8]) -> bool {
    let offset = TS_HEADER_SIZE + parse_adaptation_field(packet);
    if offset >= packet.len() {
        return false;
    }
    let mut scanner = NalByteStream::new();
    let mut nals = Vec::new();
    scanner.push(Bytes::copy_from_slice(&packet[offset..]), &mut nals);
    scanner.flush(&mut nals);
    nals.iter()
        .any(|nal| !nal.is_empty() && parse_nal_unit_type(nal[0]) == NalUnitType::CodedSliceIDR)
}

/// Splits a complete buffer into transport packets.
///
/// A packet is accepted when it starts with a sync byte and is followed by
/// another sync byte or the end of the buffer; otherwise the scan moves one
/// byte forward until it finds such a pair.
pub fn transport_packets(data: &[u8]) -> Vec<&[u8]> {
    let mut packets = Vec::new();
    let mut start = 0;
    let mut end = TS_PACKET_SIZE;

    while end <= data.len() {
        if data[start] == SYNC_BYTE && (end == data.len() || data[end] == SYNC_BYTE) {
            packets.push(&data[start..end]);
            start += TS_PACKET_SIZE;
            end += TS_PACKET_SIZE;
            continue;
        }
        start += 1;
        end += 1;
    }
    packets
}

/// Cuts an arbitrarily chunked byte stream into 188 byte packets.
///
/// Bytes that cannot yet form a packet are carried over to the next push.
#[derive(Default)]
pub struct TransportPacketStream {
    buffer: BytesMut,
}

impl TransportPacketStream {
    /// An empty packetizer
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for TransportPacketStream {
    type Input = Bytes;
    type Output = Bytes;

    fn push(&mut self, input: Bytes, out: &mut Vec<Bytes>) {
        let everything = if self.buffer.is_empty() {
            input
        } else {
            self.buffer.extend_from_slice(&input);
            self.buffer.split().freeze()
        };

        let mut start = 0;
        let mut end = TS_PACKET_SIZE;
        let mut skipped = 0usize;

        while end < everything.len() {
            if everything[start] == SYNC_BYTE && everything[end] == SYNC_BYTE {
                out.push(everything.slice(start..end));
                start += TS_PACKET_SIZE;
                end += TS_PACKET_SIZE;
                continue;
            }
            start += 1;
            end += 1;
            skipped += 1;
        }

        if skipped > 0 {
            log::warn!("lost transport sync, skipped {} bytes", skipped);
        }

        if start < everything.len() {
            self.buffer.extend_from_slice(&everything[start..]);
        }
    }

    fn flush(&mut self, out: &mut Vec<Bytes>) {
        if self.buffer.len() == TS_PACKET_SIZE && self.buffer[0] == SYNC_BYTE {
            out.push(self.buffer.split().freeze());
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}
