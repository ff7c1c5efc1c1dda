use super::parser::{parse_adaptation_field, parse_payload_unit_start_indicator, parse_pid, parse_pmt_entries};
use super::pes::PesPacket;
use super::types::*;
use crate::av::{CodecType, Stage, Track, TrackType};
use crate::utils::Crc32Mpeg2;
use bytes::Bytes;

/// Routes transport packets by PID.
///
/// Learns the PMT PID from the PAT, the program map from the PMT and
/// classifies PES packets with it. PES packets that arrive before any PMT
/// are held back and replayed once one is parsed.
pub struct TransportParseStream {
    pmt_pid: Option<u16>,
    program_map_table: Option<ProgramMapTable>,
    packets_waiting_for_pmt: Vec<(u16, bool, Bytes)>,
    crc: Crc32Mpeg2,
}

impl TransportParseStream {
    /// A parser waiting for a PAT
    pub fn new() -> Self {
        Self {
            pmt_pid: None,
            program_map_table: None,
            packets_waiting_for_pmt: Vec::new(),
            crc: Crc32Mpeg2::new(),
        }
    }

    /// PMT PID announced by the last PAT
    pub fn pmt_pid(&self) -> Option<u16> {
        self.pmt_pid
    }

    /// The last PMT parsed
    pub fn program_map_table(&self) -> Option<&ProgramMapTable> {
        self.program_map_table.as_ref()
    }

    fn section(payload: &Bytes, payload_unit_start: bool) -> Bytes {
        let mut offset = 0;
        if payload_unit_start {
            offset += usize::from(payload.first().copied().unwrap_or(0)) + 1;
        }
        payload.slice(offset.min(payload.len())..)
    }

    fn check_crc(&self, section: &[u8], table: &str) {
        if section.len() < 3 {
            return;
        }
        let length = 3 + ((usize::from(section[1] & 0x0f) << 8) | usize::from(section[2]));
        if length <= section.len() && !self.crc.verify(&section[..length]) {
            log::warn!("{} section failed CRC check", table);
        }
    }

    fn parse_pat(&mut self, section: &[u8]) -> Option<u16> {
        if section.len() < 12 {
            log::warn!("truncated PAT section");
            return None;
        }
        self.check_crc(section, "PAT");
        let pmt_pid = (u16::from(section[10] & 0x1f) << 8) | u16::from(section[11]);
        if self.pmt_pid != Some(pmt_pid) {
            log::debug!("PMT on PID {:#x}", pmt_pid);
        }
        self.pmt_pid = Some(pmt_pid);
        Some(pmt_pid)
    }

    fn parse_pmt(&mut self, section: &[u8]) -> Option<ProgramMapTable> {
        let entries = parse_pmt_entries(section)?;
        self.check_crc(section, "PMT");

        let mut table = ProgramMapTable::default();
        for entry in &entries {
            let pid = entry.pid;
            match entry.stream_type {
                STREAM_TYPE_H264 if table.video.is_none() => table.video = Some(pid),
                STREAM_TYPE_AAC if table.audio.is_none() => table.audio = Some(pid),
                STREAM_TYPE_METADATA => {
                    table.timed_metadata.insert(pid, entry.stream_type);
                    table
                        .metadata_descriptors
                        .insert(pid, Bytes::copy_from_slice(entry.descriptors));
                }
                _ => {}
            }
            table.streams.insert(pid, entry.stream_type);
        }

        if self.program_map_table.as_ref() != Some(&table) {
            log::debug!(
                "program map: video {:?}, audio {:?}, metadata {:?}",
                table.video,
                table.audio,
                table.timed_metadata.keys().collect::<Vec<_>>()
            );
        }
        self.program_map_table = Some(table.clone());
        Some(table)
    }

    fn process_pes(&self, pid: u16, payload_unit_start: bool, data: Bytes, out: &mut Vec<TsPacket>) {
        let Some(table) = &self.program_map_table else {
            return;
        };
        let stream_type = if table.video == Some(pid) {
            STREAM_TYPE_H264
        } else if table.audio == Some(pid) {
            STREAM_TYPE_AAC
        } else if let Some(&stream_type) = table.timed_metadata.get(&pid) {
            stream_type
        } else {
            log::trace!("dropping packet for unmapped PID {:#x}", pid);
            return;
        };
        out.push(TsPacket::Pes {
            pid,
            stream_type,
            payload_unit_start,
            data,
        });
    }
}

impl Default for TransportParseStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for TransportParseStream {
    type Input = Bytes;
    type Output = TsPacket;

    fn push(&mut self, packet: Bytes, out: &mut Vec<TsPacket>) {
        if packet.len() < TS_HEADER_SIZE {
            return;
        }
        let payload_unit_start = parse_payload_unit_start_indicator(&packet);
        let pid = parse_pid(&packet);
        let offset = (TS_HEADER_SIZE + parse_adaptation_field(&packet)).min(packet.len());
        let payload = packet.slice(offset..);

        if pid == PID_PAT {
            let section = Self::section(&payload, payload_unit_start);
            if let Some(pmt_pid) = self.parse_pat(&section) {
                out.push(TsPacket::Pat { pmt_pid });
            }
        } else if Some(pid) == self.pmt_pid {
            let section = Self::section(&payload, payload_unit_start);
            match self.parse_pmt(&section) {
                Some(table) => {
                    out.push(TsPacket::Pmt(table));
                    for (pid, pusi, data) in std::mem::take(&mut self.packets_waiting_for_pmt) {
                        self.process_pes(pid, pusi, data, out);
                    }
                }
                None => log::debug!("ignoring PMT that is not yet in force"),
            }
        } else if self.program_map_table.is_none() {
            self.packets_waiting_for_pmt.push((pid, payload_unit_start, payload));
        } else {
            self.process_pes(pid, payload_unit_start, payload, out);
        }
    }

    fn reset(&mut self) {
        self.pmt_pid = None;
        self.program_map_table = None;
        self.packets_waiting_for_pmt.clear();
    }
}

#[derive(Default)]
struct PesBuffer {
    pid: u16,
    fragments: Vec<Bytes>,
    size: usize,
}

impl PesBuffer {
    fn clear(&mut self) {
        self.fragments.clear();
        self.size = 0;
    }

    fn assemble(&self) -> Bytes {
        if self.fragments.len() == 1 {
            return self.fragments[0].clone();
        }
        let mut data = Vec::with_capacity(self.size);
        for fragment in &self.fragments {
            data.extend_from_slice(fragment);
        }
        Bytes::from(data)
    }
}

/// Reassembles PES packets per track and announces the program's tracks.
#[derive(Default)]
pub struct ElementaryStream {
    video: PesBuffer,
    audio: PesBuffer,
    timed_metadata: PesBuffer,
    program_map_table: Option<ProgramMapTable>,
    segment_had_pmt: bool,
}

impl ElementaryStream {
    /// A stream with empty buffers and no program map
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&mut self, track_type: TrackType) -> &mut PesBuffer {
        match track_type {
            TrackType::Video => &mut self.video,
            TrackType::Audio => &mut self.audio,
            TrackType::TimedMetadata => &mut self.timed_metadata,
        }
    }

    fn tracks(table: &ProgramMapTable) -> Vec<Track> {
        let mut tracks = Vec::new();
        if let Some(pid) = table.video {
            tracks.push(Track::new(u32::from(pid), TrackType::Video, CodecType::H264));
        }
        if let Some(pid) = table.audio {
            tracks.push(Track::new(u32::from(pid), TrackType::Audio, CodecType::AAC));
        }
        tracks
    }

    /// Emits the buffered PES of one track if it is complete.
    ///
    /// Video PES are always considered complete since their length field is
    /// usually zero. A forced flush drops an incomplete buffer.
    fn flush_buffer(&mut self, track_type: TrackType, force: bool, out: &mut Vec<ElementaryEvent>) {
        let buffer = self.buffer(track_type);
        if buffer.fragments.is_empty() || buffer.size < 9 {
            return;
        }

        let data = buffer.assemble();
        let size = buffer.size;
        let track_id = u32::from(buffer.pid);
        let parsed = PesPacket::parse(&data);
        let flushable = match &parsed {
            Some(_) if track_type == TrackType::Video => true,
            Some(pes) => pes.is_complete(size),
            None => {
                // continuation of a PES begun in an earlier segment
                log::debug!("dropping {} bytes without a PES start code", size);
                true
            }
        };

        if force || flushable {
            buffer.clear();
        }

        if let (true, Some(pes)) = (flushable, parsed) {
            let mut payload = pes.payload;
            if !pes.unbounded && pes.packet_length < size {
                payload.truncate(payload.len().saturating_sub(size - pes.packet_length));
            }
            out.push(ElementaryEvent::Packet(ElementaryPacket {
                track_type,
                track_id,
                pts: pes.pts.map(|v| v as i64),
                dts: pes.dts.map(|v| v as i64),
                data_alignment: pes.data_alignment,
                data: payload,
            }));
        }
    }
}

impl Stage for ElementaryStream {
    type Input = TsPacket;
    type Output = ElementaryEvent;

    fn push(&mut self, packet: TsPacket, out: &mut Vec<ElementaryEvent>) {
        match packet {
            // nothing useful until the PMT arrives
            TsPacket::Pat { .. } => {}
            TsPacket::Pmt(table) => {
                out.push(ElementaryEvent::Tracks(Self::tracks(&table)));
                if let Some(descriptor) = table.metadata_descriptors.values().next() {
                    out.push(ElementaryEvent::MetadataDescriptor(descriptor.clone()));
                }
                self.program_map_table = Some(table);
                self.segment_had_pmt = true;
            }
            TsPacket::Pes {
                pid,
                stream_type,
                payload_unit_start,
                data,
            } => {
                let track_type = match stream_type {
                    STREAM_TYPE_H264 => TrackType::Video,
                    STREAM_TYPE_AAC => TrackType::Audio,
                    STREAM_TYPE_METADATA => TrackType::TimedMetadata,
                    _ => return,
                };

                if payload_unit_start {
                    self.flush_buffer(track_type, true, out);
                }

                let buffer = self.buffer(track_type);
                buffer.pid = pid;
                buffer.size += data.len();
                buffer.fragments.push(data);

                // bounded PES can go out as soon as the declared length is in
                if track_type != TrackType::Video && buffer.size >= 9 {
                    let head = &buffer.fragments[0];
                    let declared = head.len() >= 6 && (head[4] != 0 || head[5] != 0);
                    if declared {
                        self.flush_buffer(track_type, false, out);
                    }
                }
            }
        }
    }

    fn flush(&mut self, out: &mut Vec<ElementaryEvent>) {
        if !self.segment_had_pmt {
            if let Some(table) = &self.program_map_table {
                out.push(ElementaryEvent::Tracks(Self::tracks(table)));
            }
        }
        self.segment_had_pmt = false;

        // video first, then audio
        self.flush_buffer(TrackType::Video, false, out);
        self.flush_buffer(TrackType::Audio, false, out);
        self.flush_buffer(TrackType::TimedMetadata, false, out);
    }

    fn reset(&mut self) {
        self.video.clear();
        self.audio.clear();
        self.timed_metadata.clear();
        self.program_map_table = None;
        self.segment_had_pmt = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::writer::{pat_packet, pes_packets, pmt_packet, pmt_section, psi_packet};
    use pretty_assertions::assert_eq;

    fn parse_all(stream: &mut TransportParseStream, packets: &[Vec<u8>]) -> Vec<TsPacket> {
        let mut out = Vec::new();
        for packet in packets {
            stream.push(Bytes::copy_from_slice(packet), &mut out);
        }
        out
    }

    fn packets_of(events: &[ElementaryEvent]) -> Vec<&ElementaryPacket> {
        events
            .iter()
            .filter_map(|e| match e {
                ElementaryEvent::Packet(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_stream_program_map() {
        let mut stream = TransportParseStream::new();
        let out = parse_all(
            &mut stream,
            &[
                pat_packet(0x1000, 0),
                pmt_packet(0x1000, &[(STREAM_TYPE_H264, 256), (STREAM_TYPE_AAC, 257), (STREAM_TYPE_METADATA, 258)], 0),
            ],
        );

        assert_eq!(out[0], TsPacket::Pat { pmt_pid: 0x1000 });
        let TsPacket::Pmt(table) = &out[1] else {
            panic!("expected a PMT, got {:?}", out[1]);
        };
        assert_eq!(table.video, Some(256));
        assert_eq!(table.audio, Some(257));
        assert_eq!(table.timed_metadata.get(&258), Some(&STREAM_TYPE_METADATA));
        assert_eq!(table.stream_type(257), Some(STREAM_TYPE_AAC));
        assert_eq!(table.track_type(258), Some(TrackType::TimedMetadata));
    }

    #[test]
    fn test_metadata_descriptor_announced() {
        let section = pmt_section(&[
            (STREAM_TYPE_H264, 256, Vec::new()),
            (STREAM_TYPE_METADATA, 258, vec![0x26, 0x02, 0x49, 0x44]),
        ]);
        let mut stream = TransportParseStream::new();
        let parsed = parse_all(&mut stream, &[pat_packet(0x1000, 0), psi_packet(0x1000, &section, 0)]);
        let table = stream.program_map_table().unwrap();
        assert_eq!(&table.metadata_descriptors[&258][..], &[0x26, 0x02, 0x49, 0x44]);
        assert_eq!(table.stream_type(256), Some(STREAM_TYPE_H264));

        let mut elementary = ElementaryStream::new();
        let mut out = Vec::new();
        for packet in parsed {
            elementary.push(packet, &mut out);
        }
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[1],
            ElementaryEvent::MetadataDescriptor(Bytes::from_static(&[0x26, 0x02, 0x49, 0x44]))
        );
    }

    #[test]
    fn test_parse_stream_second_video_pid_ignored() {
        let mut stream = TransportParseStream::new();
        parse_all(
            &mut stream,
            &[
                pat_packet(0x1000, 0),
                pmt_packet(0x1000, &[(STREAM_TYPE_H264, 256), (STREAM_TYPE_H264, 300)], 0),
            ],
        );
        let table = stream.program_map_table().unwrap();
        assert_eq!(table.video, Some(256));
        assert_eq!(table.streams.len(), 2);

        let out = parse_all(&mut stream, &pes_packets(300, STREAM_ID_H264, Some(0), None, &[0; 8], 0));
        assert!(out.is_empty());
    }

    #[test]
    fn test_parse_stream_holds_pes_until_pmt() {
        let mut stream = TransportParseStream::new();
        let mut packets = vec![pat_packet(0x1000, 0)];
        packets.extend(pes_packets(256, STREAM_ID_H264, Some(0), None, &[1; 8], 0));
        packets.push(pmt_packet(0x1000, &[(STREAM_TYPE_H264, 256)], 0));

        let out = parse_all(&mut stream, &packets);
        assert_eq!(out.len(), 3);
        assert!(matches!(out[1], TsPacket::Pmt(_)));
        assert!(matches!(
            out[2],
            TsPacket::Pes { pid: 256, stream_type: STREAM_TYPE_H264, payload_unit_start: true, .. }
        ));
    }

    #[test]
    fn test_parse_stream_keeps_table_on_future_pmt() {
        let mut stream = TransportParseStream::new();
        let mut future = pmt_packet(0x1000, &[(STREAM_TYPE_AAC, 400)], 0);
        future[10] &= !0x01;
        let out = parse_all(
            &mut stream,
            &[pat_packet(0x1000, 0), pmt_packet(0x1000, &[(STREAM_TYPE_H264, 256)], 0), future],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(stream.program_map_table().unwrap().video, Some(256));
        assert_eq!(stream.program_map_table().unwrap().audio, None);

        stream.reset();
        assert!(stream.program_map_table().is_none());
        assert!(stream.pmt_pid().is_none());
    }

    fn pes_event(pid: u16, stream_type: u8, packets: Vec<Vec<u8>>) -> Vec<TsPacket> {
        packets
            .into_iter()
            .map(|p| {
                let pusi = parse_payload_unit_start_indicator(&p);
                let offset = TS_HEADER_SIZE + parse_adaptation_field(&p);
                TsPacket::Pes {
                    pid,
                    stream_type,
                    payload_unit_start: pusi,
                    data: Bytes::copy_from_slice(&p[offset..]),
                }
            })
            .collect()
    }

    fn table() -> ProgramMapTable {
        let mut table = ProgramMapTable {
            video: Some(256),
            audio: Some(257),
            ..Default::default()
        };
        table.streams.insert(256, STREAM_TYPE_H264);
        table.streams.insert(257, STREAM_TYPE_AAC);
        table
    }

    #[test]
    fn test_elementary_stream_tracks() {
        let mut stream = ElementaryStream::new();
        let mut out = Vec::new();
        stream.push(TsPacket::Pmt(table()), &mut out);

        let ElementaryEvent::Tracks(tracks) = &out[0] else {
            panic!("expected tracks");
        };
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, 256);
        assert_eq!(tracks[0].codec.as_str(), "avc");
        assert_eq!(tracks[1].id, 257);
        assert_eq!(tracks[1].codec.as_str(), "adts");

        // a segment without its own PMT re-announces the tracks on flush
        stream.flush(&mut out);
        let mut next = Vec::new();
        stream.flush(&mut next);
        assert_eq!(next.len(), 1);
        assert!(matches!(next[0], ElementaryEvent::Tracks(_)));
    }

    #[test]
    fn test_elementary_stream_reassembles_video_across_packets() {
        let payload: Vec<u8> = (0..400u32).map(|i| (i % 251) as u8).collect();
        let mut stream = ElementaryStream::new();
        let mut out = Vec::new();
        stream.push(TsPacket::Pmt(table()), &mut out);
        for event in pes_event(256, STREAM_TYPE_H264, pes_packets(256, STREAM_ID_H264, Some(9_000), Some(6_000), &payload, 0)) {
            stream.push(event, &mut out);
        }
        // video waits for the next payload unit start or a flush
        assert!(packets_of(&out).is_empty());

        stream.flush(&mut out);
        let packets = packets_of(&out);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].track_type, TrackType::Video);
        assert_eq!(packets[0].track_id, 256);
        assert_eq!(packets[0].pts, Some(9_000));
        assert_eq!(packets[0].dts, Some(6_000));
        assert!(packets[0].data_alignment);
        assert_eq!(&packets[0].data[..], &payload[..]);
    }

    #[test]
    fn test_elementary_stream_audio_emitted_when_complete() {
        let mut stream = ElementaryStream::new();
        let mut out = Vec::new();
        stream.push(TsPacket::Pmt(table()), &mut out);
        for event in pes_event(257, STREAM_TYPE_AAC, pes_packets(257, STREAM_ID_AAC, Some(0), None, &[0xaa; 300], 0)) {
            stream.push(event, &mut out);
        }
        let packets = packets_of(&out);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data.len(), 300);
    }

    #[test]
    fn test_elementary_stream_drops_incomplete_audio_on_new_unit() {
        let mut stream = ElementaryStream::new();
        let mut out = Vec::new();
        stream.push(TsPacket::Pmt(table()), &mut out);

        let mut first = pes_event(257, STREAM_TYPE_AAC, pes_packets(257, STREAM_ID_AAC, Some(0), None, &[0xaa; 300], 0));
        first.truncate(1);
        for event in first {
            stream.push(event, &mut out);
        }
        // flush does not emit an incomplete audio PES
        stream.flush(&mut out);
        assert!(packets_of(&out).is_empty());

        for event in pes_event(257, STREAM_TYPE_AAC, pes_packets(257, STREAM_ID_AAC, Some(1920), None, &[0xbb; 20], 1)) {
            stream.push(event, &mut out);
        }
        let packets = packets_of(&out);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].pts, Some(1920));
        assert_eq!(&packets[0].data[..], &[0xbb; 20]);
    }

    #[test]
    fn test_elementary_stream_ignores_data_without_start_code() {
        let mut stream = ElementaryStream::new();
        let mut out = Vec::new();
        stream.push(
            TsPacket::Pes {
                pid: 256,
                stream_type: STREAM_TYPE_H264,
                payload_unit_start: false,
                data: Bytes::from_static(&[0x41, 0x9a, 0x00, 0x00, 0x00, 0x01, 0x09, 0xf0, 0x00, 0x00]),
            },
            &mut out,
        );
        stream.flush(&mut out);
        assert!(out.is_empty());
    }
}
