use super::types::{ElementaryEvent, ElementaryPacket};
use crate::av::{Stage, TrackType};
use crate::utils::clock::handle_rollover;

/// Unwraps 33-bit timestamp rollover on elementary packets.
///
/// The first DTS seen becomes the reference; every later timestamp is moved
/// to whichever value congruent modulo 2^33 lies closest to it. A stream
/// built with a track filter leaves packets of other tracks untouched.
pub struct TimestampRolloverStream {
    track_type: Option<TrackType>,
    reference_dts: Option<i64>,
    last_dts: Option<i64>,
}

impl TimestampRolloverStream {
    /// Corrects only packets of `track_type`, or all of them for `None`
    pub fn new(track_type: Option<TrackType>) -> Self {
        Self {
            track_type,
            reference_dts: None,
            last_dts: None,
        }
    }

    /// Forgets the reference point across a timeline jump
    pub fn discontinuity(&mut self) {
        self.reference_dts = None;
        self.last_dts = None;
    }

    /// Dts that later timestamps are unwrapped against
    pub fn reference_dts(&self) -> Option<i64> {
        self.reference_dts
    }

    fn correct(&mut self, packet: &mut ElementaryPacket) {
        if let Some(filter) = self.track_type {
            if packet.track_type != filter {
                return;
            }
        }
        let Some(dts) = packet.dts else {
            return;
        };

        let reference = *self.reference_dts.get_or_insert(dts);
        let dts = handle_rollover(dts, reference);
        packet.dts = Some(dts);
        packet.pts = packet.pts.map(|pts| handle_rollover(pts, reference));
        self.last_dts = Some(dts);
    }
}

impl Stage for TimestampRolloverStream {
    type Input = ElementaryEvent;
    type Output = ElementaryEvent;

    fn push(&mut self, mut event: ElementaryEvent, out: &mut Vec<ElementaryEvent>) {
        if let ElementaryEvent::Packet(packet) = &mut event {
            self.correct(packet);
        }
        out.push(event);
    }

    fn flush(&mut self, _out: &mut Vec<ElementaryEvent>) {
        // the next segment is judged against where this one ended
        self.reference_dts = self.last_dts;
    }

    fn end_timeline(&mut self, _out: &mut Vec<ElementaryEvent>) {
        self.discontinuity();
    }

    fn reset(&mut self) {
        self.discontinuity();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::MAX_TS;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn packet(track_type: TrackType, pts: i64, dts: i64) -> ElementaryEvent {
        ElementaryEvent::Packet(ElementaryPacket {
            track_type,
            track_id: 256,
            pts: Some(pts),
            dts: Some(dts),
            data_alignment: true,
            data: Bytes::new(),
        })
    }

    fn times(events: &[ElementaryEvent]) -> Vec<(i64, i64)> {
        events
            .iter()
            .filter_map(|e| match e {
                ElementaryEvent::Packet(p) => Some((p.pts.unwrap(), p.dts.unwrap())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_forward_rollover() {
        let mut stream = TimestampRolloverStream::new(None);
        let mut out = Vec::new();
        stream.push(packet(TrackType::Video, MAX_TS - 3000, MAX_TS - 3000), &mut out);
        stream.push(packet(TrackType::Video, 3000, 0), &mut out);
        assert_eq!(times(&out), vec![(MAX_TS - 3000, MAX_TS - 3000), (MAX_TS + 3000, MAX_TS)]);
    }

    #[test]
    fn test_backward_rollover() {
        let mut stream = TimestampRolloverStream::new(None);
        let mut out = Vec::new();
        stream.push(packet(TrackType::Audio, 100, 100), &mut out);
        stream.push(packet(TrackType::Audio, MAX_TS - 100, MAX_TS - 100), &mut out);
        assert_eq!(times(&out)[1], (-100, -100));
    }

    #[test]
    fn test_flush_moves_reference_to_last_dts() {
        let mut stream = TimestampRolloverStream::new(None);
        let mut out = Vec::new();
        stream.push(packet(TrackType::Video, 0, 0), &mut out);
        stream.push(packet(TrackType::Video, 1 << 32, 1 << 32), &mut out);
        stream.flush(&mut out);
        assert_eq!(stream.reference_dts(), Some(1 << 32));

        // would unwrap backwards against the old reference of zero
        out.clear();
        stream.push(packet(TrackType::Video, (1 << 32) + 10, (1 << 32) + 10), &mut out);
        assert_eq!(times(&out), vec![((1 << 32) + 10, (1 << 32) + 10)]);

        stream.discontinuity();
        assert_eq!(stream.reference_dts(), None);
    }

    #[test]
    fn test_filter_leaves_other_tracks() {
        let mut stream = TimestampRolloverStream::new(Some(TrackType::Audio));
        let mut out = Vec::new();
        stream.push(packet(TrackType::Video, MAX_TS - 10, MAX_TS - 10), &mut out);
        assert_eq!(stream.reference_dts(), None);
        stream.push(packet(TrackType::Audio, 10, 10), &mut out);
        assert_eq!(stream.reference_dts(), Some(10));
        assert_eq!(times(&out), vec![(MAX_TS - 10, MAX_TS - 10), (10, 10)]);
    }
}
