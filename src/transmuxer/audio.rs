use super::types::{SegmentEvent, SegmentTimingInfo, TimingPoint, TrackSegment};
use crate::av::{AacConfig, CodecConfig, Sample, Stage, TimelineStartInfo, Track};
use crate::codec::aac::{AdtsFrame, SAMPLES_PER_RAW_BLOCK};
use crate::mp4::{mdat, moof};
use crate::utils::clock::audio_ts_to_video_ts;
use bytes::{BufMut, BytesMut};

/// Builds one audio fragment per flush from ADTS frames.
///
/// Frames decoding before the earliest allowed dts are dropped so audio
/// never starts ahead of the video it is paired with.
pub struct AudioSegmentStream {
    track: Track,
    keep_original_timestamps: bool,
    sequence_number: u32,
    frames: Vec<AdtsFrame>,
    earliest_allowed_dts: i64,
}

impl AudioSegmentStream {
    /// Starts numbering fragments at `first_sequence_number`
    pub fn new(track: Track, keep_original_timestamps: bool, first_sequence_number: u32) -> Self {
        Self {
            track,
            keep_original_timestamps,
            sequence_number: first_sequence_number,
            frames: Vec::new(),
            earliest_allowed_dts: 0,
        }
    }

    /// The track as configured by the first frame
    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Mutable access to the track
    pub fn track_mut(&mut self) -> &mut Track {
        &mut self.track
    }

    /// Frames decoding before `dts` are dropped at the next flush
    pub fn set_earliest_dts(&mut self, dts: i64) {
        self.earliest_allowed_dts = dts;
    }

    /// Puts this track on another track's timeline
    pub fn set_timeline_start_info(&mut self, info: TimelineStartInfo) {
        self.track.timeline_start_info = info;
    }

    fn trim_by_earliest_dts(&mut self, frames: Vec<AdtsFrame>) -> Vec<AdtsFrame> {
        let earliest = self.earliest_allowed_dts;
        if self.track.min_segment_dts.map_or(true, |dts| dts >= earliest) {
            return frames;
        }

        let total = frames.len();
        let kept: Vec<AdtsFrame> = frames.into_iter().filter(|f| f.dts >= earliest).collect();
        log::debug!("trimmed {} audio frames before dts {}", total - kept.len(), earliest);

        let min = kept.iter().map(|f| f.dts).min();
        self.track.min_segment_dts = min;
        self.track.min_segment_pts = min;
        kept
    }

    fn emit(&mut self, out: &mut Vec<SegmentEvent>) {
        if self.frames.is_empty() {
            return;
        }
        let buffered = std::mem::take(&mut self.frames);
        let frames = self.trim_by_earliest_dts(buffered);
        let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
            self.track.clear_dts_info();
            return;
        };

        let min_dts = self.track.min_segment_dts.unwrap_or(first.dts);
        self.track.base_media_decode_time = self
            .track
            .base_media_decode_time_for(min_dts, self.keep_original_timestamps);
        self.track.samples = frames
            .iter()
            .map(|f| Sample::new(f.data.len() as u32, SAMPLES_PER_RAW_BLOCK))
            .collect();

        let frame_duration = audio_ts_to_video_ts(i64::from(SAMPLES_PER_RAW_BLOCK), last.sample_rate);
        out.push(SegmentEvent::TimingInfo(SegmentTimingInfo {
            start: TimingPoint {
                pts: first.pts,
                dts: first.dts,
            },
            end: TimingPoint {
                pts: last.pts + frame_duration,
                dts: last.dts + frame_duration,
            },
            base_media_decode_time: self.track.base_media_decode_time,
            prepended_content_duration: 0,
        }));

        let mut data = BytesMut::with_capacity(frames.iter().map(|f| f.data.len()).sum());
        for frame in &frames {
            data.put_slice(&frame.data);
        }
        let mut boxes = BytesMut::new();
        moof(self.sequence_number, std::slice::from_ref(&self.track)).write_to(&mut boxes);
        mdat(&data).write_to(&mut boxes);
        self.sequence_number = self.sequence_number.wrapping_add(1);

        log::debug!(
            "audio segment with {} frames from dts {}, {} bytes",
            frames.len(),
            first.dts,
            boxes.len()
        );
        out.push(SegmentEvent::Data(TrackSegment {
            track: self.track.clone(),
            boxes: boxes.freeze(),
        }));
        self.track.clear_dts_info();
    }
}

impl Stage for AudioSegmentStream {
    type Input = AdtsFrame;
    type Output = SegmentEvent;

    fn push(&mut self, frame: AdtsFrame, _out: &mut Vec<SegmentEvent>) {
        self.track.collect_dts_info(Some(frame.pts), Some(frame.dts));
        self.track.config = Some(CodecConfig::Aac(AacConfig {
            audio_object_type: frame.audio_object_type,
            channel_count: frame.channel_count,
            sample_rate: frame.sample_rate,
            sampling_frequency_index: frame.sampling_frequency_index,
            sample_size: frame.sample_size,
        }));
        self.frames.push(frame);
    }

    fn flush(&mut self, out: &mut Vec<SegmentEvent>) {
        self.emit(out);
    }

    fn partial_flush(&mut self, out: &mut Vec<SegmentEvent>) {
        self.emit(out);
    }

    fn reset(&mut self) {
        self.frames.clear();
        self.earliest_allowed_dts = 0;
        self.track.clear_dts_info();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{CodecType, TrackType};
    use crate::mp4::inspect;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn frame(dts: i64, len: usize) -> AdtsFrame {
        AdtsFrame {
            pts: dts,
            dts,
            sample_count: 1024,
            audio_object_type: 2,
            channel_count: 2,
            sample_rate: 48_000,
            sampling_frequency_index: 3,
            sample_size: 16,
            data: Bytes::from(vec![0x21; len]),
        }
    }

    fn stream() -> AudioSegmentStream {
        AudioSegmentStream::new(Track::new(257, TrackType::Audio, CodecType::AAC), false, 0)
    }

    fn segment(out: &[SegmentEvent]) -> &TrackSegment {
        out.iter()
            .find_map(|e| match e {
                SegmentEvent::Data(segment) => Some(segment),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_fragment_per_flush() {
        let mut stream = stream();
        let mut out = Vec::new();
        stream.push(frame(90_000, 10), &mut out);
        stream.push(frame(91_920, 12), &mut out);
        stream.flush(&mut out);

        let first = segment(&out);
        assert_eq!(first.track.aac().unwrap().sample_rate, 48_000);
        let samples = &inspect::samples(&first.boxes).unwrap()[0];
        assert_eq!(samples.len(), 2);
        assert_eq!((samples[0].duration, samples[1].size), (1024, 12));
        // first dts is the timeline start
        assert_eq!(inspect::base_media_decode_time(&first.boxes), Some(0));

        out.clear();
        stream.push(frame(180_000, 10), &mut out);
        stream.flush(&mut out);
        let boxes = &segment(&out).boxes;
        assert_eq!(inspect::base_media_decode_time(boxes), Some(48_000));
        assert_eq!(inspect::sequence_number(boxes), Some(1));
    }

    #[test]
    fn test_trims_frames_before_earliest_dts() {
        let mut stream = stream();
        let mut out = Vec::new();
        stream.push(frame(88_080, 10), &mut out);
        stream.push(frame(90_000, 10), &mut out);

        // video started at 90000
        stream.set_timeline_start_info(TimelineStartInfo {
            base_media_decode_time: 0,
            pts: Some(90_000),
            dts: Some(90_000),
        });
        stream.set_earliest_dts(90_000);
        stream.flush(&mut out);

        let boxes = &segment(&out).boxes;
        assert_eq!(inspect::samples(boxes).unwrap()[0].len(), 1);
        assert_eq!(inspect::base_media_decode_time(boxes), Some(0));
        assert!(matches!(&out[0], SegmentEvent::TimingInfo(t) if t.start.dts == 90_000 && t.end.dts == 91_920));
    }

    #[test]
    fn test_empty_flush_emits_nothing() {
        let mut stream = stream();
        let mut out = Vec::new();
        stream.flush(&mut out);
        stream.set_earliest_dts(1_000_000);
        stream.push(frame(0, 10), &mut out);
        stream.flush(&mut out);
        assert!(out.is_empty());
    }
}
