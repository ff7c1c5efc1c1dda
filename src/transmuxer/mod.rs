//! # Transmuxing to fragmented MP4
//!
//! [`Transmuxer`] wires the demuxing stages to the segment builders. Bytes go
//! in through [`Transmuxer::push`]; every flush turns what was buffered into
//! [`TransmuxerEvent`]s.
//!
//! The input format is sniffed on the first push after construction or a
//! flush. Data that looks like raw ADTS takes the AAC pipeline, anything else
//! is read as an MPEG-2 transport stream:
//!
//! ```text
//! TS:  packets -> PAT/PMT -> PES -> rollover -> H.264 -> captions, video segments
//!                                            -> ADTS  -> audio segments
//!                                            -> ID3   -> metadata
//! AAC: ID3/ADTS units -> rollover -> ADTS -> audio segments
//! ```
//!
//! ## Example
//!
//! ```rust
//! use vdkmux::config::TransmuxerOptions;
//! use vdkmux::transmuxer::{Transmuxer, TransmuxerEvent};
//!
//! let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
//! transmuxer.push(&[0x47; 188]);
//! transmuxer.flush();
//!
//! // no tracks were announced, so the flush is simply done
//! assert_eq!(transmuxer.take_events(), vec![TransmuxerEvent::Done]);
//! ```

mod audio;
mod coalesce;
mod gop;
mod types;
mod video;

pub use audio::AudioSegmentStream;
pub use coalesce::{CoalesceInput, CoalesceStream};
pub use gop::{Frame, Gop};
pub use types::*;
pub use video::{align_gops_at_end, align_gops_at_start, VideoSegmentStream};

use crate::av::{CodecType, Stage, Track, TrackType};
use crate::caption::{Caption, CaptionStream};
use crate::codec::aac::{AdtsFrame, AdtsStream};
use crate::codec::h264::{H264Stream, NalUnit, NalUnitType};
use crate::config::{default_options, TransmuxerOptions};
use crate::format::aac::{is_likely_aac_data, AacStream, AAC_TRACK_ID};
use crate::format::ts::{
    ElementaryEvent,
    ElementaryPacket,
    ElementaryStream,
    TimestampRolloverStream,
    TransportPacketStream,
    TransportParseStream,
    TsPacket,
};
use crate::metadata::MetadataStream;
use bytes::Bytes;

type Listener = Box<dyn FnMut(&TransmuxerEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushMode {
    Full,
    Partial,
    EndTimeline,
}

fn finish_stage<S: Stage>(stage: &mut S, mode: FlushMode, out: &mut Vec<S::Output>) {
    match mode {
        FlushMode::Full => stage.flush(out),
        FlushMode::Partial => stage.partial_flush(out),
        FlushMode::EndTimeline => stage.end_timeline(out),
    }
}

/// The back half shared by both pipelines: segment streams, captions and
/// metadata, and the coalescer joining them.
struct Segmenter {
    options: TransmuxerOptions,
    video: Option<VideoSegmentStream>,
    audio: Option<AudioSegmentStream>,
    captions: CaptionStream,
    metadata: MetadataStream,
    coalesce: CoalesceStream,
    announced_tracks: bool,
}

impl Segmenter {
    fn new(options: &TransmuxerOptions) -> Self {
        let metadata = MetadataStream::default();
        let mut coalesce = CoalesceStream::new(options.remux, options.keep_original_timestamps);
        coalesce.set_dispatch_type(metadata.dispatch_type());
        Self {
            options: options.clone(),
            video: None,
            audio: None,
            captions: CaptionStream::new(),
            metadata,
            coalesce,
            announced_tracks: false,
        }
    }

    fn set_metadata_descriptor(&mut self, descriptor: &[u8]) {
        self.metadata.set_descriptor(descriptor);
        self.coalesce.set_dispatch_type(self.metadata.dispatch_type());
    }

    fn add_tracks(&mut self, tracks: Vec<Track>, gops_to_align_with: &[GopInfo], events: &mut Vec<TransmuxerEvent>) {
        let options = &self.options;
        for mut track in tracks {
            track.timeline_start_info.base_media_decode_time = options.base_media_decode_time;
            match track.track_type {
                TrackType::Video if self.video.is_none() => {
                    log::debug!("video track {} ({})", track.id, track.codec.as_str());
                    let mut stream = VideoSegmentStream::new(
                        track,
                        options.keep_original_timestamps,
                        options.align_gops_at_end,
                        options.first_sequence_number,
                    );
                    stream.align_gops_with(gops_to_align_with.to_vec());
                    self.video = Some(stream);
                }
                TrackType::Audio if self.audio.is_none() => {
                    log::debug!("audio track {} ({})", track.id, track.codec.as_str());
                    self.audio = Some(AudioSegmentStream::new(
                        track,
                        options.keep_original_timestamps,
                        options.first_sequence_number,
                    ));
                }
                _ => {}
            }
        }

        let (has_video, has_audio) = (self.video.is_some(), self.audio.is_some());
        self.coalesce
            .set_number_of_tracks(usize::from(has_video) + usize::from(has_audio));
        if !self.announced_tracks {
            self.announced_tracks = true;
            events.push(TransmuxerEvent::TrackInfo { has_audio, has_video });
        }
    }

    fn push_nal(&mut self, nal: NalUnit, events: &mut Vec<TransmuxerEvent>) {
        if nal.nal_unit_type == NalUnitType::SEI {
            let mut captions = Vec::new();
            self.captions.push(nal.clone(), &mut captions);
            self.forward_captions(captions, events);
        }
        if let Some(video) = self.video.as_mut() {
            let mut out = Vec::new();
            video.push(nal, &mut out);
            forward(&mut self.coalesce, TrackType::Video, out, events);
        }
    }

    fn push_frames(&mut self, packet: ElementaryPacket, adts: &mut AdtsStream, events: &mut Vec<TransmuxerEvent>) {
        if self.audio.is_none() {
            return;
        }
        let mut frames = Vec::new();
        adts.push(packet, &mut frames);
        self.push_adts_frames(frames, events);
    }

    fn push_adts_frames(&mut self, frames: Vec<AdtsFrame>, events: &mut Vec<TransmuxerEvent>) {
        let Some(audio) = self.audio.as_mut() else {
            return;
        };
        let mut out = Vec::new();
        for frame in frames {
            audio.push(frame, &mut out);
        }
        forward(&mut self.coalesce, TrackType::Audio, out, events);
    }

    fn push_metadata(&mut self, packet: ElementaryPacket, events: &mut Vec<TransmuxerEvent>) {
        let mut tags = Vec::new();
        self.metadata.push(packet, &mut tags);
        for tag in tags {
            self.coalesce.push(CoalesceInput::Metadata(tag), events);
        }
    }

    fn forward_captions(&mut self, captions: Vec<Caption>, events: &mut Vec<TransmuxerEvent>) {
        for caption in captions {
            self.coalesce.push(CoalesceInput::Caption(caption), events);
        }
    }

    /// Flushes captions first so they ride on this segment, then video, then
    /// audio on the video timeline.
    fn finish(&mut self, mode: FlushMode, events: &mut Vec<TransmuxerEvent>) {
        let mut captions = Vec::new();
        finish_stage(&mut self.captions, mode, &mut captions);
        self.forward_captions(captions, events);

        let mut tags = Vec::new();
        finish_stage(&mut self.metadata, mode, &mut tags);
        for tag in tags {
            self.coalesce.push(CoalesceInput::Metadata(tag), events);
        }

        if let Some(video) = self.video.as_mut() {
            let mut out = Vec::new();
            finish_stage(video, mode, &mut out);
            forward(&mut self.coalesce, TrackType::Video, out, events);

            let timeline = video.track().timeline_start_info;
            if let (Some(audio), Some(dts)) = (self.audio.as_mut(), timeline.dts) {
                if !self.options.keep_original_timestamps {
                    audio.set_timeline_start_info(timeline);
                    audio.set_earliest_dts(dts - self.options.base_media_decode_time as i64);
                }
            }
            if mode != FlushMode::Partial {
                self.coalesce.push(CoalesceInput::Flushed(TrackType::Video), events);
            }
        }

        if let Some(audio) = self.audio.as_mut() {
            let mut out = Vec::new();
            finish_stage(audio, mode, &mut out);
            forward(&mut self.coalesce, TrackType::Audio, out, events);
            if mode != FlushMode::Partial {
                self.coalesce.push(CoalesceInput::Flushed(TrackType::Audio), events);
            }
        }

        match mode {
            FlushMode::Partial => self.coalesce.partial_flush(events),
            _ if self.coalesce.number_of_tracks() == 0 => self.coalesce.flush(events),
            _ => {}
        }
        if mode == FlushMode::EndTimeline {
            events.push(TransmuxerEvent::EndedTimeline);
        }
        if mode != FlushMode::Partial {
            self.announced_tracks = false;
        }
    }

    fn set_base_media_decode_time(&mut self, base_media_decode_time: u64) {
        self.options.base_media_decode_time = base_media_decode_time;
        if let Some(audio) = self.audio.as_mut() {
            let track = audio.track_mut();
            track.clear_timeline();
            track.timeline_start_info.base_media_decode_time = base_media_decode_time;
        }
        if let Some(video) = self.video.as_mut() {
            video.clear_gop_cache();
            let track = video.track_mut();
            track.clear_timeline();
            track.timeline_start_info.base_media_decode_time = base_media_decode_time;
            self.captions.reset();
        }
    }
}

fn forward(coalesce: &mut CoalesceStream, track_type: TrackType, out: Vec<SegmentEvent>, events: &mut Vec<TransmuxerEvent>) {
    for event in out {
        match event {
            SegmentEvent::Data(segment) => coalesce.push(CoalesceInput::Segment(segment), events),
            SegmentEvent::GopInfo(gops) => events.push(TransmuxerEvent::GopInfo(gops)),
            SegmentEvent::TimingInfo(timing) => {
                events.push(TransmuxerEvent::SegmentTimingInfo { track_type, timing })
            }
        }
    }
}

struct TsPipeline {
    packets: TransportPacketStream,
    parse: TransportParseStream,
    elementary: ElementaryStream,
    rollover: TimestampRolloverStream,
    h264: H264Stream,
    adts: AdtsStream,
    segmenter: Segmenter,
}

impl TsPipeline {
    fn new(options: &TransmuxerOptions) -> Self {
        Self {
            packets: TransportPacketStream::new(),
            parse: TransportParseStream::new(),
            elementary: ElementaryStream::new(),
            rollover: TimestampRolloverStream::new(None),
            h264: H264Stream::new(),
            adts: AdtsStream::new(),
            segmenter: Segmenter::new(options),
        }
    }

    fn push(&mut self, data: Bytes, gops: &[GopInfo], events: &mut Vec<TransmuxerEvent>) {
        let mut packets = Vec::new();
        self.packets.push(data, &mut packets);
        self.route_packets(packets, gops, events);
    }

    fn route_packets(&mut self, packets: Vec<Bytes>, gops: &[GopInfo], events: &mut Vec<TransmuxerEvent>) {
        let mut parsed = Vec::new();
        for packet in packets {
            self.parse.push(packet, &mut parsed);
        }
        self.route_parsed(parsed, gops, events);
    }

    fn route_parsed(&mut self, parsed: Vec<TsPacket>, gops: &[GopInfo], events: &mut Vec<TransmuxerEvent>) {
        let mut elementary = Vec::new();
        for packet in parsed {
            self.elementary.push(packet, &mut elementary);
        }
        self.route_elementary(elementary, gops, events);
    }

    fn route_elementary(&mut self, elementary: Vec<ElementaryEvent>, gops: &[GopInfo], events: &mut Vec<TransmuxerEvent>) {
        let mut corrected = Vec::new();
        for event in elementary {
            self.rollover.push(event, &mut corrected);
        }
        self.route_corrected(corrected, gops, events);
    }

    fn route_corrected(&mut self, corrected: Vec<ElementaryEvent>, gops: &[GopInfo], events: &mut Vec<TransmuxerEvent>) {
        for event in corrected {
            match event {
                ElementaryEvent::Tracks(tracks) => self.segmenter.add_tracks(tracks, gops, events),
                ElementaryEvent::MetadataDescriptor(descriptor) => self.segmenter.set_metadata_descriptor(&descriptor),
                ElementaryEvent::Packet(packet) => match packet.track_type {
                    TrackType::Video => {
                        let mut nals = Vec::new();
                        self.h264.push(packet, &mut nals);
                        self.route_nals(nals, events);
                    }
                    TrackType::Audio => self.segmenter.push_frames(packet, &mut self.adts, events),
                    TrackType::TimedMetadata => self.segmenter.push_metadata(packet, events),
                },
            }
        }
    }

    fn route_nals(&mut self, nals: Vec<NalUnit>, events: &mut Vec<TransmuxerEvent>) {
        for nal in nals {
            self.segmenter.push_nal(nal, events);
        }
    }

    fn finish(&mut self, mode: FlushMode, gops: &[GopInfo], events: &mut Vec<TransmuxerEvent>) {
        let mut packets = Vec::new();
        finish_stage(&mut self.packets, mode, &mut packets);
        self.route_packets(packets, gops, events);

        let mut parsed = Vec::new();
        finish_stage(&mut self.parse, mode, &mut parsed);
        self.route_parsed(parsed, gops, events);

        let mut elementary = Vec::new();
        finish_stage(&mut self.elementary, mode, &mut elementary);
        self.route_elementary(elementary, gops, events);

        let mut corrected = Vec::new();
        finish_stage(&mut self.rollover, mode, &mut corrected);
        self.route_corrected(corrected, gops, events);

        let mut nals = Vec::new();
        finish_stage(&mut self.h264, mode, &mut nals);
        self.route_nals(nals, events);

        let mut frames = Vec::new();
        finish_stage(&mut self.adts, mode, &mut frames);
        self.segmenter.push_adts_frames(frames, events);

        self.segmenter.finish(mode, events);
    }

    fn discontinuity(&mut self) {
        self.rollover.discontinuity();
    }
}

struct AacPipeline {
    aac: AacStream,
    audio_rollover: TimestampRolloverStream,
    metadata_rollover: TimestampRolloverStream,
    adts: AdtsStream,
    segmenter: Segmenter,
}

impl AacPipeline {
    fn new(options: &TransmuxerOptions) -> Self {
        Self {
            aac: AacStream::new(),
            audio_rollover: TimestampRolloverStream::new(Some(TrackType::Audio)),
            metadata_rollover: TimestampRolloverStream::new(Some(TrackType::TimedMetadata)),
            adts: AdtsStream::new(),
            segmenter: Segmenter::new(options),
        }
    }

    fn push(&mut self, data: Bytes, events: &mut Vec<TransmuxerEvent>) {
        let mut units = Vec::new();
        self.aac.push(data, &mut units);
        self.route_units(units, events);
    }

    fn route_units(&mut self, units: Vec<ElementaryPacket>, events: &mut Vec<TransmuxerEvent>) {
        let mut corrected = Vec::new();
        for unit in units {
            let rollover = match unit.track_type {
                TrackType::TimedMetadata => &mut self.metadata_rollover,
                _ => &mut self.audio_rollover,
            };
            rollover.push(ElementaryEvent::Packet(unit), &mut corrected);
        }
        self.route_corrected(corrected, events);
    }

    fn route_corrected(&mut self, corrected: Vec<ElementaryEvent>, events: &mut Vec<TransmuxerEvent>) {
        for event in corrected {
            let ElementaryEvent::Packet(packet) = event else {
                continue;
            };
            match packet.track_type {
                TrackType::Audio => {
                    if self.segmenter.audio.is_none() {
                        let track = Track::new(AAC_TRACK_ID, TrackType::Audio, CodecType::AAC);
                        self.segmenter.add_tracks(vec![track], &[], events);
                    }
                    self.segmenter.push_frames(packet, &mut self.adts, events);
                }
                TrackType::TimedMetadata => self.segmenter.push_metadata(packet, events),
                TrackType::Video => {}
            }
        }
    }

    fn finish(&mut self, mode: FlushMode, events: &mut Vec<TransmuxerEvent>) {
        let mut units = Vec::new();
        finish_stage(&mut self.aac, mode, &mut units);
        self.route_units(units, events);

        let mut corrected = Vec::new();
        finish_stage(&mut self.audio_rollover, mode, &mut corrected);
        finish_stage(&mut self.metadata_rollover, mode, &mut corrected);
        self.route_corrected(corrected, events);

        let mut frames = Vec::new();
        finish_stage(&mut self.adts, mode, &mut frames);
        self.segmenter.push_adts_frames(frames, events);

        self.segmenter.finish(mode, events);
    }

    fn discontinuity(&mut self) {
        self.audio_rollover.discontinuity();
        self.metadata_rollover.discontinuity();
    }
}

enum Pipeline {
    Ts(Box<TsPipeline>),
    Aac(Box<AacPipeline>),
}

impl Pipeline {
    fn ts(options: &TransmuxerOptions) -> Self {
        Pipeline::Ts(Box::new(TsPipeline::new(options)))
    }

    fn aac(options: &TransmuxerOptions) -> Self {
        Pipeline::Aac(Box::new(AacPipeline::new(options)))
    }

    fn segmenter(&mut self) -> &mut Segmenter {
        match self {
            Pipeline::Ts(pipeline) => &mut pipeline.segmenter,
            Pipeline::Aac(pipeline) => &mut pipeline.segmenter,
        }
    }
}

/// Converts MPEG-2 TS or raw ADTS input into fragmented MP4 segments.
///
/// Events are queued for [`take_events`](Transmuxer::take_events) unless a
/// listener was installed with [`on_event`](Transmuxer::on_event).
pub struct Transmuxer {
    options: TransmuxerOptions,
    pipeline: Pipeline,
    has_flushed: bool,
    gops_to_align_with: Vec<GopInfo>,
    events: Vec<TransmuxerEvent>,
    listener: Option<Listener>,
}

impl Default for Transmuxer {
    /// A transmuxer using the process-wide default options
    fn default() -> Self {
        Self::new(default_options())
    }
}

impl Transmuxer {
    /// Creates a transmuxer expecting a transport stream; the first push
    /// after a flush may switch it to raw ADTS.
    pub fn new(options: TransmuxerOptions) -> Self {
        Self {
            pipeline: Pipeline::ts(&options),
            options,
            has_flushed: true,
            gops_to_align_with: Vec::new(),
            events: Vec::new(),
            listener: None,
        }
    }

    /// Options the transmuxer was built with
    pub fn options(&self) -> &TransmuxerOptions {
        &self.options
    }

    /// Sends every later event to `listener` instead of the queue
    pub fn on_event<F>(&mut self, listener: F)
    where
        F: FnMut(&TransmuxerEvent) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    /// Drains the queued events
    pub fn take_events(&mut self) -> Vec<TransmuxerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Copies `data` in and feeds it through the pipeline
    pub fn push(&mut self, data: &[u8]) {
        self.push_bytes(Bytes::copy_from_slice(data));
    }

    /// Feeds `data` through the pipeline.
    ///
    /// The input format is sniffed on the first push after a flush or reset.
    /// Chunks may split packets at any byte.
    pub fn push_bytes(&mut self, data: Bytes) {
        if self.has_flushed {
            let is_aac = is_likely_aac_data(&data);
            match (&self.pipeline, is_aac) {
                (Pipeline::Ts(_), true) => {
                    log::debug!("input looks like raw ADTS, switching to the AAC pipeline");
                    self.pipeline = Pipeline::aac(&self.options);
                }
                (Pipeline::Aac(_), false) => {
                    log::debug!("switching to the transport stream pipeline");
                    self.pipeline = Pipeline::ts(&self.options);
                }
                _ => {}
            }
            self.has_flushed = false;
        }

        let mut events = Vec::new();
        match &mut self.pipeline {
            Pipeline::Ts(pipeline) => pipeline.push(data, &self.gops_to_align_with, &mut events),
            Pipeline::Aac(pipeline) => pipeline.push(data, &mut events),
        }
        self.emit(events);
    }

    /// Turns everything buffered into segments and ends with
    /// [`TransmuxerEvent::Done`].
    pub fn flush(&mut self) {
        self.finish(FlushMode::Full);
        self.has_flushed = true;
    }

    /// Emits complete frames without closing the current GOP, then
    /// [`TransmuxerEvent::PartialDone`].
    pub fn partial_flush(&mut self) {
        self.finish(FlushMode::Partial);
    }

    /// Flushes, then forgets all timeline state so the next push can start a
    /// discontinuous timeline.
    pub fn end_timeline(&mut self) {
        self.finish(FlushMode::EndTimeline);
    }

    /// Drops all buffered and cached state. Events already queued stay
    /// queued.
    pub fn reset(&mut self) {
        log::debug!("transmuxer reset");
        self.pipeline = Pipeline::ts(&self.options);
        self.has_flushed = true;
        self.gops_to_align_with.clear();
    }

    /// Clears caption decoder state and any partly built cues
    pub fn reset_captions(&mut self) {
        self.pipeline.segmenter().captions.reset();
    }

    /// Starts a new output timeline at `base_media_decode_time` (90kHz).
    ///
    /// Ignored when original timestamps are kept, except that the timeline
    /// start is still forgotten.
    pub fn set_base_media_decode_time(&mut self, base_media_decode_time: u64) {
        if !self.options.keep_original_timestamps {
            self.options.base_media_decode_time = base_media_decode_time;
        }
        let base = self.options.base_media_decode_time;
        self.pipeline.segmenter().set_base_media_decode_time(base);
        match &mut self.pipeline {
            Pipeline::Ts(pipeline) => pipeline.discontinuity(),
            Pipeline::Aac(pipeline) => pipeline.discontinuity(),
        }
    }

    /// Whether audio and video are combined into one segment per flush
    pub fn set_remux(&mut self, remux: bool) {
        self.options.remux = remux;
        self.pipeline.segmenter().coalesce.set_remux(remux);
    }

    /// GOPs of another rendition that video segments must start on
    pub fn align_gops_with(&mut self, gops: Vec<GopInfo>) {
        if let Some(video) = self.pipeline.segmenter().video.as_mut() {
            video.align_gops_with(gops.clone());
        }
        self.gops_to_align_with = gops;
    }

    fn finish(&mut self, mode: FlushMode) {
        let mut events = Vec::new();
        match &mut self.pipeline {
            Pipeline::Ts(pipeline) => pipeline.finish(mode, &self.gops_to_align_with, &mut events),
            Pipeline::Aac(pipeline) => pipeline.finish(mode, &mut events),
        }
        self.emit(events);
    }

    fn emit(&mut self, events: Vec<TransmuxerEvent>) {
        match self.listener.as_mut() {
            Some(listener) => events.iter().for_each(|event| listener(event)),
            None => self.events.extend(events),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::test_utils::transport_stream;
    use crate::codec::aac::stream::test_utils::adts_frame;
    use crate::mp4::inspect;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn data(events: &[TransmuxerEvent]) -> Vec<&Segment> {
        events
            .iter()
            .filter_map(|e| match e {
                TransmuxerEvent::Data(segment) => Some(segment),
                _ => None,
            })
            .collect()
    }

    fn transmux(transmuxer: &mut Transmuxer, input: &[u8]) -> Vec<TransmuxerEvent> {
        transmuxer.push(input);
        transmuxer.flush();
        transmuxer.take_events()
    }

    #[test]
    fn test_combined_segment() {
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        let events = transmux(&mut transmuxer, &transport_stream(10, true));

        assert_eq!(
            events[0],
            TransmuxerEvent::TrackInfo {
                has_audio: true,
                has_video: true
            }
        );
        assert_eq!(events.last(), Some(&TransmuxerEvent::Done));

        let segments = data(&events);
        assert_eq!(segments.len(), 1);
        let segment = segments[0];
        assert_eq!(segment.segment_type, SegmentType::Combined);
        assert_eq!(segment.video_info.as_ref().map(|c| (c.width, c.height)), Some((640, 480)));
        assert_eq!(segment.audio_info.map(|c| c.sample_rate), Some(48_000));

        let init = segment.init_segment.as_ref().unwrap();
        assert_eq!(inspect::track_ids(init), vec![256, 257]);
        // audio ahead of video, both starting the timeline
        assert_eq!(inspect::base_media_decode_times(&segment.boxes), vec![0, 0]);
        let samples = inspect::samples(&segment.boxes).unwrap();
        assert_eq!((samples[0].len(), samples[1].len()), (10, 10));
    }

    #[test]
    fn test_timing_and_gop_info() {
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        let events = transmux(&mut transmuxer, &transport_stream(10, false));

        let gops: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TransmuxerEvent::GopInfo(gops) => Some(gops.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(gops.len(), 1);
        assert_eq!((gops[0][0].pts, gops[0][0].dts), (90_000, 90_000));

        let timing = events.iter().find_map(|e| match e {
            TransmuxerEvent::SegmentTimingInfo { track_type, timing } => Some((*track_type, *timing)),
            _ => None,
        });
        let (track_type, timing) = timing.unwrap();
        assert_eq!(track_type, TrackType::Video);
        assert_eq!(timing.start.dts, 90_000);
        assert_eq!(timing.end.dts, 120_000);
    }

    #[test]
    fn test_base_media_decode_time_offsets_output() {
        let options = TransmuxerOptions {
            base_media_decode_time: 90_000,
            ..TransmuxerOptions::default()
        };
        let mut transmuxer = Transmuxer::new(options);
        let events = transmux(&mut transmuxer, &transport_stream(5, true));
        let segment = data(&events)[0];
        // audio tfdt is on the 48kHz clock
        assert_eq!(inspect::base_media_decode_times(&segment.boxes), vec![48_000, 90_000]);

        transmuxer.set_base_media_decode_time(180_000);
        assert_eq!(transmuxer.options().base_media_decode_time, 180_000);
    }

    #[test]
    fn test_separate_segments_without_remux() {
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        transmuxer.set_remux(false);
        let events = transmux(&mut transmuxer, &transport_stream(5, true));

        let types: Vec<_> = data(&events).iter().map(|s| s.segment_type).collect();
        assert_eq!(types, vec![SegmentType::Video, SegmentType::Audio]);
        assert!(data(&events).iter().all(|s| s.init_segment.is_some()));
        assert_eq!(events.iter().filter(|e| **e == TransmuxerEvent::Done).count(), 1);
    }

    #[test]
    fn test_init_segment_sent_once() {
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        let first = transmux(&mut transmuxer, &transport_stream(5, true));
        let second = transmux(&mut transmuxer, &transport_stream(5, true));

        assert!(data(&first)[0].init_segment.is_some());
        assert!(data(&second)[0].init_segment.is_none());
        // announced again for the new segment
        assert!(matches!(second[0], TransmuxerEvent::TrackInfo { .. }));
    }

    #[test]
    fn test_reset_matches_fresh_instance() {
        let input = transport_stream(12, true);
        let mut reused = Transmuxer::new(TransmuxerOptions::default());
        transmux(&mut reused, &input);
        reused.reset();

        let mut fresh = Transmuxer::new(TransmuxerOptions::default());
        assert_eq!(transmux(&mut reused, &input), transmux(&mut fresh, &input));
    }

    #[test]
    fn test_raw_aac_input() {
        let mut input = Vec::new();
        for _ in 0..3 {
            input.extend(adts_frame(3, &[0x21; 16]));
        }
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        let events = transmux(&mut transmuxer, &input);

        assert_eq!(
            events[0],
            TransmuxerEvent::TrackInfo {
                has_audio: true,
                has_video: false
            }
        );
        let segment = data(&events)[0];
        assert_eq!(segment.segment_type, SegmentType::Audio);
        let init = segment.init_segment.as_ref().unwrap();
        assert_eq!(inspect::track_ids(init), vec![AAC_TRACK_ID]);
        assert_eq!(inspect::samples(&segment.boxes).unwrap()[0].len(), 3);
        assert_eq!(events.last(), Some(&TransmuxerEvent::Done));

        // a transport stream after the flush switches back
        let events = transmux(&mut transmuxer, &transport_stream(3, false));
        assert_eq!(data(&events)[0].segment_type, SegmentType::Video);
    }

    #[test]
    fn test_audio_released_at_flush_is_segmented() {
        use crate::format::ts::types::{PID_PMT, STREAM_ID_AAC, STREAM_TYPE_AAC};
        use crate::format::ts::writer::{packetize, pat_packet, pmt_packet, PesHeader};
        use bytes::{BufMut, BytesMut};

        let mut payload = adts_frame(3, &[0x21; 16]);
        payload.extend(adts_frame(3, &[0x21; 16]));
        let mut pes = BytesMut::new();
        PesHeader::new(STREAM_ID_AAC).with_pts(90_000).write_to(&mut pes, payload.len());
        pes.put_slice(&payload);
        // unbounded, so the demuxer holds it until flush
        pes[4] = 0;
        pes[5] = 0;

        let mut input = pat_packet(PID_PMT, 0);
        input.extend(pmt_packet(PID_PMT, &[(STREAM_TYPE_AAC, 0x101)], 0));
        input.extend(packetize(0x101, &pes, 0).concat());

        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        transmuxer.push(&input);
        assert!(data(&transmuxer.take_events()).is_empty());

        transmuxer.flush();
        let events = transmuxer.take_events();
        let segment = data(&events)[0];
        assert_eq!(segment.segment_type, SegmentType::Audio);
        assert_eq!(inspect::samples(&segment.boxes).unwrap()[0].len(), 2);
        assert_eq!(events.last(), Some(&TransmuxerEvent::Done));
    }

    #[test]
    fn test_partial_flush_then_flush() {
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        transmuxer.push(&transport_stream(10, false));
        transmuxer.partial_flush();
        let partial = transmuxer.take_events();
        assert_eq!(partial.last(), Some(&TransmuxerEvent::PartialDone));
        assert_eq!(data(&partial).len(), 1);
        assert!(!partial.contains(&TransmuxerEvent::Done));

        transmuxer.flush();
        let rest = transmuxer.take_events();
        assert_eq!(rest.last(), Some(&TransmuxerEvent::Done));
        assert_eq!(data(&rest).len(), 1);

        let total: usize = [data(&partial)[0], data(&rest)[0]]
            .iter()
            .map(|s| inspect::samples(&s.boxes).unwrap().iter().map(Vec::len).sum::<usize>())
            .sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_end_timeline() {
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        transmuxer.push(&transport_stream(5, true));
        transmuxer.end_timeline();
        let events = transmuxer.take_events();

        let n = events.len();
        assert_eq!(&events[n - 2..], &[TransmuxerEvent::Done, TransmuxerEvent::EndedTimeline]);
        assert_eq!(data(&events).len(), 1);
    }

    #[test]
    fn test_listener_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        transmuxer.on_event(move |event| sink.lock().push(event.clone()));
        transmuxer.push(&transport_stream(5, false));
        transmuxer.flush();

        assert!(transmuxer.take_events().is_empty());
        assert_eq!(seen.lock().last(), Some(&TransmuxerEvent::Done));
    }
}
