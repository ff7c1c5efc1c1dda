use super::types::{Segment, SegmentType, TrackSegment, TransmuxerEvent};
use crate::av::{Stage, TrackType};
use crate::caption::Caption;
use crate::metadata::Id3Tag;
use crate::mp4::init_segment;
use crate::utils::clock::metadata_ts_to_seconds;
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;

/// Input of the [`CoalesceStream`]
#[derive(Debug, Clone, PartialEq)]
pub enum CoalesceInput {
    /// Boxes of one track
    Segment(TrackSegment),
    /// A decoded cue, waiting for the next segment
    Caption(Caption),
    /// An ID3 tag, waiting for the next segment
    Metadata(Id3Tag),
    /// A segment stream finished flushing, with or without data
    Flushed(TrackType),
}

/// Joins the per-track segments of one flush into [`Segment`] events.
///
/// When remuxing, nothing goes out until every track has flushed; the tracks
/// are then combined with audio boxes ahead of video. Otherwise each track's
/// segment is emitted as soon as its stream flushes. Captions and ID3 tags
/// ride along on the next segment emitted; when a completed flush produced no
/// media they go out on a [`SegmentType::Metadata`] segment with no boxes.
pub struct CoalesceStream {
    number_of_tracks: usize,
    remux: bool,
    keep_original_timestamps: bool,
    pending_segments: Vec<TrackSegment>,
    pending_captions: Vec<Caption>,
    pending_metadata: Vec<Id3Tag>,
    flushed_tracks: usize,
    last_init_segments: BTreeMap<SegmentType, Bytes>,
    dispatch_type: String,
}

impl CoalesceStream {
    /// A stream expecting no tracks until told otherwise
    pub fn new(remux: bool, keep_original_timestamps: bool) -> Self {
        Self {
            number_of_tracks: 0,
            remux,
            keep_original_timestamps,
            pending_segments: Vec::new(),
            pending_captions: Vec::new(),
            pending_metadata: Vec::new(),
            flushed_tracks: 0,
            last_init_segments: BTreeMap::new(),
            dispatch_type: String::new(),
        }
    }

    /// Dispatch type reported on segments carrying ID3 tags
    pub fn set_dispatch_type(&mut self, dispatch_type: &str) {
        self.dispatch_type = dispatch_type.to_string();
    }

    /// Tracks that must flush before a flush is complete
    pub fn number_of_tracks(&self) -> usize {
        self.number_of_tracks
    }

    /// Sets how many `Flushed` inputs complete a flush
    pub fn set_number_of_tracks(&mut self, count: usize) {
        self.number_of_tracks = count;
    }

    /// Combine the tracks of a flush into one segment
    pub fn set_remux(&mut self, remux: bool) {
        self.remux = remux;
    }

    /// Emits the pending track segments. `complete` is set once the whole
    /// flush is over, which lets captions and tags go out without media.
    fn emit_pending(&mut self, complete: bool, out: &mut Vec<TransmuxerEvent>) {
        if self.pending_segments.is_empty() {
            if complete && (!self.pending_captions.is_empty() || !self.pending_metadata.is_empty()) {
                out.push(TransmuxerEvent::Data(self.build(Vec::new())));
            }
            return;
        }
        let pending = std::mem::take(&mut self.pending_segments);
        if self.remux {
            out.push(TransmuxerEvent::Data(self.build(pending)));
        } else {
            for segment in pending {
                out.push(TransmuxerEvent::Data(self.build(vec![segment])));
            }
        }
    }

    fn build(&mut self, segments: Vec<TrackSegment>) -> Segment {
        let video = segments.iter().find(|s| s.track.track_type == TrackType::Video);
        let audio = segments.iter().find(|s| s.track.track_type == TrackType::Audio);
        let segment_type = match (video.is_some(), audio.is_some()) {
            (true, true) => SegmentType::Combined,
            (true, false) => SegmentType::Video,
            (false, true) => SegmentType::Audio,
            (false, false) => SegmentType::Metadata,
        };
        let timeline_start_pts = video
            .or(audio)
            .and_then(|s| s.track.timeline_start_info.pts)
            .unwrap_or_default();
        let video_info = video.and_then(|s| s.track.avc().cloned());
        let audio_info = audio.and_then(|s| s.track.aac().copied());

        let init_segment = if segments.is_empty() {
            None
        } else {
            let tracks: Vec<_> = segments.iter().map(|s| s.track.clone()).collect();
            let init = init_segment(&tracks);
            match self.last_init_segments.get(&segment_type) {
                Some(last) if *last == init => None,
                _ => {
                    log::debug!("new {} init segment, {} bytes", segment_type.as_str(), init.len());
                    self.last_init_segments.insert(segment_type, init.clone());
                    Some(init)
                }
            }
        };

        let mut boxes = BytesMut::with_capacity(segments.iter().map(|s| s.boxes.len()).sum());
        for segment in segments.iter().filter(|s| s.track.track_type == TrackType::Audio) {
            boxes.extend_from_slice(&segment.boxes);
        }
        for segment in segments.iter().filter(|s| s.track.track_type != TrackType::Audio) {
            boxes.extend_from_slice(&segment.boxes);
        }

        let keep = self.keep_original_timestamps;
        let mut captions = std::mem::take(&mut self.pending_captions);
        for caption in &mut captions {
            caption.start_time = Some(metadata_ts_to_seconds(caption.start_pts, timeline_start_pts, keep));
            caption.end_time = Some(metadata_ts_to_seconds(caption.end_pts, timeline_start_pts, keep));
        }
        let mut metadata = std::mem::take(&mut self.pending_metadata);
        for tag in &mut metadata {
            tag.cue_time = tag
                .pts
                .map(|pts| metadata_ts_to_seconds(pts, timeline_start_pts, keep));
        }
        let dispatch_type = (!metadata.is_empty()).then(|| self.dispatch_type.clone());

        Segment {
            segment_type,
            init_segment,
            boxes: boxes.freeze(),
            captions,
            metadata,
            dispatch_type,
            video_info,
            audio_info,
        }
    }
}

impl Stage for CoalesceStream {
    type Input = CoalesceInput;
    type Output = TransmuxerEvent;

    fn push(&mut self, input: CoalesceInput, out: &mut Vec<TransmuxerEvent>) {
        match input {
            CoalesceInput::Segment(segment) => self.pending_segments.push(segment),
            CoalesceInput::Caption(caption) => self.pending_captions.push(caption),
            CoalesceInput::Metadata(tag) => self.pending_metadata.push(tag),
            CoalesceInput::Flushed(track_type) => {
                self.flushed_tracks += 1;
                log::trace!(
                    "{} flushed, {} of {} tracks",
                    track_type.as_str(),
                    self.flushed_tracks,
                    self.number_of_tracks
                );
                let complete = self.flushed_tracks >= self.number_of_tracks;
                if !self.remux || complete {
                    self.emit_pending(complete, out);
                }
                if self.flushed_tracks >= self.number_of_tracks {
                    self.flushed_tracks = 0;
                    out.push(TransmuxerEvent::Done);
                }
            }
        }
    }

    /// Emits whatever is pending and finishes the flush regardless of how
    /// many tracks reported in.
    fn flush(&mut self, out: &mut Vec<TransmuxerEvent>) {
        self.emit_pending(true, out);
        self.flushed_tracks = 0;
        out.push(TransmuxerEvent::Done);
    }

    fn partial_flush(&mut self, out: &mut Vec<TransmuxerEvent>) {
        self.emit_pending(false, out);
        out.push(TransmuxerEvent::PartialDone);
    }

    fn reset(&mut self) {
        self.pending_segments.clear();
        self.pending_captions.clear();
        self.pending_metadata.clear();
        self.flushed_tracks = 0;
        self.last_init_segments.clear();
    }
}
