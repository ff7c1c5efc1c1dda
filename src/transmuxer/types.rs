use crate::av::{AacConfig, AvcConfig, Track, TrackType};
use crate::caption::Caption;
use crate::metadata::Id3Tag;
use bytes::Bytes;

/// Position and size of an emitted GOP, used to align later renditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GopInfo {
    /// Presentation time of the GOP's keyframe
    pub pts: i64,
    /// Decode time of the GOP's keyframe
    pub dts: i64,
    /// Sum of the NAL unit sizes in the GOP
    pub byte_length: usize,
}

/// A pts/dts pair in 90kHz ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingPoint {
    /// 90kHz
    pub pts: i64,
    /// 90kHz
    pub dts: i64,
}

/// Source time range covered by one emitted fragment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentTimingInfo {
    /// Timestamps of the first sample
    pub start: TimingPoint,
    /// Timestamps of the last sample plus its duration
    pub end: TimingPoint,
    /// `tfdt` of the first fragment, in the track's timescale
    pub base_media_decode_time: u64,
    /// Duration of a cached GOP fused onto the front, 0 if none was
    pub prepended_content_duration: i64,
}

/// Boxes produced by a segment stream for one track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSegment {
    /// The track as of this flush: config, timeline and all samples
    pub track: Track,
    /// One or more `moof` + `mdat` pairs
    pub boxes: Bytes,
}

/// Output of the video and audio segment streams
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    Data(TrackSegment),
    /// GOPs in the next video `Data`
    GopInfo(Vec<GopInfo>),
    /// Source range of the next `Data`
    TimingInfo(SegmentTimingInfo),
}

/// Which tracks an emitted segment carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentType {
    /// Video track only
    Video,
    /// Audio track only
    Audio,
    /// Audio and video in one segment
    Combined,
    /// No media, only captions and ID3 tags
    Metadata,
}

impl SegmentType {
    /// Lowercase name, as reported to hosts
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentType::Video => "video",
            SegmentType::Audio => "audio",
            SegmentType::Combined => "combined",
            SegmentType::Metadata => "metadata",
        }
    }
}

/// One emitted media segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Tracks whose fragments are in `boxes`
    pub segment_type: SegmentType,
    /// `ftyp` + `moov`, present only when it changed since the last segment
    /// of this type
    pub init_segment: Option<Bytes>,
    /// Media segment bytes, audio fragments ahead of video
    pub boxes: Bytes,
    /// Caption cues decoded since the previous segment
    pub captions: Vec<Caption>,
    /// ID3 tags parsed since the previous segment
    pub metadata: Vec<Id3Tag>,
    /// In-band metadata dispatch type, set when `metadata` is not empty
    pub dispatch_type: Option<String>,
    /// Decoder configuration of the video track, if there is one
    pub video_info: Option<AvcConfig>,
    /// Decoder configuration of the audio track, if there is one
    pub audio_info: Option<AacConfig>,
}

/// Everything a [`Transmuxer`](super::Transmuxer) reports.
#[derive(Debug, Clone, PartialEq)]
pub enum TransmuxerEvent {
    /// A media segment is ready
    Data(Segment),
    /// Every track finished flushing
    Done,
    /// A partial flush finished
    PartialDone,
    /// No further segments will reference the current timeline
    EndedTimeline,
    /// Tracks announced by the input
    TrackInfo {
        /// An audio track was announced
        has_audio: bool,
        /// A video track was announced
        has_video: bool,
    },
    /// GOPs contained in the video segment about to be emitted
    GopInfo(Vec<GopInfo>),
    /// Source times covered by a track's upcoming segment
    SegmentTimingInfo {
        /// Track the segment belongs to
        track_type: TrackType,
        /// Source times and output offset
        timing: SegmentTimingInfo,
    },
}
