//! Types shared by every stage of the pipeline: the [`Stage`] seam, tracks
//! and samples.

mod sample;
mod track;

pub use sample::*;
pub use track::*;

/// Elementary stream codecs the transmuxer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    /// H.264/AVC video
    H264,
    /// AAC audio in ADTS framing
    AAC,
    /// ID3 timed metadata
    Metadata,
}

impl CodecType {
    /// Short codec name as reported on track info
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecType::H264 => "avc",
            CodecType::AAC => "adts",
            CodecType::Metadata => "id3",
        }
    }
}

/// Kind of content a track or elementary packet carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackType {
    /// Video track
    Video,
    /// Audio track
    Audio,
    /// Timed metadata (ID3) track
    TimedMetadata,
}

impl TrackType {
    /// Name used in emitted segment events
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackType::Video => "video",
            TrackType::Audio => "audio",
            TrackType::TimedMetadata => "timed-metadata",
        }
    }
}

/// One synchronous step of the transmux pipeline.
///
/// Stages push their results into the queue handed to them; the caller
/// drains it in order and feeds the next stage. `flush` forces out whatever
/// is buffered, `reset` drops it without emitting.
pub trait Stage {
    /// Unit accepted by `push`
    type Input;
    /// Unit written to the output queue
    type Output;

    /// Consumes one input unit
    fn push(&mut self, input: Self::Input, out: &mut Vec<Self::Output>);

    /// Emits everything buffered
    fn flush(&mut self, _out: &mut Vec<Self::Output>) {}

    /// Emits completed units while keeping partial state
    fn partial_flush(&mut self, _out: &mut Vec<Self::Output>) {}

    /// Flushes at the end of a timeline
    fn end_timeline(&mut self, out: &mut Vec<Self::Output>) {
        self.flush(out)
    }

    /// Discards all buffered state
    fn reset(&mut self);
}
