use super::{CodecType, Sample, TrackType};
use bytes::Bytes;

/// Where a track's timeline begins, in 90kHz ticks.
///
/// `pts`/`dts` are the earliest timestamps observed since the last timeline
/// reset; `base_media_decode_time` is the output offset they map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimelineStartInfo {
    /// Output time `pts`/`dts` maps to, 90kHz
    pub base_media_decode_time: u64,
    /// Earliest pts seen
    pub pts: Option<i64>,
    /// Earliest dts seen
    pub dts: Option<i64>,
}

/// Decoder configuration of an H.264 track
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AvcConfig {
    /// Sequence parameter sets, header byte included
    pub sps: Vec<Bytes>,
    /// Picture parameter sets, header byte included
    pub pps: Vec<Bytes>,
    /// Cropped picture size in pixels
    pub width: u32,
    /// Cropped height in pixels
    pub height: u32,
    /// `profile_idc` from the SPS
    pub profile_idc: u8,
    /// `level_idc` from the SPS
    pub level_idc: u8,
    /// `constraint_set` flags byte
    pub profile_compatibility: u8,
    /// Sample aspect ratio from the VUI, when it is not 1:1
    pub sar_ratio: Option<(u32, u32)>,
}

/// Decoder configuration of an AAC track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AacConfig {
    /// 1 for AAC Main, 2 for LC
    pub audio_object_type: u8,
    /// Channel configuration
    pub channel_count: u8,
    /// Hz
    pub sample_rate: u32,
    /// ADTS sampling frequency index
    pub sampling_frequency_index: u8,
    /// Sample size in bits
    pub sample_size: u16,
}

/// Codec configuration attached to a track once its headers were parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecConfig {
    /// H.264 parameter sets and picture size
    Avc(AvcConfig),
    /// AAC AudioSpecificConfig fields
    Aac(AacConfig),
}

/// One audio or video track of the output movie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// `track_ID` in the movie, the elementary PID for transport streams
    pub id: u32,
    /// Audio or video
    pub track_type: TrackType,
    /// Codec of the samples
    pub codec: CodecType,
    /// Movie duration written to `tkhd`/`mdhd`, 0 for fragmented output
    pub duration: u32,
    /// Decoder configuration, set once the headers were parsed
    pub config: Option<CodecConfig>,
    /// Where the track's input timeline starts
    pub timeline_start_info: TimelineStartInfo,
    /// `tfdt` of the segment being built, in the track's timescale
    pub base_media_decode_time: u64,
    /// Earliest pts of the segment being built, 90kHz
    pub min_segment_pts: Option<i64>,
    /// Latest pts of the segment being built
    pub max_segment_pts: Option<i64>,
    /// Earliest dts of the segment being built
    pub min_segment_dts: Option<i64>,
    /// Latest dts of the segment being built
    pub max_segment_dts: Option<i64>,
    /// Samples of the segment being built
    pub samples: Vec<Sample>,
}

impl Track {
    /// An empty track with no configuration
    pub fn new(id: u32, track_type: TrackType, codec: CodecType) -> Self {
        Self {
            id,
            track_type,
            codec,
            duration: 0xffff_ffff,
            config: None,
            timeline_start_info: TimelineStartInfo::default(),
            base_media_decode_time: 0,
            min_segment_pts: None,
            max_segment_pts: None,
            min_segment_dts: None,
            max_segment_dts: None,
            samples: Vec::new(),
        }
    }

    /// H.264 configuration, if attached
    pub fn avc(&self) -> Option<&AvcConfig> {
        match &self.config {
            Some(CodecConfig::Avc(config)) => Some(config),
            _ => None,
        }
    }

    /// AAC configuration, if attached
    pub fn aac(&self) -> Option<&AacConfig> {
        match &self.config {
            Some(CodecConfig::Aac(config)) => Some(config),
            _ => None,
        }
    }

    /// Media timescale; audio tracks run on their sample clock
    pub fn timescale(&self) -> u32 {
        match self.aac() {
            Some(config) if config.sample_rate > 0 => config.sample_rate,
            _ => 90_000,
        }
    }

    /// Widens the timeline start and segment ranges with a unit's timestamps.
    pub fn collect_dts_info(&mut self, pts: Option<i64>, dts: Option<i64>) {
        if let Some(pts) = pts {
            let start = &mut self.timeline_start_info.pts;
            *start = Some(start.map_or(pts, |p| p.min(pts)));
            self.min_segment_pts = Some(self.min_segment_pts.map_or(pts, |p| p.min(pts)));
            self.max_segment_pts = Some(self.max_segment_pts.map_or(pts, |p| p.max(pts)));
        }
        if let Some(dts) = dts {
            let start = &mut self.timeline_start_info.dts;
            *start = Some(start.map_or(dts, |d| d.min(dts)));
            self.min_segment_dts = Some(self.min_segment_dts.map_or(dts, |d| d.min(dts)));
            self.max_segment_dts = Some(self.max_segment_dts.map_or(dts, |d| d.max(dts)));
        }
    }

    /// Forgets the per-segment timestamp ranges
    pub fn clear_dts_info(&mut self) {
        self.min_segment_pts = None;
        self.max_segment_pts = None;
        self.min_segment_dts = None;
        self.max_segment_dts = None;
    }

    /// Forgets where the timeline started, keeping its output offset
    pub fn clear_timeline(&mut self) {
        self.timeline_start_info.pts = None;
        self.timeline_start_info.dts = None;
        self.clear_dts_info();
    }

    /// Base media decode time for a fragment whose earliest dts is `min_dts`.
    ///
    /// Audio values are converted to the sample clock and floored.
    pub fn base_media_decode_time_for(&self, min_dts: i64, keep_original_timestamps: bool) -> u64 {
        let mut relative = min_dts;
        if !keep_original_timestamps {
            relative -= self.timeline_start_info.dts.unwrap_or(0);
        }
        let ticks = (self.timeline_start_info.base_media_decode_time as i64).saturating_add(relative).max(0);

        match self.aac() {
            Some(config) if self.track_type == TrackType::Audio => {
                (ticks as u128 * u128::from(config.sample_rate) / 90_000) as u64
            }
            _ => ticks as u64,
        }
    }
}
