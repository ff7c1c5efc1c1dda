use bytes::Bytes;

/// H.264 NAL unit types (Table 7-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Unspecified
    Unspecified = 0,
    /// Slice of a non-IDR picture
    CodedSliceNonIDR = 1,
    /// Slice data partition A
    CodedSliceDataPartitionA = 2,
    /// Slice data partition B
    CodedSliceDataPartitionB = 3,
    /// Slice data partition C
    CodedSliceDataPartitionC = 4,
    /// Slice of an IDR picture
    CodedSliceIDR = 5,
    /// Supplemental enhancement information
    SEI = 6,
    /// Sequence parameter set
    SPS = 7,
    /// Picture parameter set
    PPS = 8,
    /// Access unit delimiter
    AccessUnitDelimiter = 9,
    /// End of sequence
    EndOfSequence = 10,
    /// End of stream
    EndOfStream = 11,
    /// Filler data
    FillerData = 12,
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            1 => NalUnitType::CodedSliceNonIDR,
            2 => NalUnitType::CodedSliceDataPartitionA,
            3 => NalUnitType::CodedSliceDataPartitionB,
            4 => NalUnitType::CodedSliceDataPartitionC,
            5 => NalUnitType::CodedSliceIDR,
            6 => NalUnitType::SEI,
            7 => NalUnitType::SPS,
            8 => NalUnitType::PPS,
            9 => NalUnitType::AccessUnitDelimiter,
            10 => NalUnitType::EndOfSequence,
            11 => NalUnitType::EndOfStream,
            12 => NalUnitType::FillerData,
            _ => NalUnitType::Unspecified,
        }
    }
}

impl NalUnitType {
    /// RBSP syntax name for the types the pipeline acts on
    pub fn rbsp_name(&self) -> Option<&'static str> {
        match self {
            NalUnitType::CodedSliceIDR => Some("slice_layer_without_partitioning_rbsp_idr"),
            NalUnitType::SEI => Some("sei_rbsp"),
            NalUnitType::SPS => Some("seq_parameter_set_rbsp"),
            NalUnitType::PPS => Some("pic_parameter_set_rbsp"),
            NalUnitType::AccessUnitDelimiter => Some("access_unit_delimiter_rbsp"),
            _ => None,
        }
    }
}

/// Fields of a sequence parameter set needed to describe the track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpsInfo {
    /// `profile_idc` from the SPS
    pub profile_idc: u8,
    /// `level_idc` from the SPS
    pub level_idc: u8,
    /// `constraint_set` flags byte
    pub profile_compatibility: u8,
    /// Cropped width in pixels
    pub width: u32,
    /// Cropped height in pixels
    pub height: u32,
    /// Sample aspect ratio, 1:1 unless the VUI says otherwise
    pub sar_ratio: (u32, u32),
}

impl Default for SpsInfo {
    fn default() -> Self {
        Self {
            profile_idc: 0,
            level_idc: 0,
            profile_compatibility: 0,
            width: 0,
            height: 0,
            sar_ratio: (1, 1),
        }
    }
}

/// A NAL unit tagged with the timestamps of the PES that completed it.
#[derive(Debug, Clone, PartialEq)]
pub struct NalUnit {
    /// From the header byte
    pub nal_unit_type: NalUnitType,
    /// The unit including its header byte, without start code
    pub data: Bytes,
    /// RBSP with emulation prevention removed, for SEI and SPS units
    pub escaped_rbsp: Option<Bytes>,
    /// Parsed SPS fields
    pub config: Option<SpsInfo>,
    /// PES timestamps, 90kHz
    pub pts: Option<i64>,
    /// 90kHz
    pub dts: Option<i64>,
    /// PID the unit arrived on
    pub track_id: u32,
}

impl NalUnit {
    /// Low five bits of the header byte
    pub fn nal_unit_type_code(&self) -> u8 {
        self.data.first().map_or(0, |b| b & 0x1f)
    }

    /// An IDR slice
    pub fn is_keyframe(&self) -> bool {
        self.nal_unit_type == NalUnitType::CodedSliceIDR
    }

    /// An AUD, which starts every access unit
    pub fn is_access_unit_delimiter(&self) -> bool {
        self.nal_unit_type == NalUnitType::AccessUnitDelimiter
    }
}
