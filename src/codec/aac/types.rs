use bytes::Bytes;

/// Sampling frequencies indexed by `sampling_frequency_index`
pub const ADTS_SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Samples carried by one raw data block
pub const SAMPLES_PER_RAW_BLOCK: u32 = 1024;

/// Size of an ADTS header without CRC
pub const ADTS_HEADER_SIZE: usize = 7;

/// Two bit ADTS profile field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    /// AAC Main
    Main = 0,
    /// Low Complexity
    LC = 1,
    /// Scalable Sample Rate
    SSR = 2,
    /// Long Term Prediction
    LTP = 3,
}

impl From<u8> for ProfileType {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0 => ProfileType::Main,
            1 => ProfileType::LC,
            2 => ProfileType::SSR,
            _ => ProfileType::LTP,
        }
    }
}

impl ProfileType {
    /// MPEG-4 audio object type, which is the ADTS profile plus one
    pub fn audio_object_type(&self) -> u8 {
        *self as u8 + 1
    }
}

/// Fixed and variable ADTS header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdtsHeader {
    /// 12 bits, all ones
    pub sync_word: u32,
    /// 1 bit, 0 for MPEG-4 and 1 for MPEG-2
    pub id: u8,
    /// 2 bits, always 0
    pub layer: u8,
    /// 1 bit, set when there is no CRC
    pub protection_absent: bool,
    /// 2 bits, audio object type minus one
    pub profile: ProfileType,
    /// 4 bits
    pub sample_rate_index: u8,
    /// 1 bit
    pub private_bit: bool,
    /// 3 bits
    pub channel_configuration: u8,
    /// 1 bit
    pub original_copy: bool,
    /// 1 bit
    pub home: bool,
    /// 1 bit
    pub copyright_id_bit: bool,
    /// 1 bit
    pub copyright_id_start: bool,
    /// 13 bits, header included
    pub frame_length: u16,
    /// 11 bits
    pub buffer_fullness: u16,
    /// 2 bits, raw data blocks minus one
    pub number_of_raw_blocks: u8,
}

impl AdtsHeader {
    /// The 12-bit sync word is all ones
    pub fn sync_word_valid(&self) -> bool {
        self.sync_word == 0xFFF
    }

    /// Sampling frequency for `sample_rate_index`
    pub fn sample_rate(&self) -> Option<u32> {
        ADTS_SAMPLING_FREQUENCIES.get(usize::from(self.sample_rate_index)).copied()
    }

    /// Bytes between the start of the header and the raw data
    pub fn header_length(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_SIZE
        } else {
            ADTS_HEADER_SIZE + 2
        }
    }

    /// PCM samples per channel in the frame
    pub fn sample_count(&self) -> u32 {
        (u32::from(self.number_of_raw_blocks) + 1) * SAMPLES_PER_RAW_BLOCK
    }
}

/// One AAC frame stripped of its ADTS header.
#[derive(Debug, Clone, PartialEq)]
pub struct AdtsFrame {
    /// 90kHz, advanced by the frames before it in the PES
    pub pts: i64,
    /// 90kHz
    pub dts: i64,
    /// PCM samples per channel
    pub sample_count: u32,
    /// From the ADTS profile, plus one
    pub audio_object_type: u8,
    /// ADTS channel configuration
    pub channel_count: u8,
    /// Hz
    pub sample_rate: u32,
    /// ADTS sampling frequency index
    pub sampling_frequency_index: u8,
    /// Always 16, the AudioSampleEntry default
    pub sample_size: u16,
    /// Raw AAC payload
    pub data: Bytes,
}
