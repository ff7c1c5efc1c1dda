use super::types::{AdtsHeader, ProfileType, ADTS_HEADER_SIZE, ADTS_SAMPLING_FREQUENCIES};
use crate::utils::BitReader;
use crate::{Result, VdkError};

/// Whether `data[offset..]` starts with an ADTS sync word (layer 0)
pub fn is_adts_sync(data: &[u8], offset: usize) -> bool {
    data.len() > offset + 1 && data[offset] == 0xFF && data[offset + 1] & 0xF6 == 0xF0
}

/// 13-bit `aac_frame_length` of the ADTS header at `offset`, header included.
pub fn parse_adts_size(header: &[u8], offset: usize) -> usize {
    let high_two = usize::from(header[offset + 3] & 0x03) << 11;
    let middle = usize::from(header[offset + 4]) << 3;
    let low_three = usize::from(header[offset + 5] & 0xE0) >> 5;
    high_two | middle | low_three
}

/// Sample rate of the first ADTS header found in `packet`
pub fn parse_sample_rate(packet: &[u8]) -> Option<u32> {
    let mut i = 0;
    while i + 5 < packet.len() {
        if !is_adts_sync(packet, i) {
            i += 1;
            continue;
        }
        return ADTS_SAMPLING_FREQUENCIES
            .get(usize::from((packet[i + 2] & 0x3c) >> 2))
            .copied();
    }
    None
}

/// Audio object type of the ADTS header at `offset`
pub fn parse_profile(header: &[u8], offset: usize) -> u8 {
    ProfileType::from(header[offset + 2] >> 6).audio_object_type()
}

/// Channel configuration of the ADTS header at `offset`
pub fn parse_channel_count(header: &[u8], offset: usize) -> u8 {
    ((header[offset + 2] & 0x01) << 2) | ((header[offset + 3] & 0xc0) >> 6)
}

/// Decodes the ADTS header at the start of `data`.
pub fn parse_adts_header(data: &[u8]) -> Result<AdtsHeader> {
    if data.len() < ADTS_HEADER_SIZE {
        return Err(VdkError::Parser("ADTS header too short".into()));
    }

    let mut reader = BitReader::new(data);

    let sync_word = reader.read_bits(12)?;
    if sync_word != 0xFFF {
        return Err(VdkError::Parser("Invalid ADTS sync word".into()));
    }

    let id = reader.read_bits(1)? as u8;
    let layer = reader.read_bits(2)? as u8;
    let protection_absent = reader.read_bit()?;
    let profile = ProfileType::from(reader.read_bits(2)? as u8);
    let sample_rate_index = reader.read_bits(4)? as u8;
    let private_bit = reader.read_bit()?;
    let channel_configuration = reader.read_bits(3)? as u8;
    let original_copy = reader.read_bit()?;
    let home = reader.read_bit()?;
    let copyright_id_bit = reader.read_bit()?;
    let copyright_id_start = reader.read_bit()?;
    let frame_length = reader.read_bits(13)? as u16;
    let buffer_fullness = reader.read_bits(11)? as u16;
    let number_of_raw_blocks = reader.read_bits(2)? as u8;

    let header = AdtsHeader {
        sync_word,
        id,
        layer,
        protection_absent,
        profile,
        sample_rate_index,
        private_bit,
        channel_configuration,
        original_copy,
        home,
        copyright_id_bit,
        copyright_id_start,
        frame_length,
        buffer_fullness,
        number_of_raw_blocks,
    };

    if header.sample_rate().is_none() {
        return Err(VdkError::Parser(format!(
            "reserved sampling frequency index {}",
            sample_rate_index
        )));
    }
    if usize::from(frame_length) < header.header_length() {
        return Err(VdkError::Parser(format!("ADTS frame length {} too small", frame_length)));
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // AAC-LC, 44.1kHz, stereo, 0x1c (28) byte frame
    const HEADER: [u8; 7] = [0xFF, 0xF1, 0x50, 0x80, 0x03, 0x9F, 0xFC];

    #[test]
    fn test_parse_adts_size() {
        let mut header = [0u8; 7];
        header[3] = 128;
        header[4] = 29;
        header[5] = 255;
        assert_eq!(parse_adts_size(&header, 0), 239);

        let mut shifted = vec![0u8; 3];
        shifted.extend_from_slice(&header);
        assert_eq!(parse_adts_size(&shifted, 3), 239);

        // the top two bits come from byte 3
        header[3] = 0x02;
        assert_eq!(parse_adts_size(&header, 0), 4096 + 239);
    }

    #[test]
    fn test_parse_adts_header() {
        let header = parse_adts_header(&HEADER).unwrap();
        assert!(header.sync_word_valid());
        assert!(header.protection_absent);
        assert_eq!(header.profile, ProfileType::LC);
        assert_eq!(header.sample_rate(), Some(44_100));
        assert_eq!(header.channel_configuration, 2);
        assert_eq!(header.frame_length, 28);
        assert_eq!(header.sample_count(), 1024);
        assert_eq!(header.header_length(), 7);
    }

    #[test]
    fn test_header_fields() {
        assert!(is_adts_sync(&HEADER, 0));
        assert!(!is_adts_sync(&HEADER, 1));
        assert_eq!(parse_profile(&HEADER, 0), 2);
        assert_eq!(parse_channel_count(&HEADER, 0), 2);
        assert_eq!(parse_sample_rate(&[0x00, 0x12, 0xFF, 0xF1, 0x4c, 0x80, 0, 0]), Some(48_000));
        assert_eq!(parse_sample_rate(&[0x00; 16]), None);
    }

    #[test]
    fn test_invalid_headers() {
        assert!(parse_adts_header(&[0x00, 0x00, 0x50, 0x80, 0x43, 0x80, 0x00]).is_err());
        assert!(parse_adts_header(&HEADER[..5]).is_err());
        // sampling frequency index 15
        assert!(parse_adts_header(&[0xFF, 0xF1, 0x7C, 0x80, 0x03, 0x9F, 0xFC]).is_err());
        // frame shorter than its header
        assert!(parse_adts_header(&[0xFF, 0xF1, 0x50, 0x80, 0x00, 0x1F, 0xFC]).is_err());
    }
}
