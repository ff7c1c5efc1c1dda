use crate::error::{Result, VdkError};

/// A bit-level cursor over an RBSP byte buffer.
///
/// Reads are MSB first. Besides fixed-width fields it decodes the exponential
/// Golomb codes used by H.264 parameter sets:
/// - `ue(v)` via [`BitReader::read_golomb`]
/// - `se(v)` via [`BitReader::read_signed_golomb`]
///
/// Example:
/// ```
/// use vdkmux::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);   // 1
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011); // 011
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit, `true` for 1.
    ///
    /// Returns error if end of data is reached.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(VdkError::Codec("bitstream exhausted".into()));
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads n bits as a big-endian number.
    ///
    /// Returns error if n > 32 or end of data is reached.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(VdkError::Codec(format!("cannot read {} bits at once", n)));
        }
        if (n as usize) > self.available_bits() {
            return Err(VdkError::Codec("bitstream exhausted".into()));
        }

        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value as u32)
    }

    /// Reads an 8-bit field
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Reads a 16-bit field
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.read_bits(16)? as u16)
    }

    /// Reads an unsigned exponential Golomb code (ue(v)).
    ///
    /// Format:
    /// 1. M leading zeros followed by a 1
    /// 2. M more INFO bits
    /// 3. Value = 2^M + INFO - 1
    ///
    /// Example: "00110" (M=2, INFO=10) decodes to 4 + 2 - 1 = 5.
    pub fn read_golomb(&mut self) -> Result<u32> {
        let mut leading_zeros = 0u32;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(VdkError::Codec("invalid Golomb code".into()));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let info = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) + u64::from(info) - 1) as u32)
    }

    /// Reads a signed exponential Golomb code (se(v)).
    ///
    /// Odd codes map to positive values, even codes to negative ones:
    /// 1 -> 1, 2 -> -1, 3 -> 2, 4 -> -2.
    pub fn read_signed_golomb(&mut self) -> Result<i32> {
        let k = self.read_golomb()?;
        let magnitude = ((u64::from(k) + 1) >> 1) as i32;
        if k & 1 == 1 {
            Ok(magnitude)
        } else {
            Ok(-magnitude)
        }
    }

    /// Skips one ue(v) code
    pub fn skip_golomb(&mut self) -> Result<()> {
        self.read_golomb().map(|_| ())
    }

    /// Skips one se(v) code
    pub fn skip_signed_golomb(&mut self) -> Result<()> {
        self.read_signed_golomb().map(|_| ())
    }

    /// Skips n bits in the stream.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        if (n as usize) > self.available_bits() {
            return Err(VdkError::Codec("bitstream exhausted".into()));
        }
        let bits = self.bit_offset as usize + n as usize;
        self.byte_offset += bits / 8;
        self.bit_offset = (bits % 8) as u8;
        Ok(())
    }

    /// Aligns reader to next byte boundary by skipping remaining bits in current byte.
    pub fn align_byte(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
    }

    /// Returns number of bits available to read.
    pub fn available_bits(&self) -> usize {
        (self.data.len().saturating_sub(self.byte_offset) * 8).saturating_sub(self.bit_offset as usize)
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_read_bits() {
        let data = [0b10110011];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(5).unwrap(), 0b10011);

        // across a byte boundary
        let data = [0b10110011, 0b01011010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b10011010);

        let data = [0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(0).unwrap(), 0);

        let data = [0xFF; 5];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bits(33).is_err());
        assert_eq!(reader.read_bits(32).unwrap(), u32::MAX);

        let data = [0b10110011, 0b11001100, 0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(20).unwrap(), 0b10110011110011001010);
    }

    #[test]
    fn test_read_fixed_width() {
        let data = [0x42, 0x00, 0x1e, 0xff];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 0x42);
        assert_eq!(reader.read_u16().unwrap(), 0x001e);
        reader.skip_bits(4).unwrap();
        assert_eq!(reader.available_bits(), 4);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_read_golomb() {
        let test_cases = [
            ([0b10000000], 0, "1"),
            ([0b01000000], 1, "010"),
            ([0b01100000], 2, "011"),
            ([0b00100000], 3, "00100"),
            ([0b00101000], 4, "00101"),
            ([0b00110000], 5, "00110"),
            ([0b00111000], 6, "00111"),
            ([0b00010000], 7, "0001000"),
            ([0b00010010], 8, "0001001"),
        ];

        for (input, expected, pattern) in test_cases.iter() {
            let mut reader = BitReader::new(input);
            assert_eq!(reader.read_golomb().unwrap(), *expected, "pattern {}", pattern);
        }

        let data = [0x00];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_golomb().is_err());
    }

    #[test]
    fn test_signed_golomb() {
        let test_cases = [
            ([0b10000000], 0),
            ([0b01000000], 1),
            ([0b01100000], -1),
            ([0b00100000], 2),
            ([0b00101000], -2),
            ([0b00110000], 3),
            ([0b00111000], -3),
            ([0b00010000], 4),
            ([0b00010010], -4),
        ];

        for (input, expected) in test_cases.iter() {
            let mut reader = BitReader::new(input);
            assert_eq!(reader.read_signed_golomb().unwrap(), *expected);
        }
    }

    #[test]
    fn test_consecutive_golomb() {
        let values = [3, 5, 1, 0, 4, 1919, 0];
        let encoded = encode_golomb(&values);
        let mut reader = BitReader::new(&encoded);

        for &expected in &values {
            assert_eq!(reader.read_golomb().unwrap(), expected);
        }
        assert!(reader.read_bit().unwrap());
    }

    #[test]
    fn test_skip_and_align() {
        let data = [0xFF, 0x00];
        let mut reader = BitReader::new(&data);
        reader.read_bits(3).unwrap();
        assert_eq!(reader.bit_offset, 3);
        reader.align_byte();
        assert_eq!(reader.bit_offset, 0);
        assert_eq!(reader.byte_offset, 1);
        assert!(reader.skip_bits(9).is_err());
        reader.skip_bits(8).unwrap();
        assert!(reader.read_bit().is_err());
    }

    #[quickcheck]
    fn prop_read_bits_matches_manual(data: Vec<u8>, n: u8) -> bool {
        let n = u32::from(n % 33);
        let mut reader = BitReader::new(&data);

        match reader.read_bits(n) {
            Ok(result) => {
                let mut expected = 0u64;
                for i in 0..n as usize {
                    let bit = (data[i / 8] >> (7 - (i % 8))) & 1;
                    expected = (expected << 1) | u64::from(bit);
                }
                u64::from(result) == expected
            }
            Err(_) => (n as usize) > data.len() * 8,
        }
    }

    #[quickcheck]
    fn prop_golomb_round_trip(values: Vec<u16>) -> bool {
        let values: Vec<u32> = values.into_iter().map(u32::from).collect();
        let encoded = encode_golomb(&values);
        let mut reader = BitReader::new(&encoded);
        values.iter().all(|&expected| matches!(reader.read_golomb(), Ok(v) if v == expected))
    }

    #[quickcheck]
    fn prop_signed_golomb_round_trip(values: Vec<i16>) -> bool {
        let mut writer = BitWriter::new();
        for &v in &values {
            writer.se(i32::from(v));
        }
        let encoded = writer.finish();
        let mut reader = BitReader::new(&encoded);
        values
            .iter()
            .all(|&expected| matches!(reader.read_signed_golomb(), Ok(v) if v == i32::from(expected)))
    }
}
