use crate::av::Stage;
use bytes::{Bytes, BytesMut};

/// Splits an Annex B byte stream on `00 00 01` start codes.
///
/// Start codes may straddle pushes: bytes after the last start code are kept
/// until the next start code or a flush terminates the unit. Emitted units
/// start at the NAL header byte; trailing zero bytes are dropped.
#[derive(Debug, Default)]
pub struct NalByteStream {
    buffer: Bytes,
    sync_point: usize,
    i: usize,
}

impl NalByteStream {
    /// An empty scanner
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, start: usize, end: usize, out: &mut Vec<Bytes>) {
        if start < end && end <= self.buffer.len() {
            out.push(self.buffer.slice(start..end));
        }
    }
}

impl Stage for NalByteStream {
    type Input = Bytes;
    type Output = Bytes;

    fn push(&mut self, data: Bytes, out: &mut Vec<Bytes>) {
        self.buffer = if self.buffer.is_empty() {
            data
        } else {
            let mut joined = BytesMut::with_capacity(self.buffer.len() + data.len());
            joined.extend_from_slice(&self.buffer);
            joined.extend_from_slice(&data);
            joined.freeze()
        };

        let buf = self.buffer.clone();
        let len = buf.len();
        // out of range reads never match a zero byte
        let at = |idx: usize, back: usize| idx.checked_sub(back).and_then(|i| buf.get(i).copied());

        // line the sync point up with a start code
        while self.sync_point + 3 < len {
            if buf[self.sync_point + 2] == 1 {
                self.i = self.sync_point + 5;
                break;
            }
            self.sync_point += 1;
        }

        let mut i = self.i;
        while i < len {
            match buf[i] {
                0 => {
                    if at(i, 1) != Some(0) {
                        i += 2;
                        continue;
                    }
                    if at(i, 2) != Some(0) {
                        i += 1;
                        continue;
                    }
                    if self.sync_point + 3 != i - 2 {
                        self.emit(self.sync_point + 3, i - 2, out);
                    }
                    // swallow trailing zeros up to the next 01
                    loop {
                        i += 1;
                        if i >= len || buf[i] == 1 {
                            break;
                        }
                    }
                    self.sync_point = i - 2;
                    i += 3;
                }
                1 => {
                    if at(i, 1) != Some(0) || at(i, 2) != Some(0) {
                        i += 3;
                        continue;
                    }
                    self.emit(self.sync_point + 3, i - 2, out);
                    self.sync_point = i - 2;
                    i += 3;
                }
                _ => i += 3,
            }
        }

        let sync_point = self.sync_point.min(len);
        self.buffer = buf.slice(sync_point..);
        self.i = i.saturating_sub(sync_point);
        self.sync_point = 0;
    }

    fn flush(&mut self, out: &mut Vec<Bytes>) {
        if self.buffer.len() > 3 {
            self.emit(self.sync_point + 3, self.buffer.len(), out);
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.buffer = Bytes::new();
        self.sync_point = 0;
        self.i = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    fn split(chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut stream = NalByteStream::new();
        let mut out = Vec::new();
        for chunk in chunks {
            stream.push(Bytes::copy_from_slice(chunk), &mut out);
        }
        stream.flush(&mut out);
        out.into_iter().map(|b| b.to_vec()).collect()
    }

    #[test]
    fn test_three_and_four_byte_start_codes() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x09, 0xf0, //
            0x00, 0x00, 0x01, 0x67, 0x42, 0x00, //
            0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84,
        ];
        assert_eq!(
            split(&[&data]),
            vec![vec![0x09, 0xf0], vec![0x67, 0x42], vec![0x65, 0x88, 0x84]]
        );
    }

    #[test]
    fn test_start_code_split_across_pushes() {
        let data = [
            0x00, 0x00, 0x01, 0x09, 0xf0, 0x00, 0x00, 0x01, 0x41, 0x9a, 0x12, 0x34,
        ];
        let expected = vec![vec![0x09, 0xf0], vec![0x41, 0x9a, 0x12, 0x34]];
        for cut in 1..data.len() {
            assert_eq!(split(&[&data[..cut], &data[cut..]]), expected, "cut at {}", cut);
        }
    }

    #[test]
    fn test_trailing_zeros_dropped() {
        let data = [
            0x00, 0x00, 0x01, 0x68, 0xce, 0x00, 0x00, 0x00, 0x00, 0x01, 0x06, 0x05,
        ];
        assert_eq!(split(&[&data]), vec![vec![0x68, 0xce], vec![0x06, 0x05]]);
    }

    #[test]
    fn test_flush_without_data() {
        assert!(split(&[]).is_empty());
        assert!(split(&[&[0x00, 0x00, 0x01]]).is_empty());
    }

    #[test]
    fn test_reset_discards_partial_unit() {
        let mut stream = NalByteStream::new();
        let mut out = Vec::new();
        stream.push(Bytes::from_static(&[0x00, 0x00, 0x01, 0x09, 0xf0]), &mut out);
        stream.reset();
        stream.flush(&mut out);
        assert!(out.is_empty());
    }

    #[quickcheck]
    fn prop_units_survive_any_split(bodies: Vec<Vec<u8>>, cut: usize) -> bool {
        // bodies free of zero bytes cannot contain start codes
        let bodies: Vec<Vec<u8>> = bodies
            .into_iter()
            .map(|b| b.into_iter().map(|x| x.max(2)).collect::<Vec<u8>>())
            .filter(|b| !b.is_empty())
            .collect();
        let mut stream = Vec::new();
        for body in &bodies {
            stream.extend_from_slice(&[0x00, 0x00, 0x01]);
            stream.extend_from_slice(body);
        }
        let cut = if stream.is_empty() { 0 } else { cut % stream.len() };
        split(&[&stream[..cut], &stream[cut..]]) == bodies
    }
}
