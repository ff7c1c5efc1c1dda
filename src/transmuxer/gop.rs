use super::types::GopInfo;
use crate::av::{Sample, SampleFlags};
use crate::codec::h264::NalUnit;
use bytes::{BufMut, Bytes, BytesMut};

/// One access unit: the NAL units from an AUD up to the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// AUD first
    pub nal_units: Vec<NalUnit>,
    /// 90kHz
    pub pts: i64,
    /// 90kHz
    pub dts: i64,
    /// Ticks until the next frame
    pub duration: i64,
    /// NAL unit bytes without length prefixes
    pub byte_length: usize,
    /// Contains an IDR slice
    pub key_frame: bool,
}

impl Frame {
    fn starting_with(nal: NalUnit) -> Self {
        Self {
            pts: nal.pts.unwrap_or_default(),
            dts: nal.dts.unwrap_or_default(),
            duration: 0,
            byte_length: nal.data.len(),
            key_frame: nal.is_keyframe(),
            nal_units: vec![nal],
        }
    }

    fn push(&mut self, nal: NalUnit) {
        if nal.is_keyframe() {
            self.key_frame = true;
        }
        self.duration = nal.dts.unwrap_or(self.dts) - self.dts;
        self.byte_length += nal.data.len();
        self.nal_units.push(nal);
    }

    /// The `trun` entry for this frame; NAL units are stored 4-byte length prefixed
    pub fn to_sample(&self, data_offset: u32) -> Sample {
        let size = 4 * self.nal_units.len() + self.byte_length;
        let mut sample = Sample::new(size as u32, self.duration.max(0) as u32)
            .with_composition_time_offset((self.pts - self.dts) as i32)
            .with_data_offset(data_offset);
        if self.key_frame {
            sample.flags = SampleFlags::key_frame();
        }
        sample
    }
}

/// A run of frames that starts at a keyframe, except possibly the first GOP
/// of a segment cut mid-GOP.
#[derive(Debug, Clone, PartialEq)]
pub struct Gop {
    /// Frames in decode order
    pub frames: Vec<Frame>,
    /// Of the first frame, 90kHz
    pub pts: i64,
    /// Of the first frame
    pub dts: i64,
    /// Sum of frame durations
    pub duration: i64,
    /// Sum of frame byte lengths
    pub byte_length: usize,
    /// NAL units across all frames
    pub nal_count: usize,
}

impl Gop {
    fn starting_with(frame: Frame) -> Self {
        Self {
            pts: frame.pts,
            dts: frame.dts,
            duration: frame.duration,
            byte_length: frame.byte_length,
            nal_count: frame.nal_units.len(),
            frames: vec![frame],
        }
    }

    fn push(&mut self, frame: Frame) {
        self.duration += frame.duration;
        self.byte_length += frame.byte_length;
        self.nal_count += frame.nal_units.len();
        self.frames.push(frame);
    }

    /// The first frame holds an IDR slice
    pub fn starts_with_key_frame(&self) -> bool {
        self.frames.first().is_some_and(|f| f.key_frame)
    }

    /// Summary reported to hosts
    pub fn info(&self) -> GopInfo {
        GopInfo {
            pts: self.pts,
            dts: self.dts,
            byte_length: self.byte_length,
        }
    }
}

/// Splits NAL units into frames at every access unit delimiter.
///
/// A frame's duration runs to the dts of the delimiter that ends it. The last
/// frame ends at `next_dts` when known, otherwise it borrows the duration of
/// the frame before it.
pub fn group_nals_into_frames(nal_units: Vec<NalUnit>, next_dts: Option<i64>) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut current: Option<Frame> = None;

    for nal in nal_units {
        if nal.is_access_unit_delimiter() {
            if let Some(mut frame) = current.take() {
                frame.duration = nal.dts.unwrap_or(frame.dts) - frame.dts;
                frames.push(frame);
            }
            current = Some(Frame::starting_with(nal));
        } else {
            match current.as_mut() {
                Some(frame) => frame.push(nal),
                None => current = Some(Frame::starting_with(nal)),
            }
        }
    }

    if let Some(mut frame) = current {
        if let Some(next_dts) = next_dts {
            frame.duration = next_dts - frame.dts;
        }
        if frame.duration <= 0 {
            if let Some(previous) = frames.last() {
                frame.duration = previous.duration;
            }
        }
        frames.push(frame);
    }
    frames
}

/// Groups frames into GOPs, starting a new one at every keyframe.
pub fn group_frames_into_gops(frames: Vec<Frame>) -> Vec<Gop> {
    let mut gops: Vec<Gop> = Vec::new();
    let mut current: Option<Gop> = None;

    for frame in frames {
        match current.as_mut() {
            Some(gop) if !frame.key_frame => gop.push(frame),
            _ => {
                if let Some(gop) = current.take() {
                    gops.push(gop);
                }
                current = Some(Gop::starting_with(frame));
            }
        }
    }

    if let Some(mut gop) = current {
        if gop.duration <= 0 {
            if let Some(previous) = gops.last() {
                gop.duration = previous.duration;
            }
        }
        gops.push(gop);
    }
    gops
}

/// Drops a leading GOP without a keyframe and stretches the next keyframe
/// back over the time it covered.
pub fn extend_first_key_frame(gops: &mut Vec<Gop>) {
    if gops.len() < 2 || gops[0].starts_with_key_frame() {
        return;
    }
    let dropped = gops.remove(0);
    log::debug!(
        "dropping {} frames before the first keyframe at dts {}",
        dropped.frames.len(),
        dropped.dts
    );

    let gop = &mut gops[0];
    gop.pts = dropped.pts;
    gop.dts = dropped.dts;
    gop.duration += dropped.duration;
    if let Some(frame) = gop.frames.first_mut() {
        frame.pts = dropped.pts;
        frame.dts = dropped.dts;
        frame.duration += dropped.duration;
    }
}

/// One sample per frame, offsets counted from the start of the `mdat` payload
pub fn generate_sample_table(frames: &[Frame]) -> Vec<Sample> {
    let mut offset = 0u32;
    frames
        .iter()
        .map(|frame| {
            let sample = frame.to_sample(offset);
            offset += sample.size;
            sample
        })
        .collect()
}

/// Frame NAL units as 4-byte length prefixed `mdat` data
pub fn concatenate_nal_data(frames: &[Frame]) -> Bytes {
    let size: usize = frames
        .iter()
        .map(|f| 4 * f.nal_units.len() + f.byte_length)
        .sum();
    let mut data = BytesMut::with_capacity(size);
    for nal in frames.iter().flat_map(|f| &f.nal_units) {
        data.put_u32(nal.data.len() as u32);
        data.put_slice(&nal.data);
    }
    data.freeze()
}
