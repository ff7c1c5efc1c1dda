use super::gop::{
    concatenate_nal_data, extend_first_key_frame, generate_sample_table, group_frames_into_gops,
    group_nals_into_frames, Gop,
};
use super::types::{GopInfo, SegmentEvent, SegmentTimingInfo, TimingPoint, TrackSegment};
use crate::av::{CodecConfig, Stage, Track};
use crate::codec::h264::{NalUnit, NalUnitType};
use crate::mp4::{mdat, moof};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

const GOP_CACHE_SIZE: usize = 6;

/// A cached GOP may end at most this far before the new segment starts
const HALF_SECOND: i64 = 45_000;
/// ...or overlap it by this much
const ALLOWABLE_OVERLAP: i64 = 10_000;

struct CachedGop {
    gop: Gop,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
}

/// Builds video fragments from NAL units, one `moof` + `mdat` per GOP.
///
/// A segment that doesn't open on a keyframe is repaired, either by
/// prepending a cached GOP from the previous segment that ends where this one
/// begins, or by stretching the first keyframe back over the frames before it.
pub struct VideoSegmentStream {
    track: Track,
    keep_original_timestamps: bool,
    align_gops_at_end: bool,
    sequence_number: u32,
    nal_units: Vec<NalUnit>,
    gop_cache: VecDeque<CachedGop>,
    gops_to_align_with: Vec<GopInfo>,
    seen_sps: bool,
    seen_pps: bool,
    /// The buffered units continue a GOP whose start went out in a partial flush
    continues_gop: bool,
}

impl VideoSegmentStream {
    /// `align_gops_at_end` picks which end of the buffered GOPs is kept when
    /// aligning to another rendition.
    pub fn new(track: Track, keep_original_timestamps: bool, align_gops_at_end: bool, first_sequence_number: u32) -> Self {
        Self {
            track,
            keep_original_timestamps,
            align_gops_at_end,
            sequence_number: first_sequence_number,
            nal_units: Vec::new(),
            gop_cache: VecDeque::with_capacity(GOP_CACHE_SIZE),
            gops_to_align_with: Vec::new(),
            seen_sps: false,
            seen_pps: false,
            continues_gop: false,
        }
    }

    /// The track with its current configuration
    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Mutable access to the track
    pub fn track_mut(&mut self) -> &mut Track {
        &mut self.track
    }

    /// GOPs of another rendition to line this stream's fragments up with
    pub fn align_gops_with(&mut self, gops: Vec<GopInfo>) {
        self.gops_to_align_with = gops;
    }

    /// Forgets the GOPs kept for filling gaps at the start of a segment
    pub fn clear_gop_cache(&mut self) {
        self.gop_cache.clear();
    }

    fn record_config(&mut self, nal: &NalUnit) {
        let mut config = self.track.avc().cloned().unwrap_or_default();
        match nal.nal_unit_type {
            NalUnitType::SPS if !self.seen_sps => {
                let Some(info) = &nal.config else {
                    return;
                };
                config.sps = vec![nal.data.clone()];
                config.width = info.width;
                config.height = info.height;
                config.profile_idc = info.profile_idc;
                config.level_idc = info.level_idc;
                config.profile_compatibility = info.profile_compatibility;
                config.sar_ratio = Some(info.sar_ratio);
                self.seen_sps = true;
            }
            NalUnitType::PPS if !self.seen_pps => {
                config.pps = vec![nal.data.clone()];
                self.seen_pps = true;
            }
            _ => return,
        }
        self.track.config = Some(CodecConfig::Avc(config));
    }

    fn parameter_sets(&self) -> (Option<Bytes>, Option<Bytes>) {
        let config = self.track.avc();
        (
            config.and_then(|c| c.sps.first().cloned()),
            config.and_then(|c| c.pps.first().cloned()),
        )
    }

    fn cache_gop(&mut self, gop: Gop) {
        let (sps, pps) = self.parameter_sets();
        self.gop_cache.push_front(CachedGop { gop, sps, pps });
        self.gop_cache.truncate(GOP_CACHE_SIZE);
    }

    /// The cached GOP ending nearest to `dts` that can be decoded with the
    /// current parameter sets.
    fn gop_for_fusion(&self, dts: i64) -> Option<Gop> {
        let (Some(sps), Some(pps)) = self.parameter_sets() else {
            return None;
        };

        let mut nearest: Option<(i64, &Gop)> = None;
        for cached in &self.gop_cache {
            if cached.sps.as_ref() != Some(&sps) || cached.pps.as_ref() != Some(&pps) {
                continue;
            }
            if let Some(start) = self.track.timeline_start_info.dts {
                if cached.gop.dts < start {
                    continue;
                }
            }
            let distance = dts - cached.gop.dts - cached.gop.duration;
            if (-ALLOWABLE_OVERLAP..=HALF_SECOND).contains(&distance)
                && nearest.map_or(true, |(d, _)| distance < d)
            {
                nearest = Some((distance, &cached.gop));
            }
        }
        nearest.map(|(_, gop)| gop.clone())
    }

    fn reset_stream(&mut self) {
        self.track.clear_dts_info();
        self.seen_sps = false;
        self.seen_pps = false;
    }

    /// Writes each GOP as its own fragment and returns the concatenated boxes.
    fn fragments(&mut self, gops: &[Gop]) -> Bytes {
        let mut boxes = BytesMut::new();
        for gop in gops {
            self.track.samples = generate_sample_table(&gop.frames);
            self.track.base_media_decode_time = self
                .track
                .base_media_decode_time_for(gop.dts, self.keep_original_timestamps);

            moof(self.sequence_number, std::slice::from_ref(&self.track)).write_to(&mut boxes);
            mdat(&concatenate_nal_data(&gop.frames)).write_to(&mut boxes);
            self.sequence_number = self.sequence_number.wrapping_add(1);
        }
        boxes.freeze()
    }

    fn emit(&mut self, gops: &[Gop], prepended_content_duration: i64, out: &mut Vec<SegmentEvent>) {
        let (Some(first), Some(last)) = (gops.first(), gops.last()) else {
            return;
        };
        let base_media_decode_time = self
            .track
            .base_media_decode_time_for(first.dts, self.keep_original_timestamps);

        out.push(SegmentEvent::GopInfo(gops.iter().map(Gop::info).collect()));
        out.push(SegmentEvent::TimingInfo(SegmentTimingInfo {
            start: TimingPoint {
                pts: first.pts,
                dts: first.dts,
            },
            end: TimingPoint {
                pts: last.pts + last.duration,
                dts: last.dts + last.duration,
            },
            base_media_decode_time,
            prepended_content_duration,
        }));

        let boxes = self.fragments(gops);
        let mut track = self.track.clone();
        track.base_media_decode_time = base_media_decode_time;
        track.samples = gops.iter().flat_map(|g| generate_sample_table(&g.frames)).collect();

        log::debug!(
            "video segment with {} GOPs from dts {}, {} bytes",
            gops.len(),
            first.dts,
            boxes.len()
        );
        out.push(SegmentEvent::Data(TrackSegment { track, boxes }));
    }
}

impl Stage for VideoSegmentStream {
    type Input = NalUnit;
    type Output = SegmentEvent;

    fn push(&mut self, nal: NalUnit, _out: &mut Vec<SegmentEvent>) {
        self.track.collect_dts_info(nal.pts, nal.dts);
        self.record_config(&nal);
        self.nal_units.push(nal);
    }

    fn flush(&mut self, out: &mut Vec<SegmentEvent>) {
        let mut nal_units = std::mem::take(&mut self.nal_units);
        let continues_gop = std::mem::take(&mut self.continues_gop);

        let Some(start) = nal_units.iter().position(NalUnit::is_access_unit_delimiter) else {
            self.reset_stream();
            return;
        };
        if start > 0 {
            log::debug!("dropping {} NAL units before the first access unit delimiter", start);
            nal_units.drain(..start);
        }

        let mut gops = group_frames_into_gops(group_nals_into_frames(nal_units, None));
        let mut prepended_content_duration = 0;

        if !continues_gop && !gops[0].starts_with_key_frame() {
            match self.gop_for_fusion(gops[0].dts) {
                Some(gop) => {
                    log::debug!("fusing cached GOP at dts {} onto the segment", gop.dts);
                    prepended_content_duration = gop.duration;
                    gops.insert(0, gop);
                }
                None => extend_first_key_frame(&mut gops),
            }
        }

        if !self.gops_to_align_with.is_empty() {
            let aligned = if self.align_gops_at_end {
                align_gops_at_end(gops, &self.gops_to_align_with)
            } else {
                align_gops_at_start(gops, &self.gops_to_align_with)
            };
            match aligned {
                Ok(aligned) => {
                    self.track.clear_dts_info();
                    gops = aligned;
                }
                Err(mut unaligned) => {
                    log::debug!("no GOP lines up with the alignment list, segment dropped");
                    if let Some(last) = unaligned.pop() {
                        self.cache_gop(last);
                    }
                    self.reset_stream();
                    return;
                }
            }
        }

        self.track.collect_dts_info(Some(gops[0].pts), Some(gops[0].dts));
        self.emit(&gops, prepended_content_duration, out);

        if let Some(last) = gops.pop() {
            self.cache_gop(last);
        }
        self.reset_stream();
    }

    /// Emits every complete frame; the frame still being received stays
    /// buffered and the GOP carries on in the next flush.
    fn partial_flush(&mut self, out: &mut Vec<SegmentEvent>) {
        let Some(start) = self.nal_units.iter().position(NalUnit::is_access_unit_delimiter) else {
            return;
        };
        let Some(last) = self.nal_units.iter().rposition(NalUnit::is_access_unit_delimiter) else {
            return;
        };
        if last <= start {
            return;
        }

        let pending = self.nal_units.split_off(last);
        let mut complete = std::mem::replace(&mut self.nal_units, pending);
        complete.drain(..start);

        let next_dts = self.nal_units.first().and_then(|nal| nal.dts);
        let gops = group_frames_into_gops(group_nals_into_frames(complete, next_dts));
        self.emit(&gops, 0, out);
        self.continues_gop = true;
        self.track.clear_dts_info();
    }

    fn end_timeline(&mut self, out: &mut Vec<SegmentEvent>) {
        self.flush(out);
        self.gop_cache.clear();
        self.gops_to_align_with.clear();
    }

    fn reset(&mut self) {
        self.nal_units.clear();
        self.gop_cache.clear();
        self.gops_to_align_with.clear();
        self.continues_gop = false;
        self.reset_stream();
    }
}

/// Trims leading GOPs until one starts at the pts of an alignment GOP.
///
/// `Err` hands the GOPs back when none of them line up.
pub fn align_gops_at_start(mut gops: Vec<Gop>, align: &[GopInfo]) -> Result<Vec<Gop>, Vec<Gop>> {
    let (mut align_index, mut gop_index) = (0, 0);
    while align_index < align.len() && gop_index < gops.len() {
        let (target, gop) = (&align[align_index], &gops[gop_index]);
        if target.pts == gop.pts {
            break;
        }
        if gop.pts > target.pts {
            align_index += 1;
            continue;
        }
        gop_index += 1;
    }

    match gop_index {
        0 => Ok(gops),
        i if i == gops.len() => Err(gops),
        i => Ok(gops.split_off(i)),
    }
}

/// Searches from the end for the last GOP starting at an alignment pts.
///
/// Without an exact match, GOPs newer than the last alignment entry are kept.
pub fn align_gops_at_end(mut gops: Vec<Gop>, align: &[GopInfo]) -> Result<Vec<Gop>, Vec<Gop>> {
    // one past the entry under comparison
    let mut align_index = align.len();
    let mut gop_index = gops.len();
    let mut align_end_index = None;
    let mut match_found = false;

    while align_index > 0 && gop_index > 0 {
        let (target, gop) = (&align[align_index - 1], &gops[gop_index - 1]);
        if target.pts == gop.pts {
            match_found = true;
            break;
        }
        if target.pts > gop.pts {
            align_index -= 1;
            continue;
        }
        if align_index == align.len() {
            align_end_index = Some(gop_index - 1);
        }
        gop_index -= 1;
    }

    let trim_index = match (match_found, align_end_index) {
        (true, _) => gop_index - 1,
        (false, Some(index)) => index,
        (false, None) => return Err(gops),
    };
    if trim_index == 0 {
        Ok(gops)
    } else {
        Ok(gops.split_off(trim_index))
    }
}
