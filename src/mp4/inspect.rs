//! Read-side helpers over serialized boxes.

use crate::av::{Sample, SampleFlags};
use crate::{Result, VdkError};
use std::collections::BTreeMap;

/// Header of one box within a byte slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Four character code
    pub box_type: [u8; 4],
    /// Whole box size, header included
    pub size: u64,
    /// 8, or 16 for a 64-bit size
    pub header_size: usize,
}

/// Reads the box header at the start of `data`.
pub fn read_box_header(data: &[u8]) -> Result<BoxHeader> {
    if data.len() < 8 {
        return Err(VdkError::Parser("box header truncated".into()));
    }
    let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let box_type = [data[4], data[5], data[6], data[7]];

    let (size, header_size) = match size {
        1 => {
            let large = data
                .get(8..16)
                .ok_or_else(|| VdkError::Parser("largesize truncated".into()))?;
            let mut be = [0u8; 8];
            be.copy_from_slice(large);
            (u64::from_be_bytes(be), 16)
        }
        // extends to the end of the data
        0 => (data.len() as u64, 8),
        size => (u64::from(size), 8),
    };
    if size < header_size as u64 {
        return Err(VdkError::Parser(format!("box size {} smaller than its header", size)));
    }

    Ok(BoxHeader {
        box_type,
        size,
        header_size,
    })
}

/// Payloads of every box reached by following `path` from the top level.
///
/// Parsing of a level stops at the first malformed header; a box claiming
/// more bytes than remain is clipped.
pub fn find_box<'a>(data: &'a [u8], path: &[&[u8; 4]]) -> Vec<&'a [u8]> {
    let mut results = Vec::new();
    let Some((first, rest)) = path.split_first() else {
        return results;
    };

    let mut i = 0;
    while i < data.len() {
        let Ok(header) = read_box_header(&data[i..]) else {
            break;
        };
        let end = (i as u64 + header.size).min(data.len() as u64) as usize;
        if &header.box_type == *first {
            let payload = &data[i + header.header_size..end];
            if rest.is_empty() {
                results.push(payload);
            } else {
                results.extend(find_box(payload, rest));
            }
        }
        i = end;
    }
    results
}

fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn be_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    let mut be = [0u8; 8];
    be.copy_from_slice(bytes);
    Some(u64::from_be_bytes(be))
}

fn tkhd_track_id(tkhd: &[u8]) -> Option<u32> {
    let offset = if tkhd.first() == Some(&1) { 20 } else { 12 };
    be_u32(tkhd, offset)
}

/// Track ids declared by the `tkhd` boxes of an init segment
pub fn track_ids(init: &[u8]) -> Vec<u32> {
    find_box(init, &[b"moov", b"trak", b"tkhd"])
        .into_iter()
        .filter_map(tkhd_track_id)
        .collect()
}

/// Media timescale of every track in an init segment, by track id
pub fn timescales(init: &[u8]) -> BTreeMap<u32, u32> {
    let mut result = BTreeMap::new();
    for trak in find_box(init, &[b"moov", b"trak"]) {
        let id = find_box(trak, &[b"tkhd"]).first().and_then(|tkhd| tkhd_track_id(tkhd));
        let timescale = find_box(trak, &[b"mdia", b"mdhd"]).first().and_then(|mdhd| {
            let offset = if mdhd.first() == Some(&1) { 20 } else { 12 };
            be_u32(mdhd, offset)
        });
        if let (Some(id), Some(timescale)) = (id, timescale) {
            result.insert(id, timescale);
        }
    }
    result
}

/// `mfhd` sequence number of a media segment
pub fn sequence_number(fragment: &[u8]) -> Option<u32> {
    find_box(fragment, &[b"moof", b"mfhd"])
        .first()
        .and_then(|mfhd| be_u32(mfhd, 4))
}

/// Base media decode time of every track fragment, in order
pub fn base_media_decode_times(fragment: &[u8]) -> Vec<u64> {
    find_box(fragment, &[b"moof", b"traf", b"tfdt"])
        .into_iter()
        .filter_map(|tfdt| match tfdt.first() {
            Some(1) => be_u64(tfdt, 4),
            Some(_) => be_u32(tfdt, 4).map(u64::from),
            None => None,
        })
        .collect()
}

/// Base media decode time of the first track fragment
pub fn base_media_decode_time(fragment: &[u8]) -> Option<u64> {
    base_media_decode_times(fragment).first().copied()
}

fn parse_sample_flags(flags: u32) -> SampleFlags {
    SampleFlags {
        is_leading: ((flags >> 26) & 0x03) as u8,
        depends_on: ((flags >> 24) & 0x03) as u8,
        is_depended_on: ((flags >> 22) & 0x03) as u8,
        has_redundancy: ((flags >> 20) & 0x03) as u8,
        is_non_sync_sample: ((flags >> 16) & 0x01) as u8,
        degradation_priority: (flags & 0xffff) as u16,
    }
}

/// Decodes a `trun` payload.
///
/// Each sample's `data_offset` is where its bytes start relative to the
/// `moof`; fields absent from the run keep their defaults.
pub fn parse_trun(trun: &[u8]) -> Result<Vec<Sample>> {
    let truncated = || VdkError::Parser("trun truncated".into());

    let flags = be_u32(trun, 0).ok_or_else(truncated)? & 0x00ff_ffff;
    let count = be_u32(trun, 4).ok_or_else(truncated)?;
    let mut i = 8;

    let mut data_offset = 0;
    if flags & 0x000001 != 0 {
        data_offset = be_u32(trun, i).ok_or_else(truncated)?;
        i += 4;
    }
    let mut first_sample_flags = None;
    if flags & 0x000004 != 0 {
        first_sample_flags = Some(be_u32(trun, i).ok_or_else(truncated)?);
        i += 4;
    }

    let mut samples = Vec::with_capacity(count as usize);
    for index in 0..count {
        let mut sample = Sample::default();
        if flags & 0x000100 != 0 {
            sample.duration = be_u32(trun, i).ok_or_else(truncated)?;
            i += 4;
        }
        if flags & 0x000200 != 0 {
            sample.size = be_u32(trun, i).ok_or_else(truncated)?;
            i += 4;
        }
        if flags & 0x000400 != 0 {
            sample.flags = parse_sample_flags(be_u32(trun, i).ok_or_else(truncated)?);
            i += 4;
        } else if let (0, Some(first)) = (index, first_sample_flags) {
            sample.flags = parse_sample_flags(first);
        }
        if flags & 0x000800 != 0 {
            sample.composition_time_offset = be_u32(trun, i).ok_or_else(truncated)? as i32;
            i += 4;
        }
        sample.data_offset = data_offset;
        data_offset = data_offset.wrapping_add(sample.size);
        samples.push(sample);
    }
    Ok(samples)
}

/// Samples of every track run in a media segment, in order
pub fn samples(fragment: &[u8]) -> Result<Vec<Vec<Sample>>> {
    find_box(fragment, &[b"moof", b"traf", b"trun"])
        .into_iter()
        .map(parse_trun)
        .collect()
}
