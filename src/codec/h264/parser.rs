use bytes::Bytes;

use super::types::SpsInfo;
use crate::utils::BitReader;
use crate::{Result, VdkError};

/// Profiles whose SPS carries chroma format and scaling list fields
const PROFILES_WITH_OPTIONAL_SPS_DATA: [u8; 12] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134];

/// Removes `00 00 03` emulation prevention bytes, yielding the raw RBSP.
pub fn discard_emulation_prevention_bytes(data: &[u8]) -> Bytes {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        if i + 2 < data.len() && data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x03 {
            rbsp.push(0x00);
            rbsp.push(0x00);
            i += 3;
            continue;
        }
        rbsp.push(data[i]);
        i += 1;
    }

    Bytes::from(rbsp)
}

fn skip_scaling_list(reader: &mut BitReader, count: usize) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;

    for _ in 0..count {
        if next_scale != 0 {
            let delta_scale = reader.read_signed_golomb()?;
            next_scale = (last_scale + delta_scale + 256).rem_euclid(256);
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }

    Ok(())
}

fn aspect_ratio(reader: &mut BitReader, idc: u8) -> Result<Option<(u32, u32)>> {
    let ratio = match idc {
        1 => (1, 1),
        2 => (12, 11),
        3 => (10, 11),
        4 => (16, 11),
        5 => (40, 33),
        6 => (24, 11),
        7 => (20, 11),
        8 => (32, 11),
        9 => (80, 33),
        10 => (18, 11),
        11 => (15, 11),
        12 => (64, 33),
        13 => (160, 99),
        14 => (4, 3),
        15 => (3, 2),
        16 => (2, 1),
        // Extended_SAR
        255 => (u32::from(reader.read_u16()?), u32::from(reader.read_u16()?)),
        _ => return Ok(None),
    };
    Ok(Some(ratio))
}

/// Reads the fields of a sequence parameter set RBSP that describe the picture.
///
/// `data` starts after the NAL header byte and must have emulation prevention
/// bytes removed. Width and height account for frame cropping; the sample
/// aspect ratio comes from the VUI when present.
pub fn read_sequence_parameter_set(data: &[u8]) -> Result<SpsInfo> {
    let mut reader = BitReader::new(data);

    let profile_idc = reader.read_u8()?;
    let profile_compatibility = reader.read_u8()?;
    let level_idc = reader.read_u8()?;
    reader.skip_golomb()?; // seq_parameter_set_id

    if PROFILES_WITH_OPTIONAL_SPS_DATA.contains(&profile_idc) {
        let chroma_format_idc = reader.read_golomb()?;
        if chroma_format_idc == 3 {
            reader.skip_bits(1)?; // separate_colour_plane_flag
        }
        reader.skip_golomb()?; // bit_depth_luma_minus8
        reader.skip_golomb()?; // bit_depth_chroma_minus8
        reader.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag

        if reader.read_bit()? {
            let count = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..count {
                if reader.read_bit()? {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    reader.skip_golomb()?; // log2_max_frame_num_minus4
    let pic_order_cnt_type = reader.read_golomb()?;
    if pic_order_cnt_type == 0 {
        reader.skip_golomb()?; // log2_max_pic_order_cnt_lsb_minus4
    } else if pic_order_cnt_type == 1 {
        reader.skip_bits(1)?; // delta_pic_order_always_zero_flag
        reader.skip_signed_golomb()?; // offset_for_non_ref_pic
        reader.skip_signed_golomb()?; // offset_for_top_to_bottom_field
        let num_ref_frames_in_pic_order_cnt_cycle = reader.read_golomb()?;
        for _ in 0..num_ref_frames_in_pic_order_cnt_cycle {
            reader.skip_signed_golomb()?;
        }
    }

    reader.skip_golomb()?; // max_num_ref_frames
    reader.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs_minus1 = reader.read_golomb()?;
    let pic_height_in_map_units_minus1 = reader.read_golomb()?;
    let frame_mbs_only_flag = reader.read_bits(1)?;
    if frame_mbs_only_flag == 0 {
        reader.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    reader.skip_bits(1)?; // direct_8x8_inference_flag

    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0, 0, 0, 0);
    if reader.read_bit()? {
        crop_left = reader.read_golomb()?;
        crop_right = reader.read_golomb()?;
        crop_top = reader.read_golomb()?;
        crop_bottom = reader.read_golomb()?;
    }

    let mut sar_ratio = (1, 1);
    // vui_parameters_present_flag, then aspect_ratio_info_present_flag
    if reader.read_bit().unwrap_or(false) && reader.read_bit().unwrap_or(false) {
        let idc = reader.read_u8()?;
        match aspect_ratio(&mut reader, idc)? {
            Some(ratio) => sar_ratio = ratio,
            None => log::debug!("reserved aspect_ratio_idc {}", idc),
        }
    }

    let width = cropped_size(pic_width_in_mbs_minus1, 16, crop_left, crop_right)?;
    let height = cropped_size(
        pic_height_in_map_units_minus1,
        (2 - frame_mbs_only_flag) * 16,
        crop_top,
        crop_bottom,
    )?;

    Ok(SpsInfo {
        profile_idc,
        level_idc,
        profile_compatibility,
        width,
        height,
        sar_ratio,
    })
}

/// Luma samples along one axis after cropping, in 64-bit so hostile Golomb
/// values cannot wrap
fn cropped_size(units_minus1: u32, unit: u32, crop_start: u32, crop_end: u32) -> Result<u32> {
    let size = (u64::from(units_minus1) + 1) * u64::from(unit);
    let crop = (u64::from(crop_start) + u64::from(crop_end)) * 2;
    u32::try_from(size.saturating_sub(crop))
        .map_err(|_| VdkError::Codec(format!("SPS picture dimension out of range: {} samples", size)))
}

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::utils::bits::test_utils::BitWriter;

    /// Baseline SPS body (no NAL header) with the given macroblock dimensions
    pub fn baseline_sps(width_mbs: u32, height_mbs: u32) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.bits(66, 8).bits(0xc0, 8).bits(30, 8);
        w.ue(0); // sps id
        w.ue(0); // log2_max_frame_num_minus4
        w.ue(0); // poc type
        w.ue(0); // log2_max_poc_lsb_minus4
        w.ue(1); // max_num_ref_frames
        w.bit(false);
        w.ue(width_mbs - 1).ue(height_mbs - 1);
        w.bit(true); // frame_mbs_only
        w.bit(true); // direct_8x8
        w.bit(false); // cropping
        w.bit(false); // vui
        w.finish()
    }
}
