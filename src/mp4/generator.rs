use super::Mp4Box;
use crate::av::{Sample, Track, TrackType};
use bytes::{BufMut, Bytes, BytesMut};

const MAJOR_BRAND: &[u8; 4] = b"isom";
const AVC1_BRAND: &[u8; 4] = b"avc1";
const MINOR_VERSION: u32 = 1;

/// Movie timescale and the timescale of every non-audio track
pub const VIDEO_TIMESCALE: u32 = 90_000;

const COMPRESSOR_NAME: &str = "vdkmux";

const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

fn put_matrix(buf: &mut BytesMut) {
    for value in UNITY_MATRIX {
        buf.put_u32(value);
    }
}

/// `isom` brand with `avc1` compatibility
pub fn ftyp() -> Mp4Box {
    let mut payload = BytesMut::with_capacity(16);
    payload.put_slice(MAJOR_BRAND);
    payload.put_u32(MINOR_VERSION);
    payload.put_slice(MAJOR_BRAND);
    payload.put_slice(AVC1_BRAND);
    Mp4Box::leaf(b"ftyp", payload.freeze())
}

/// Movie header on the 90kHz timescale
pub fn mvhd(duration: u32) -> Mp4Box {
    let mut body = BytesMut::with_capacity(96);
    body.put_u32(1); // creation_time
    body.put_u32(2); // modification_time
    body.put_u32(VIDEO_TIMESCALE);
    body.put_u32(duration);
    body.put_u32(0x0001_0000); // rate 1.0
    body.put_u16(0x0100); // volume 1.0
    body.put_bytes(0, 10);
    put_matrix(&mut body);
    body.put_bytes(0, 24); // pre_defined
    body.put_u32(0xffff_ffff); // next_track_ID
    Mp4Box::full(b"mvhd", 0, 0, &body)
}

/// Track header, enabled and in movie and preview
pub fn tkhd(track: &Track) -> Mp4Box {
    let (width, height) = track.avc().map_or((0, 0), |c| (c.width, c.height));

    let mut body = BytesMut::with_capacity(80);
    body.put_u32(0); // creation_time
    body.put_u32(0); // modification_time
    body.put_u32(track.id);
    body.put_u32(0);
    body.put_u32(track.duration);
    body.put_bytes(0, 8);
    body.put_u16(0); // layer
    body.put_u16(0); // alternate_group
    body.put_u16(0x0100); // volume
    body.put_u16(0);
    put_matrix(&mut body);
    body.put_u32((width & 0xffff) << 16);
    body.put_u32((height & 0xffff) << 16);
    // enabled, in movie, in preview
    Mp4Box::full(b"tkhd", 0, 0x000007, &body)
}

/// Media header on the track's timescale
pub fn mdhd(track: &Track) -> Mp4Box {
    let mut body = BytesMut::with_capacity(20);
    body.put_u32(2); // creation_time
    body.put_u32(3); // modification_time
    body.put_u32(track.timescale());
    body.put_u32(track.duration);
    body.put_u16(0x55c4); // 'und'
    body.put_u16(0);
    Mp4Box::full(b"mdhd", 0, 0, &body)
}

/// Handler for video or sound
pub fn hdlr(track_type: TrackType) -> Mp4Box {
    let (handler, name): (&[u8; 4], &[u8]) = match track_type {
        TrackType::Audio => (b"soun", b"SoundHandler\0"),
        _ => (b"vide", b"VideoHandler\0"),
    };
    let mut body = BytesMut::with_capacity(20 + name.len());
    body.put_u32(0); // pre_defined
    body.put_slice(handler);
    body.put_bytes(0, 12);
    body.put_slice(name);
    Mp4Box::full(b"hdlr", 0, 0, &body)
}

/// Self-contained data reference
pub fn dinf() -> Mp4Box {
    let url = Mp4Box::full(b"url ", 0, 0x000001, &[]);
    let dref = Mp4Box::full(b"dref", 0, 0, &1u32.to_be_bytes()).with_children(vec![url]);
    Mp4Box::container(b"dinf", vec![dref])
}

/// AVC sample entry
pub fn avc1(track: &Track) -> Mp4Box {
    let config = track.avc().cloned().unwrap_or_default();

    let mut fields = BytesMut::with_capacity(78);
    fields.put_bytes(0, 6);
    fields.put_u16(1); // data_reference_index
    fields.put_u16(0); // pre_defined
    fields.put_u16(0);
    fields.put_bytes(0, 12); // pre_defined
    fields.put_u16(config.width as u16);
    fields.put_u16(config.height as u16);
    fields.put_u32(0x0048_0000); // horizresolution 72 dpi
    fields.put_u32(0x0048_0000); // vertresolution 72 dpi
    fields.put_u32(0);
    fields.put_u16(1); // frame_count
    let name = COMPRESSOR_NAME.as_bytes();
    fields.put_u8(name.len() as u8);
    fields.put_slice(name);
    fields.put_bytes(0, 31 - name.len());
    fields.put_u16(0x0018); // depth
    fields.put_u16(0xffff); // pre_defined = -1

    let mut avcc = BytesMut::new();
    avcc.put_u8(1); // configurationVersion
    avcc.put_u8(config.profile_idc);
    avcc.put_u8(config.profile_compatibility);
    avcc.put_u8(config.level_idc);
    avcc.put_u8(0xff); // 4 byte NAL lengths
    avcc.put_u8(0xe0 | (config.sps.len() as u8 & 0x1f));
    for sps in &config.sps {
        avcc.put_u16(sps.len() as u16);
        avcc.put_slice(sps);
    }
    avcc.put_u8(config.pps.len() as u8);
    for pps in &config.pps {
        avcc.put_u16(pps.len() as u16);
        avcc.put_slice(pps);
    }

    let mut btrt = BytesMut::with_capacity(12);
    btrt.put_u32(0x001c_9c80); // bufferSizeDB
    btrt.put_u32(0x002d_c6c0); // maxBitrate
    btrt.put_u32(0x002d_c6c0); // avgBitrate

    let mut children = vec![
        Mp4Box::leaf(b"avcC", avcc.freeze()),
        Mp4Box::leaf(b"btrt", btrt.freeze()),
    ];
    if let Some((h_spacing, v_spacing)) = config.sar_ratio {
        let mut pasp = BytesMut::with_capacity(8);
        pasp.put_u32(h_spacing);
        pasp.put_u32(v_spacing);
        children.push(Mp4Box::leaf(b"pasp", pasp.freeze()));
    }

    Mp4Box::leaf(b"avc1", fields.freeze()).with_children(children)
}

/// Elementary stream descriptor with the AudioSpecificConfig
pub fn esds(track: &Track) -> Mp4Box {
    let config = track.aac().copied().unwrap_or_default();
    let body = [
        // ES_Descriptor
        0x03,
        0x19,
        0x00,
        0x00, // ES_ID
        0x00,
        // DecoderConfigDescriptor
        0x04,
        0x11,
        0x40, // MPEG-4 audio
        0x15, // audio stream
        0x00,
        0x06,
        0x00, // bufferSizeDB
        0x00,
        0x00,
        0xda,
        0xc0, // maxBitrate
        0x00,
        0x00,
        0xda,
        0xc0, // avgBitrate
        // DecoderSpecificInfo
        0x05,
        0x02,
        // AudioSpecificConfig
        (config.audio_object_type << 3) | (config.sampling_frequency_index >> 1),
        (config.sampling_frequency_index << 7) | (config.channel_count << 3),
        // SLConfigDescriptor
        0x06,
        0x01,
        0x02,
    ];
    Mp4Box::full(b"esds", 0, 0, &body)
}

/// AAC sample entry
pub fn mp4a(track: &Track) -> Mp4Box {
    let config = track.aac().copied().unwrap_or_default();

    let mut fields = BytesMut::with_capacity(28);
    fields.put_bytes(0, 6);
    fields.put_u16(1); // data_reference_index
    fields.put_bytes(0, 8);
    fields.put_u16(u16::from(config.channel_count));
    fields.put_u16(config.sample_size);
    fields.put_u16(0); // pre_defined
    fields.put_u16(0);
    // 16.16 sample rate
    fields.put_u32((config.sample_rate & 0xffff) << 16);

    Mp4Box::leaf(b"mp4a", fields.freeze()).with_children(vec![esds(track)])
}

/// Sample description holding the track's sample entry
pub fn stsd(track: &Track) -> Mp4Box {
    let entry = match track.track_type {
        TrackType::Audio => mp4a(track),
        _ => avc1(track),
    };
    Mp4Box::full(b"stsd", 0, 0, &1u32.to_be_bytes()).with_children(vec![entry])
}

/// Sample table with empty tables; samples live in the fragments
pub fn stbl(track: &Track) -> Mp4Box {
    Mp4Box::container(
        b"stbl",
        vec![
            stsd(track),
            Mp4Box::full(b"stts", 0, 0, &[0; 4]),
            Mp4Box::full(b"stsc", 0, 0, &[0; 4]),
            Mp4Box::full(b"stsz", 0, 0, &[0; 8]),
            Mp4Box::full(b"stco", 0, 0, &[0; 4]),
        ],
    )
}

/// Media information, `vmhd` or `smhd` first
pub fn minf(track: &Track) -> Mp4Box {
    let header = match track.track_type {
        TrackType::Audio => Mp4Box::full(b"smhd", 0, 0, &[0; 4]),
        _ => Mp4Box::full(b"vmhd", 0, 0x000001, &[0; 8]),
    };
    Mp4Box::container(b"minf", vec![header, dinf(), stbl(track)])
}

/// `mdhd`, `hdlr` and `minf`
pub fn mdia(track: &Track) -> Mp4Box {
    Mp4Box::container(b"mdia", vec![mdhd(track), hdlr(track.track_type), minf(track)])
}

/// Track box for `track`
pub fn trak(track: &Track) -> Mp4Box {
    Mp4Box::container(b"trak", vec![tkhd(track), mdia(track)])
}

/// Fragment defaults for the track
pub fn trex(track: &Track) -> Mp4Box {
    let mut body = BytesMut::with_capacity(20);
    body.put_u32(track.id);
    body.put_u32(1); // default_sample_description_index
    body.put_u32(0); // default_sample_duration
    body.put_u32(0); // default_sample_size
    // non-video samples get degradation priority 0
    body.put_u32(if track.track_type == TrackType::Video {
        0x0001_0001
    } else {
        0x0001_0000
    });
    Mp4Box::full(b"trex", 0, 0, &body)
}

/// Movie extends, one `trex` per track
pub fn mvex(tracks: &[Track]) -> Mp4Box {
    Mp4Box::container(b"mvex", tracks.iter().map(trex).collect())
}

/// Movie box for `tracks`
pub fn moov(tracks: &[Track]) -> Mp4Box {
    let mut children = vec![mvhd(0xffff_ffff)];
    children.extend(tracks.iter().map(trak));
    children.push(mvex(tracks));
    Mp4Box::container(b"moov", children)
}

/// `ftyp` followed by `moov` for the given tracks
pub fn init_segment(tracks: &[Track]) -> Bytes {
    let ftyp = ftyp();
    let moov = moov(tracks);
    let mut buf = BytesMut::with_capacity(ftyp.size() + moov.size());
    ftyp.write_to(&mut buf);
    moov.write_to(&mut buf);
    buf.freeze()
}

/// Fragment sequence number
pub fn mfhd(sequence_number: u32) -> Mp4Box {
    Mp4Box::full(b"mfhd", 0, 0, &sequence_number.to_be_bytes())
}

/// Track fragment header, sample description 1
pub fn tfhd(track: &Track) -> Mp4Box {
    let mut body = BytesMut::with_capacity(20);
    body.put_u32(track.id);
    body.put_u32(1); // sample_description_index
    body.put_u32(0); // default_sample_duration
    body.put_u32(0); // default_sample_size
    body.put_u32(0); // default_sample_flags
    Mp4Box::full(b"tfhd", 0, 0x00003a, &body)
}

/// 64-bit base media decode time
pub fn tfdt(base_media_decode_time: u64) -> Mp4Box {
    Mp4Box::full(b"tfdt", 1, 0, &base_media_decode_time.to_be_bytes())
}

/// Dependency byte per sample, video only
pub fn sdtp(samples: &[Sample]) -> Mp4Box {
    let body: Vec<u8> = samples
        .iter()
        .map(|s| (s.flags.depends_on << 4) | (s.flags.is_depended_on << 2) | s.flags.has_redundancy)
        .collect();
    Mp4Box::full(b"sdtp", 0, 0, &body)
}

/// Track run; `data_offset` counts from the start of the enclosing `moof`.
///
/// Audio runs carry only durations and sizes.
pub fn trun(track: &Track, data_offset: u32) -> Mp4Box {
    let samples = &track.samples;
    let video = track.track_type == TrackType::Video;
    let flags = if video { 0x000f01 } else { 0x000301 };

    let mut body = BytesMut::with_capacity(8 + samples.len() * 16);
    body.put_u32(samples.len() as u32);
    body.put_u32(data_offset);
    for sample in samples {
        body.put_u32(sample.duration);
        body.put_u32(sample.size);
        if video {
            let f = &sample.flags;
            body.put_u8((f.is_leading << 2) | f.depends_on);
            body.put_u8((f.is_depended_on << 6) | (f.has_redundancy << 4) | f.is_non_sync_sample);
            body.put_u16(f.degradation_priority);
            body.put_i32(sample.composition_time_offset);
        }
    }
    Mp4Box::full(b"trun", 0, flags, &body)
}

/// Track fragment for one track's samples
pub fn traf(track: &Track, data_offset: u32) -> Mp4Box {
    let mut children = vec![
        tfhd(track),
        tfdt(track.base_media_decode_time),
        trun(track, data_offset),
    ];
    if track.track_type == TrackType::Video {
        children.push(sdtp(&track.samples));
    }
    Mp4Box::container(b"traf", children)
}

/// Fragment header for `tracks`, whose sample bytes follow in one `mdat`
/// in track order.
pub fn moof(sequence_number: u32, tracks: &[Track]) -> Mp4Box {
    let build = |offsets: &[u32]| {
        let mut children = vec![mfhd(sequence_number)];
        children.extend(tracks.iter().zip(offsets).map(|(track, &offset)| traf(track, offset)));
        Mp4Box::container(b"moof", children)
    };

    // offsets don't change the size, so lay out once to measure
    let unplaced = build(&vec![0; tracks.len()]);
    let mut offset = (unplaced.size() + 8) as u32;
    let offsets: Vec<u32> = tracks
        .iter()
        .map(|track| {
            let start = offset;
            offset += track.samples.iter().map(|s| s.size).sum::<u32>();
            start
        })
        .collect();
    build(&offsets)
}

/// Media data box around `data`
pub fn mdat(data: &[u8]) -> Mp4Box {
    Mp4Box::leaf(b"mdat", Bytes::copy_from_slice(data))
}
