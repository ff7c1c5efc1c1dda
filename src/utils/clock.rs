//! 90kHz clock conversions and 33-bit timestamp rollover handling.

/// Ticks per second of the MPEG system clock used for pts/dts
pub const ONE_SECOND_IN_TS: i64 = 90_000;

/// PES timestamps are 33-bit counters
pub const MAX_TS: i64 = 1 << 33;

/// Distance beyond which two timestamps are assumed to straddle a wrap
pub const ROLLOVER_THRESHOLD: i64 = 1 << 32;

/// Seconds to 90kHz ticks
pub fn seconds_to_video_ts(seconds: f64) -> i64 {
    (seconds * ONE_SECOND_IN_TS as f64).round() as i64
}

/// Seconds to ticks of an audio sample clock
pub fn seconds_to_audio_ts(seconds: f64, sample_rate: u32) -> i64 {
    (seconds * f64::from(sample_rate)).round() as i64
}

/// 90kHz ticks to seconds
pub fn video_ts_to_seconds(timestamp: i64) -> f64 {
    timestamp as f64 / ONE_SECOND_IN_TS as f64
}

/// Audio sample clock ticks to seconds
pub fn audio_ts_to_seconds(timestamp: i64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    timestamp as f64 / f64::from(sample_rate)
}

/// Audio sample clock ticks to 90kHz ticks
pub fn audio_ts_to_video_ts(timestamp: i64, sample_rate: u32) -> i64 {
    seconds_to_video_ts(audio_ts_to_seconds(timestamp, sample_rate))
}

/// 90kHz ticks to audio sample clock ticks
pub fn video_ts_to_audio_ts(timestamp: i64, sample_rate: u32) -> i64 {
    seconds_to_audio_ts(video_ts_to_seconds(timestamp), sample_rate)
}

/// Converts a caption or ID3 presentation time to seconds on the output timeline.
///
/// Unless original timestamps are kept, times are made relative to the pts the
/// timeline started at.
pub fn metadata_ts_to_seconds(timestamp: i64, timeline_start_pts: i64, keep_original_timestamps: bool) -> f64 {
    if keep_original_timestamps {
        video_ts_to_seconds(timestamp)
    } else {
        video_ts_to_seconds(timestamp - timeline_start_pts)
    }
}

/// Moves `value` onto the same 2^33 cycle as `reference`.
///
/// Values within 2^32 ticks of the reference are returned untouched. Anything
/// further away is treated as having wrapped: the difference is taken modulo
/// 2^33 and folded into the signed range around the reference, so a value
/// just past a wrap lands just after the reference rather than 26.5 hours
/// before it.
pub fn handle_rollover(value: i64, reference: i64) -> i64 {
    let delta = value - reference;
    if delta.abs() <= ROLLOVER_THRESHOLD {
        return value;
    }

    let mut wrapped = delta.rem_euclid(MAX_TS);
    if wrapped > ROLLOVER_THRESHOLD {
        wrapped -= MAX_TS;
    }
    reference + wrapped
}
