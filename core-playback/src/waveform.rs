//! # Waveform Reducer
//!
//! Downsamples decoded audio into a fixed-resolution RMS envelope for
//! display. Every track of a session is reduced against the same reference
//! length (the longest track's frame count) so all envelopes share one
//! visual resolution.
//!
//! Both functions are pure and CPU-bound; run them on the blocking pool for
//! long buffers.

use crate::error::{PlaybackError, Result};
use bridge_traits::PcmBuffer;

/// Bins per envelope when the caller has no preference.
pub const DEFAULT_BIN_COUNT: usize = 512;

/// Lower bound of the normalization divisor; keeps silent envelopes at zero
/// instead of amplifying noise.
pub const NORMALIZE_FLOOR: f32 = 0.001;

/// Frames per envelope bin for a given length.
pub fn window_size(length: usize, bin_count: usize) -> usize {
    (length / bin_count.max(1)).max(1)
}

/// Number of bins [`reduce_to_envelope`] emits for `length` frames.
pub fn envelope_len(length: usize, bin_count: usize) -> usize {
    if length == 0 {
        return 0;
    }
    length.div_ceil(window_size(length, bin_count))
}

/// Reduce `buffer` to an RMS envelope.
///
/// The envelope spans `reference_length` frames when given, else the native
/// length. Window `k` covers frames `[k * w, (k + 1) * w)` with
/// `w = max(1, floor(length / bin_count))`; every channel contributes to the
/// window's sum of squares, frames past the native end count as silence, and
/// each value is `sqrt(sum / (w * channels))`. A trailing partial window is
/// kept, so the envelope holds `ceil(length / w)` values, which equals
/// `bin_count` whenever `length` is a multiple of it.
///
/// # Errors
///
/// [`PlaybackError::InvalidArgument`] if `bin_count` is zero.
pub fn reduce_to_envelope(
    buffer: &PcmBuffer,
    bin_count: usize,
    reference_length: Option<usize>,
) -> Result<Vec<f32>> {
    if bin_count == 0 {
        return Err(PlaybackError::InvalidArgument(
            "bin_count must be greater than 0".to_string(),
        ));
    }

    let channels = buffer.channels();
    if channels.is_empty() || buffer.is_empty() {
        return Ok(Vec::new());
    }

    let native_length = buffer.length();
    let length = reference_length.unwrap_or(native_length);
    let window = window_size(length, bin_count);
    let denominator = (window * channels.len()) as f64;

    let envelope = (0..envelope_len(length, bin_count))
        .map(|bin| {
            let start = (bin * window).min(native_length);
            let end = ((bin + 1) * window).min(native_length);

            let sum: f64 = channels
                .iter()
                .map(|plane| {
                    plane[start..end]
                        .iter()
                        .map(|&s| f64::from(s) * f64::from(s))
                        .sum::<f64>()
                })
                .sum();

            (sum / denominator).sqrt() as f32
        })
        .collect();

    Ok(envelope)
}

/// Scale an envelope so its peak is 1.0.
///
/// Values are divided by `max(0.001, max(envelope))`.
pub fn normalize(envelope: &[f32]) -> Vec<f32> {
    let peak = envelope.iter().copied().fold(NORMALIZE_FLOOR, f32::max);
    envelope.iter().map(|v| v / peak).collect()
}
