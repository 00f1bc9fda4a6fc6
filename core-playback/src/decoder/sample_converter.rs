//! # Sample Format Converter
//!
//! Appends Symphonia's decoded packets to planar `f32` channel storage.

use crate::error::{PlaybackError, Result};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::conv::IntoSample;
use symphonia::core::sample::Sample;
use tracing::warn;

/// Normalizes every Symphonia sample format to planar `f32` in `[-1.0, 1.0]`.
pub struct SampleConverter;

impl SampleConverter {
    /// Append the frames of `buffer` to `planes`, one plane per channel.
    ///
    /// `planes` is sized on the first packet. A later packet with a different
    /// channel count is rejected since the track layout cannot change
    /// mid-stream.
    pub fn append_planar(buffer: &AudioBufferRef<'_>, planes: &mut Vec<Vec<f32>>) -> Result<()> {
        match buffer {
            AudioBufferRef::F32(buf) => Self::append(buf, planes),
            AudioBufferRef::F64(buf) => Self::append(buf, planes),
            AudioBufferRef::S32(buf) => Self::append(buf, planes),
            AudioBufferRef::S24(buf) => Self::append(buf, planes),
            AudioBufferRef::S16(buf) => Self::append(buf, planes),
            AudioBufferRef::S8(buf) => Self::append(buf, planes),
            AudioBufferRef::U32(buf) => Self::append(buf, planes),
            AudioBufferRef::U24(buf) => Self::append(buf, planes),
            AudioBufferRef::U16(buf) => Self::append(buf, planes),
            AudioBufferRef::U8(buf) => Self::append(buf, planes),
        }
    }

    fn append<T>(buf: &AudioBuffer<T>, planes: &mut Vec<Vec<f32>>) -> Result<()>
    where
        T: Sample + IntoSample<f32>,
    {
        let channels = buf.spec().channels.count();

        if planes.is_empty() {
            planes.resize_with(channels, Vec::new);
        } else if planes.len() != channels {
            return Err(PlaybackError::DecodingError(format!(
                "Channel count changed mid-stream: {} -> {}",
                planes.len(),
                channels
            )));
        }

        for (index, plane) in planes.iter_mut().enumerate() {
            plane.extend(buf.chan(index).iter().map(|&sample| sample.into_sample()));
        }

        Ok(())
    }

    /// Count samples outside `[-1.0, 1.0]`, warning when any are found.
    pub fn validate_samples(samples: &[f32]) -> usize {
        let clipped = samples.iter().filter(|&&s| !(-1.0..=1.0).contains(&s)).count();

        if clipped > 0 {
            warn!(
                "Detected {} clipped samples ({:.2}% of total)",
                clipped,
                (clipped as f64 / samples.len() as f64) * 100.0
            );
        }

        clipped
    }

    /// Clamp samples to `[-1.0, 1.0]`.
    pub fn clamp_samples(samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}
