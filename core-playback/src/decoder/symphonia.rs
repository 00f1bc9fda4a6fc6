//! # Symphonia Decoder Implementation
//!
//! Whole-buffer decoding using the Symphonia library.

use crate::decoder::format_detector::FormatDetector;
use crate::decoder::sample_converter::SampleConverter;
use crate::error::{PlaybackError, Result};
use crate::traits::{AudioDecoder, AudioFormat, DecodedAudio};
use async_trait::async_trait;
use bridge_traits::PcmBuffer;
use bytes::Bytes;
use std::io::Cursor;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use tracing::{debug, error, instrument, warn};

/// Consecutive packet failures tolerated before a stream is declared corrupt.
pub const MAX_CONSECUTIVE_ERRORS: usize = 10;

/// Decoder that reads the whole payload in memory and produces planar PCM.
///
/// Decoding runs on Tokio's blocking pool so concurrent track loads do not
/// starve the executor.
#[derive(Debug, Clone)]
pub struct SymphoniaDecoder {
    max_consecutive_errors: usize,
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        Self {
            max_consecutive_errors: MAX_CONSECUTIVE_ERRORS,
        }
    }
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_consecutive_errors(mut self, max: usize) -> Self {
        self.max_consecutive_errors = max.max(1);
        self
    }

    /// Decode synchronously. Prefer [`AudioDecoder::decode`] from async code.
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub fn decode_blocking(&self, data: Bytes, hint: Option<&str>) -> Result<DecodedAudio> {
        let hint = FormatDetector::hint_from_locator(hint);
        let media_source = Box::new(Cursor::new(data)) as Box<dyn MediaSource>;
        let mss = MediaSourceStream::new(media_source, Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                debug!("Format probe failed: {}", e);
                PlaybackError::UnsupportedFormat(format!("Failed to probe format: {}", e))
            })?;

        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                PlaybackError::UnsupportedFormat("No supported audio tracks".to_string())
            })?;

        let track_id = track.id;
        let codec = FormatDetector::detect_codec(track.codec_params.codec);
        FormatDetector::validate_codec_support(codec)?;

        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let bits_per_sample = track.codec_params.bits_per_sample.map(|b| b as u16);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create decoder: {}", e);
                PlaybackError::DecoderError(format!("Failed to create codec decoder: {}", e))
            })?;

        debug!(?codec, track_id, "Decoder initialized");

        let mut planes: Vec<Vec<f32>> = Vec::new();
        let mut consecutive_errors = 0;

        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    return Err(PlaybackError::DecoderError(
                        "Track list changed, reset required".to_string(),
                    ));
                }
                Err(SymphoniaError::IoError(e)) => {
                    consecutive_errors += 1;
                    warn!(
                        "I/O error reading packet (attempt {}/{}): {}",
                        consecutive_errors, self.max_consecutive_errors, e
                    );
                    if consecutive_errors >= self.max_consecutive_errors {
                        return Err(PlaybackError::CorruptedStream(format!(
                            "Stream I/O failure after {} attempts: {}",
                            consecutive_errors, e
                        )));
                    }
                    continue;
                }
                Err(e) => {
                    return Err(PlaybackError::DecodingError(format!(
                        "Failed to read packet: {}",
                        e
                    )));
                }
            };

            while !format_reader.metadata().is_latest() {
                format_reader.metadata().pop();
            }

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    consecutive_errors = 0;
                    if sample_rate == 0 {
                        sample_rate = decoded.spec().rate;
                    }
                    SampleConverter::append_planar(&decoded, &mut planes)?;
                }
                Err(SymphoniaError::IoError(err)) => {
                    consecutive_errors += 1;
                    warn!(
                        "Skipping corrupted packet (attempt {}/{}): {}",
                        consecutive_errors, self.max_consecutive_errors, err
                    );
                    if consecutive_errors >= self.max_consecutive_errors {
                        return Err(PlaybackError::CorruptedStream(format!(
                            "Stream corruption after {} failed packets",
                            consecutive_errors
                        )));
                    }
                }
                Err(SymphoniaError::DecodeError(err)) => {
                    consecutive_errors += 1;
                    warn!(
                        "Skipping packet with decode error (attempt {}/{}): {}",
                        consecutive_errors, self.max_consecutive_errors, err
                    );
                    if consecutive_errors >= self.max_consecutive_errors {
                        return Err(PlaybackError::CorruptedStream(format!(
                            "Decoder failure after {} failed packets: {}",
                            consecutive_errors, err
                        )));
                    }
                }
                Err(e) => {
                    return Err(PlaybackError::DecoderError(format!(
                        "Failed to decode packet: {}",
                        e
                    )));
                }
            }
        }

        let buffer = PcmBuffer::new(planes, sample_rate);
        if buffer.is_empty() {
            return Err(PlaybackError::EmptyStream);
        }
        if sample_rate == 0 {
            return Err(PlaybackError::UnsupportedFormat(
                "Missing sample rate".to_string(),
            ));
        }

        for plane in buffer.channels() {
            SampleConverter::validate_samples(plane);
        }

        debug!(
            frames = buffer.length(),
            channels = buffer.number_of_channels(),
            sample_rate,
            "Decoded track"
        );

        let format = AudioFormat::new(
            codec,
            sample_rate,
            buffer.number_of_channels() as u16,
            bits_per_sample,
        );

        Ok(DecodedAudio { buffer, format })
    }
}

#[async_trait]
impl AudioDecoder for SymphoniaDecoder {
    async fn decode(&self, data: Bytes, hint: Option<&str>) -> Result<DecodedAudio> {
        let decoder = self.clone();
        let hint = hint.map(str::to_owned);

        tokio::task::spawn_blocking(move || decoder.decode_blocking(data, hint.as_deref()))
            .await
            .map_err(|e| PlaybackError::Internal(format!("Decode task failed: {}", e)))?
    }
}
