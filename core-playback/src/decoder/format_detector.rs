//! # Format Detection Module
//!
//! Probe hints and codec classification for Symphonia.

use crate::error::{PlaybackError, Result};
use crate::traits::AudioCodec;
use symphonia::core::codecs::CodecType;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Format detector for audio streams.
pub struct FormatDetector;

impl FormatDetector {
    /// File extension of a locator, ignoring URL queries and fragments.
    ///
    /// ```rust
    /// use core_playback::FormatDetector;
    ///
    /// assert_eq!(FormatDetector::locator_extension("stems/drums.WAV"), Some("WAV"));
    /// assert_eq!(
    ///     FormatDetector::locator_extension("https://cdn.example.com/bass.mp3?sig=1"),
    ///     Some("mp3")
    /// );
    /// assert_eq!(FormatDetector::locator_extension("https://cdn.example.com/stream"), None);
    /// ```
    pub fn locator_extension(locator: &str) -> Option<&str> {
        let path = locator
            .split(['?', '#'])
            .next()
            .unwrap_or(locator);
        let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let (stem, extension) = file_name.rsplit_once('.')?;
        if stem.is_empty() || extension.is_empty() {
            return None;
        }
        Some(extension)
    }

    /// Create a probe hint from a path or URL.
    pub fn hint_from_locator(locator: Option<&str>) -> Hint {
        let mut hint = Hint::new();

        match locator.and_then(Self::locator_extension) {
            Some(extension) => {
                debug!("Setting probe hint extension: {}", extension);
                hint.with_extension(&extension.to_ascii_lowercase());
            }
            None => debug!("No file extension found, probe will auto-detect"),
        }

        hint
    }

    /// Create a probe hint from MIME type.
    pub fn hint_from_mime_type(mime_type: &str) -> Hint {
        let mut hint = Hint::new();
        hint.mime_type(mime_type);
        hint
    }

    /// Convert Symphonia's `CodecType` to [`AudioCodec`].
    pub fn detect_codec(codec_type: CodecType) -> AudioCodec {
        use symphonia::core::codecs::*;

        if codec_type == CODEC_TYPE_MP3 {
            AudioCodec::Mp3
        } else if codec_type == CODEC_TYPE_AAC {
            AudioCodec::Aac
        } else if codec_type == CODEC_TYPE_FLAC {
            AudioCodec::Flac
        } else if codec_type == CODEC_TYPE_VORBIS {
            AudioCodec::Vorbis
        } else if codec_type == CODEC_TYPE_OPUS {
            AudioCodec::Opus
        } else if codec_type == CODEC_TYPE_ALAC {
            AudioCodec::Alac
        } else if [
            CODEC_TYPE_PCM_U8,
            CODEC_TYPE_PCM_S16LE,
            CODEC_TYPE_PCM_S16BE,
            CODEC_TYPE_PCM_S24LE,
            CODEC_TYPE_PCM_S24BE,
            CODEC_TYPE_PCM_S32LE,
            CODEC_TYPE_PCM_S32BE,
            CODEC_TYPE_PCM_F32LE,
            CODEC_TYPE_PCM_F32BE,
            CODEC_TYPE_PCM_F64LE,
            CODEC_TYPE_PCM_F64BE,
        ]
        .contains(&codec_type)
        {
            AudioCodec::Wav
        } else {
            warn!("Unknown codec type: {:?}", codec_type);
            AudioCodec::Unknown
        }
    }

    /// Check that the codec is enabled by the current feature flags.
    pub fn validate_codec_support(codec: AudioCodec) -> Result<()> {
        let (enabled, feature) = match codec {
            AudioCodec::Mp3 => (cfg!(feature = "decoder-mp3"), "decoder-mp3"),
            AudioCodec::Flac => (cfg!(feature = "decoder-flac"), "decoder-flac"),
            AudioCodec::Vorbis => (cfg!(feature = "decoder-vorbis"), "decoder-vorbis"),
            AudioCodec::Opus => (cfg!(feature = "decoder-opus"), "decoder-opus"),
            AudioCodec::Aac => (cfg!(feature = "decoder-aac"), "decoder-aac"),
            AudioCodec::Wav => (cfg!(feature = "decoder-wav"), "decoder-wav"),
            AudioCodec::Alac => (cfg!(feature = "decoder-alac"), "decoder-alac"),
            AudioCodec::Unknown => {
                return Err(PlaybackError::UnsupportedCodec(
                    "Unknown audio codec".to_string(),
                ))
            }
        };

        if enabled {
            Ok(())
        } else {
            Err(PlaybackError::UnsupportedCodec(format!(
                "{:?} decoder not enabled. Enable '{}' feature",
                codec, feature
            )))
        }
    }

    /// Common file extension for a codec.
    pub fn codec_extension(codec: AudioCodec) -> &'static str {
        match codec {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Aac => "m4a",
            AudioCodec::Flac => "flac",
            AudioCodec::Vorbis => "ogg",
            AudioCodec::Opus => "opus",
            AudioCodec::Wav => "wav",
            AudioCodec::Alac => "m4a",
            AudioCodec::Unknown => "bin",
        }
    }

    pub fn codec_mime_type(codec: AudioCodec) -> &'static str {
        match codec {
            AudioCodec::Mp3 => "audio/mpeg",
            AudioCodec::Aac => "audio/mp4",
            AudioCodec::Flac => "audio/flac",
            AudioCodec::Vorbis => "audio/ogg",
            AudioCodec::Opus => "audio/opus",
            AudioCodec::Wav => "audio/wav",
            AudioCodec::Alac => "audio/mp4",
            AudioCodec::Unknown => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::codecs::{CODEC_TYPE_FLAC, CODEC_TYPE_NULL, CODEC_TYPE_PCM_S16LE};

    #[test]
    fn test_locator_extension() {
        assert_eq!(FormatDetector::locator_extension("/a/b/vox.flac"), Some("flac"));
        assert_eq!(FormatDetector::locator_extension("C:\\stems\\keys.ogg"), Some("ogg"));
        assert_eq!(
            FormatDetector::locator_extension("https://x.io/a.b/track.wav#t=3"),
            Some("wav")
        );
        assert_eq!(FormatDetector::locator_extension("https://x.io/a.b/track"), None);
        assert_eq!(FormatDetector::locator_extension(".hidden"), None);
        assert_eq!(FormatDetector::locator_extension("noext"), None);
    }

    #[test]
    fn test_hint_without_locator() {
        // Hint is opaque, but should not panic
        let _ = FormatDetector::hint_from_locator(None);
        let _ = FormatDetector::hint_from_locator(Some("drums.WAV"));
        let _ = FormatDetector::hint_from_mime_type("audio/wav");
    }

    #[test]
    fn test_detect_codec() {
        assert_eq!(FormatDetector::detect_codec(CODEC_TYPE_FLAC), AudioCodec::Flac);
        assert_eq!(FormatDetector::detect_codec(CODEC_TYPE_PCM_S16LE), AudioCodec::Wav);
        assert_eq!(FormatDetector::detect_codec(CODEC_TYPE_NULL), AudioCodec::Unknown);
    }

    #[test]
    fn test_codec_extension_and_mime() {
        assert_eq!(FormatDetector::codec_extension(AudioCodec::Mp3), "mp3");
        assert_eq!(FormatDetector::codec_extension(AudioCodec::Vorbis), "ogg");
        assert_eq!(FormatDetector::codec_mime_type(AudioCodec::Flac), "audio/flac");
        assert_eq!(FormatDetector::codec_mime_type(AudioCodec::Wav), "audio/wav");
    }

    #[test]
    fn test_codec_validation() {
        assert!(FormatDetector::validate_codec_support(AudioCodec::Unknown).is_err());

        #[cfg(feature = "decoder-wav")]
        assert!(FormatDetector::validate_codec_support(AudioCodec::Wav).is_ok());
    }
}
