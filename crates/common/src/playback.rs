use std::path::Path;

use crate::extension_of;

/// How a client plays the bytes of a STREAM response. Chosen from the
/// extension of the song's file path; payloads are never sniffed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackStrategy {
    /// Decoded incrementally while the bytes arrive.
    DecodeStream,
    /// Spooled to a temporary file and handed to an external media player.
    ExternalPlayer,
    /// Raw PCM container read by the native line-out loop.
    NativePcm,
    Unsupported,
}

impl PlaybackStrategy {
    pub fn for_path(path: &Path) -> Self {
        match extension_of(path).as_deref() {
            Some("mp3") => PlaybackStrategy::DecodeStream,
            Some("aac") | Some("ogg") => PlaybackStrategy::ExternalPlayer,
            Some("wav") | Some("flac") | Some("aiff") => PlaybackStrategy::NativePcm,
            _ => PlaybackStrategy::Unsupported,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PlaybackStrategy::DecodeStream => "decode-stream",
            PlaybackStrategy::ExternalPlayer => "external-player",
            PlaybackStrategy::NativePcm => "native-pcm",
            PlaybackStrategy::Unsupported => "unsupported",
        }
    }
}
