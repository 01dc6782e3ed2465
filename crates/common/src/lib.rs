use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod playback;
pub mod protocol;

pub type SongId = u32;

pub const UNKNOWN: &str = "Unknown";
pub const DEFAULT_PORT: u16 = 5555;
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aiff", "aac", "wma", "ogg"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub album: String,
    pub genre: String,
    pub file_path: String,
    #[serde(default = "unknown")]
    pub artist: String,
    #[serde(default = "unknown")]
    pub album_artist: String,
    #[serde(default = "unknown")]
    pub year: String,
    #[serde(default)]
    pub track_length: u32,
    #[serde(default = "unknown")]
    pub producers: String,
    #[serde(default = "unknown")]
    pub publisher: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub album_image_base64: String,
}

impl Song {
    /// A record carrying only the file-derived defaults.
    pub fn with_defaults(id: SongId, path: &Path) -> Self {
        let file_name = file_name_of(path);
        Self {
            id,
            title: file_name.clone(),
            album: unknown(),
            genre: unknown(),
            file_path: path.to_string_lossy().to_string(),
            artist: unknown(),
            album_artist: unknown(),
            year: unknown(),
            track_length: 0,
            producers: unknown(),
            publisher: unknown(),
            file_name,
            album_image_base64: String::new(),
        }
    }

    pub fn extension(&self) -> Option<String> {
        extension_of(Path::new(&self.file_path))
    }
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

pub fn is_supported_audio(path: &Path) -> bool {
    match extension_of(path) {
        Some(ext) => SUPPORTED_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{is_supported_audio, Song, UNKNOWN};
    use std::path::Path;

    #[test]
    fn supported_extensions_ignore_case() {
        assert!(is_supported_audio(Path::new("/music/a.MP3")));
        assert!(is_supported_audio(Path::new("b.Flac")));
        assert!(is_supported_audio(Path::new("c.aiff")));
        assert!(!is_supported_audio(Path::new("cover.jpg")));
        assert!(!is_supported_audio(Path::new("README")));
        assert!(!is_supported_audio(Path::new("mp3")));
    }

    #[test]
    fn defaults_use_file_name_as_title() {
        let song = Song::with_defaults(7, Path::new("/music/track.mp3"));
        assert_eq!(song.id, 7);
        assert_eq!(song.title, "track.mp3");
        assert_eq!(song.file_name, "track.mp3");
        assert_eq!(song.album, UNKNOWN);
        assert_eq!(song.genre, UNKNOWN);
        assert_eq!(song.track_length, 0);
        assert!(song.album_image_base64.is_empty());
    }

    #[test]
    fn serializes_camel_case_fields() {
        let song = Song::with_defaults(1, Path::new("/music/track.mp3"));
        let value = serde_json::to_value(&song).unwrap();
        assert_eq!(value["filePath"], "/music/track.mp3");
        assert_eq!(value["albumArtist"], UNKNOWN);
        assert_eq!(value["trackLength"], 0);
        assert_eq!(value["albumImageBase64"], "");
    }

    #[test]
    fn accepts_base_variant_objects() {
        let text = r#"{"id":3,"title":"t","album":"a","genre":"g","filePath":"/x.ogg"}"#;
        let song: Song = serde_json::from_str(text).unwrap();
        assert_eq!(song.artist, UNKNOWN);
        assert_eq!(song.extension().as_deref(), Some("ogg"));
    }
}
