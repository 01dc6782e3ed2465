use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::{is_supported_audio, Song, SongId};
use metadata::{extract, read_cover, TagInfo};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Every song indexed during this run, keyed by id.
///
/// Ids start at 1 and are handed out in indexing order. A catalog is filled
/// once during startup and then shared read-only (behind an `Arc`) by the
/// connection handlers.
#[derive(Debug)]
pub struct Catalog {
    songs: BTreeMap<SongId, Song>,
    next_id: SongId,
    options: IndexOptions,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IndexOptions {
    /// Embed the front cover as base64. Off by default; covers bloat `LIST`.
    pub include_cover_art: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub songs: usize,
    pub skipped_dirs: usize,
}

impl IndexStats {
    fn add(&mut self, other: IndexStats) {
        self.songs += other.songs;
        self.skipped_dirs += other.skipped_dirs;
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(IndexOptions::default())
    }
}

impl Catalog {
    pub fn new(options: IndexOptions) -> Self {
        Self {
            songs: BTreeMap::new(),
            next_id: 1,
            options,
        }
    }

    pub fn index_roots<P: AsRef<Path>>(&mut self, roots: &[P]) -> IndexStats {
        let mut stats = IndexStats::default();
        for root in roots {
            let root = root.as_ref();
            info!("Indexing folder {:?}", root);
            stats.add(self.index_dir(root));
        }
        stats
    }

    /// Walks `root` recursively and indexes every supported audio file.
    /// Entries that cannot be read (missing paths, permission errors) are
    /// skipped and counted; the walk carries on.
    pub fn index_dir(&mut self, root: &Path) -> IndexStats {
        let mut stats = IndexStats::default();
        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("Skipping unreadable entry under {:?}: {}", root, err);
                    stats.skipped_dirs += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if !is_supported_audio(entry.path()) {
                continue;
            }
            self.index_file(entry.path());
            stats.songs += 1;
        }
        if stats.skipped_dirs > 0 {
            warn!(
                "Skipped {} unreadable entries under {:?}",
                stats.skipped_dirs, root
            );
        }
        stats
    }

    /// Extracts metadata for one file and inserts it under the next id.
    pub fn index_file(&mut self, path: &Path) -> SongId {
        let path = absolute_path(path);
        let tags = extract(&path);
        let id = self.next_id;
        self.next_id += 1;

        let has_cover = tags.has_embedded_cover;
        let mut song = song_from_tags(id, &path, tags);
        if self.options.include_cover_art && has_cover {
            song.album_image_base64 = cover_base64(&path);
        }

        debug!(
            "Indexed ({}) {:?}: title={:?} artist={:?} album={:?} length={}s",
            id, path, song.title, song.artist, song.album, song.track_length
        );
        self.songs.insert(id, song);
        id
    }

    pub fn get(&self, id: SongId) -> Option<&Song> {
        self.songs.get(&id)
    }

    pub fn songs(&self) -> impl Iterator<Item = &Song> {
        self.songs.values()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Compact JSON array of every song, used for `LIST` responses.
    pub fn to_json_line(&self) -> Result<String, CatalogError> {
        let songs: Vec<&Song> = self.songs().collect();
        Ok(serde_json::to_string(&songs)?)
    }

    /// Writes a pretty-printed snapshot for inspection. Never read back.
    pub fn write_json(&self, path: &Path) -> Result<(), CatalogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let songs: Vec<&Song> = self.songs().collect();
        let contents = serde_json::to_string_pretty(&songs)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "io error: {}", err),
            CatalogError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Json(err)
    }
}

fn song_from_tags(id: SongId, path: &Path, tags: TagInfo) -> Song {
    let mut song = Song::with_defaults(id, path);
    if let Some(title) = tags.title {
        song.title = title;
    }
    if let Some(album) = tags.album {
        song.album = album;
    }
    if let Some(genre) = tags.genre {
        song.genre = genre;
    }
    if let Some(artist) = tags.artist {
        song.artist = artist;
    }
    if let Some(album_artist) = tags.album_artist {
        song.album_artist = album_artist;
    }
    if let Some(year) = tags.year {
        song.year = year.to_string();
    }
    if let Some(producer) = tags.producer {
        song.producers = producer;
    }
    if let Some(publisher) = tags.publisher {
        song.publisher = publisher;
    }
    song.track_length = tags.duration_secs.unwrap_or(0);
    song
}

fn cover_base64(path: &Path) -> String {
    match read_cover(path) {
        Ok(Some(cover)) => STANDARD.encode(&cover.data),
        Ok(None) => String::new(),
        Err(err) => {
            debug!("No cover for {:?}: {}", path, err);
            String::new()
        }
    }
}

fn absolute_path(path: &Path) -> PathBuf {
    match fs::canonicalize(path) {
        Ok(path) => path,
        Err(_) => path.to_path_buf(),
    }
}
