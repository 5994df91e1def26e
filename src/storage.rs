//! Artifact persistence for sightings.
//!
//! Every event owns up to three sibling files sharing one stem:
//! `{out}/{YYYYMMDD}/{stem}.m4v` (later `.mp4`), `.jpg` and `.json`.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::frame::Frame;

pub const VIDEO_STAGING_EXT: &str = "m4v";
pub const VIDEO_FINAL_EXT: &str = "mp4";
pub const IMAGE_EXT: &str = "jpg";
pub const METADATA_EXT: &str = "json";

/// Day directory plus file stem.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub day: String,
    pub stem: String,
}

impl ArtifactKey {
    pub fn new(started_at: NaiveDateTime, stem: impl Into<String>) -> Self {
        Self {
            day: started_at.format("%Y%m%d").to_string(),
            stem: stem.into(),
        }
    }

    pub fn file_name(&self, ext: &str) -> String {
        format!("{}.{}", self.stem, ext)
    }

    pub fn relative_path(&self, ext: &str) -> PathBuf {
        Path::new(&self.day).join(self.file_name(ext))
    }
}

/// Parts of an event stem: `{YYYYmmdd_HHMMSS_mmm}_{class}_x{count}[_{direction}]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedIdentity {
    pub timestamp: String,
    pub class: String,
    pub count: u32,
    pub direction: Option<u32>,
}

pub fn parse_identity(stem: &str) -> Result<ParsedIdentity> {
    static IDENTITY_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = IDENTITY_RE.get_or_init(|| {
        regex::Regex::new(
            r"^(?P<ts>\d{8}_\d{6}_\d{3})_(?P<class>[A-Za-z0-9_-]+?)_x(?P<count>\d+)(?:_(?P<dir>\d{1,3}))?$",
        )
        .unwrap()
    });
    let caps = re
        .captures(stem)
        .ok_or_else(|| anyhow!("not an event identity: {}", stem))?;
    let count = caps["count"]
        .parse()
        .map_err(|_| anyhow!("event identity count out of range: {}", stem))?;
    let direction = match caps.name("dir") {
        Some(dir) => Some(
            dir.as_str()
                .parse()
                .map_err(|_| anyhow!("event identity direction out of range: {}", stem))?,
        ),
        None => None,
    };
    Ok(ParsedIdentity {
        timestamp: caps["ts"].to_string(),
        class: caps["class"].to_string(),
        count,
        direction,
    })
}

pub trait EventStore: Send {
    /// Where the recorder should write while the event is in progress.
    fn staging_video_path(&mut self, key: &ArtifactKey) -> Result<PathBuf>;

    /// Move a closed recording to its final stem. Returns the new path.
    fn promote_video(&mut self, staged: &Path, key: &ArtifactKey) -> Result<PathBuf>;

    fn save_image(&mut self, key: &ArtifactKey, frame: &Frame) -> Result<PathBuf>;

    fn save_metadata(&mut self, key: &ArtifactKey, metadata: &serde_json::Value) -> Result<PathBuf>;

    /// Delete everything written for `key`, plus a staged recording if any.
    fn discard(&mut self, key: &ArtifactKey, staged_video: Option<&Path>) -> Result<()>;
}

// -------------------- Filesystem --------------------

pub struct FilesystemEventStore {
    root: PathBuf,
}

impl FilesystemEventStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn day_dir(&self, key: &ArtifactKey) -> Result<PathBuf> {
        let dir = self.root.join(&key.day);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(dir)
    }

    fn path_for(&self, key: &ArtifactKey, ext: &str) -> Result<PathBuf> {
        Ok(self.day_dir(key)?.join(key.file_name(ext)))
    }
}

impl EventStore for FilesystemEventStore {
    fn staging_video_path(&mut self, key: &ArtifactKey) -> Result<PathBuf> {
        self.path_for(key, VIDEO_STAGING_EXT)
    }

    fn promote_video(&mut self, staged: &Path, key: &ArtifactKey) -> Result<PathBuf> {
        let target = self.path_for(key, VIDEO_STAGING_EXT)?;
        if staged != target {
            std::fs::rename(staged, &target).with_context(|| {
                format!(
                    "failed to rename {} to {}",
                    staged.display(),
                    target.display()
                )
            })?;
        }
        log::info!("video saved as {}", target.display());
        Ok(target)
    }

    fn save_image(&mut self, key: &ArtifactKey, frame: &Frame) -> Result<PathBuf> {
        let path = self.path_for(key, IMAGE_EXT)?;
        image::save_buffer_with_format(
            &path,
            frame.pixels(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgb8,
            image::ImageFormat::Jpeg,
        )
        .with_context(|| format!("failed to write image {}", path.display()))?;
        log::info!("image saved as {}", path.display());
        Ok(path)
    }

    fn save_metadata(&mut self, key: &ArtifactKey, metadata: &serde_json::Value) -> Result<PathBuf> {
        let path = self.path_for(key, METADATA_EXT)?;
        let json = serde_json::to_vec(metadata)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write metadata {}", path.display()))?;
        log::info!("metadata saved as {}", path.display());
        Ok(path)
    }

    fn discard(&mut self, key: &ArtifactKey, staged_video: Option<&Path>) -> Result<()> {
        let dir = self.root.join(&key.day);
        let mut targets: Vec<PathBuf> = [VIDEO_STAGING_EXT, VIDEO_FINAL_EXT, IMAGE_EXT, METADATA_EXT]
            .iter()
            .map(|ext| dir.join(key.file_name(ext)))
            .collect();
        if let Some(staged) = staged_video {
            targets.push(staged.to_path_buf());
        }
        for path in targets {
            match std::fs::remove_file(&path) {
                Ok(()) => log::info!("deleted {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(anyhow!("failed to delete {}: {}", path.display(), e));
                }
            }
        }
        Ok(())
    }
}

// -------------------- In-memory --------------------

/// What an in-memory store has kept, keyed by `day/stem.ext`.
#[derive(Clone, Debug, Default)]
pub struct StoredArtifacts {
    pub videos: Vec<PathBuf>,
    pub images: BTreeMap<PathBuf, (u32, u32)>,
    pub metadata: BTreeMap<PathBuf, serde_json::Value>,
    pub discarded: Vec<ArtifactKey>,
}

/// Store that keeps artifacts in memory. Clones share state, so a test can
/// hand one clone to the watcher and inspect another.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventStore {
    inner: Arc<Mutex<StoredArtifacts>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StoredArtifacts {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut StoredArtifacts) -> T) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("in-memory event store poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl EventStore for InMemoryEventStore {
    fn staging_video_path(&mut self, key: &ArtifactKey) -> Result<PathBuf> {
        Ok(key.relative_path(VIDEO_STAGING_EXT))
    }

    fn promote_video(&mut self, _staged: &Path, key: &ArtifactKey) -> Result<PathBuf> {
        let path = key.relative_path(VIDEO_STAGING_EXT);
        self.with(|s| s.videos.push(path.clone()))?;
        Ok(path)
    }

    fn save_image(&mut self, key: &ArtifactKey, frame: &Frame) -> Result<PathBuf> {
        let path = key.relative_path(IMAGE_EXT);
        self.with(|s| {
            s.images
                .insert(path.clone(), (frame.width(), frame.height()))
        })?;
        Ok(path)
    }

    fn save_metadata(&mut self, key: &ArtifactKey, metadata: &serde_json::Value) -> Result<PathBuf> {
        let path = key.relative_path(METADATA_EXT);
        self.with(|s| s.metadata.insert(path.clone(), metadata.clone()))?;
        Ok(path)
    }

    fn discard(&mut self, key: &ArtifactKey, _staged_video: Option<&Path>) -> Result<()> {
        self.with(|s| {
            let prefix = Path::new(&key.day).join(&key.stem);
            let owned = |p: &PathBuf| p.with_extension("") == prefix;
            s.videos.retain(|p| !owned(p));
            s.images.retain(|p, _| !owned(p));
            s.metadata.retain(|p, _| !owned(p));
            s.discarded.push(key.clone());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key(stem: &str) -> ArtifactKey {
        let start = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        ArtifactKey::new(start, stem)
    }

    #[test]
    fn key_uses_start_day() {
        let k = key("20250601_235959_000_dog_x1");
        assert_eq!(k.day, "20250601");
        assert_eq!(
            k.relative_path("json"),
            PathBuf::from("20250601/20250601_235959_000_dog_x1.json")
        );
    }

    #[test]
    fn parses_identities() {
        let plain = parse_identity("20250601_120000_123_dog_x2").unwrap();
        assert_eq!(plain.class, "dog");
        assert_eq!(plain.count, 2);
        assert_eq!(plain.direction, None);

        let directed = parse_identity("20250601_120000_123_pet_dog_x1_270").unwrap();
        assert_eq!(directed.class, "pet_dog");
        assert_eq!(directed.direction, Some(270));

        assert!(parse_identity("20250601_moving_truck").is_err());
    }

    #[test]
    fn filesystem_store_writes_and_discards() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FilesystemEventStore::new(dir.path());
        let staged_key = key("20250601_235959_000_dog");
        let final_key = key("20250601_235959_000_dog_x1");

        let staged = store.staging_video_path(&staged_key).unwrap();
        std::fs::write(&staged, b"fake video").unwrap();
        let promoted = store.promote_video(&staged, &final_key).unwrap();
        assert!(promoted.exists());
        assert!(!staged.exists());

        let image = store
            .save_image(&final_key, &Frame::filled(8, 8, [200, 10, 10]))
            .unwrap();
        assert!(image.exists());
        let meta = store
            .save_metadata(&final_key, &serde_json::json!({"class": "dog"}))
            .unwrap();
        let reread: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&meta).unwrap()).unwrap();
        assert_eq!(reread["class"], "dog");

        store.discard(&final_key, None).unwrap();
        assert!(!promoted.exists());
        assert!(!image.exists());
        assert!(!meta.exists());
    }

    #[test]
    fn in_memory_clones_share_state() {
        let store = InMemoryEventStore::new();
        let mut writer = store.clone();
        let k = key("20250601_235959_000_dog_x1");
        writer
            .save_metadata(&k, &serde_json::json!({"reviewed": false}))
            .unwrap();
        writer.save_image(&k, &Frame::filled(2, 2, [0, 0, 0])).unwrap();
        assert_eq!(store.snapshot().metadata.len(), 1);

        writer.discard(&k, None).unwrap();
        let snap = store.snapshot();
        assert!(snap.metadata.is_empty());
        assert!(snap.images.is_empty());
        assert_eq!(snap.discarded, vec![k]);
    }
}
