//! File-system artifact store: one directory per slug holding `story.json`
//! plus any media files generated for the story.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::slug::is_valid_slug;
use super::verify::verify;
use super::StoryDocument;

pub const STORY_FILE: &str = "story.json";

const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "webm", "mp3", "wav", "ogg", "flac", "aac", "jpg", "jpeg", "png",
    "gif", "webp", "svg", "bmp", "pdf", "txt", "md",
];

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid slug: {0}")]
    InvalidSlug(String),

    #[error("Invalid media file name: {0}")]
    InvalidFileName(String),

    #[error("Story not found: {0}")]
    NotFound(String),
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PublishSummary {
    pub name: String,
    pub slug: String,
    pub path: String,
    pub scenes: usize,
    pub events: usize,
    pub media: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StorySummary {
    pub slug: String,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn story_dir(&self, slug: &str) -> Result<PathBuf, ArtifactError> {
        if !is_valid_slug(slug) {
            return Err(ArtifactError::InvalidSlug(slug.to_string()));
        }
        Ok(self.root.join(slug))
    }

    pub fn story_file(&self, slug: &str) -> Result<PathBuf, ArtifactError> {
        Ok(self.story_dir(slug)?.join(STORY_FILE))
    }

    /// Serializes `doc` to `<root>/<slug>/story.json` and materializes a
    /// placeholder for every recorded media file that is not on disk yet.
    pub fn publish(&self, doc: &StoryDocument) -> Result<PublishSummary, ArtifactError> {
        let slug = doc.slug();
        let dir = self.story_dir(&slug)?;
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
            info!(dir = %dir.display(), "created story directory");
        }
        let file = dir.join(STORY_FILE);
        let json = serde_json::to_string_pretty(doc)?;
        std::fs::write(&file, json)?;

        for item in &doc.media {
            let Ok(path) = media_path(&dir, &item.file) else {
                warn!(file = %item.file, "skipping media placeholder with unsafe name");
                continue;
            };
            if !path.exists() {
                let body = format!(
                    "# Placeholder for: {}\n# Template: {}",
                    item.prompt, item.template
                );
                std::fs::write(&path, body)?;
            }
        }

        let warnings = verify(doc).iter().map(ToString::to_string).collect();
        let summary = PublishSummary {
            name: doc.name.clone(),
            slug,
            path: file.to_string_lossy().to_string(),
            scenes: doc.scenes.len(),
            events: doc.events.len(),
            media: doc.media.len(),
            warnings,
        };
        info!(
            slug = %summary.slug,
            scenes = summary.scenes,
            events = summary.events,
            media = summary.media,
            "published story"
        );
        Ok(summary)
    }

    pub fn load(&self, slug: &str) -> Result<StoryDocument, ArtifactError> {
        let file = self.story_file(slug)?;
        if !file.exists() {
            return Err(ArtifactError::NotFound(slug.to_string()));
        }
        let contents = std::fs::read_to_string(&file)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn exists(&self, slug: &str) -> bool {
        self.story_file(slug).map(|f| f.exists()).unwrap_or(false)
    }

    /// Lists every directory under the root that holds a readable story.
    /// Unreadable entries are logged and skipped.
    pub fn list(&self) -> Result<Vec<StorySummary>, ArtifactError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root)?.flatten() {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let slug = entry.file_name().to_string_lossy().to_string();
            let file = entry.path().join(STORY_FILE);
            if !file.exists() {
                continue;
            }
            let parsed = std::fs::read_to_string(&file)
                .map_err(ArtifactError::from)
                .and_then(|s| {
                    serde_json::from_str::<serde_json::Value>(&s).map_err(ArtifactError::from)
                });
            match parsed {
                Ok(value) => out.push(StorySummary {
                    name: value
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or(&slug)
                        .to_string(),
                    description: value
                        .get("description")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                    slug,
                }),
                Err(e) => warn!(slug = %slug, err = %e, "failed to read story"),
            }
        }
        out.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(out)
    }

    pub fn delete(&self, slug: &str) -> Result<(), ArtifactError> {
        let dir = self.story_dir(slug)?;
        if !dir.exists() {
            return Err(ArtifactError::NotFound(slug.to_string()));
        }
        std::fs::remove_dir_all(&dir)?;
        info!(slug = %slug, "deleted story");
        Ok(())
    }

    pub fn write_media(&self, slug: &str, file: &str, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
        let dir = self.story_dir(slug)?;
        std::fs::create_dir_all(&dir)?;
        let path = media_path(&dir, file)?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn list_media(&self, slug: &str) -> Result<Vec<String>, ArtifactError> {
        let dir = self.story_dir(slug)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<String> = std::fs::read_dir(&dir)?
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let ext = Path::new(&name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_lowercase)?;
                (!name.starts_with('.') && MEDIA_EXTENSIONS.contains(&ext.as_str()))
                    .then_some(name)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

fn media_path(dir: &Path, file: &str) -> Result<PathBuf, ArtifactError> {
    let safe = !file.is_empty()
        && file != STORY_FILE
        && !file.starts_with('.')
        && !file.contains(['/', '\\'])
        && !file.contains("..");
    if !safe {
        return Err(ArtifactError::InvalidFileName(file.to_string()));
    }
    Ok(dir.join(file))
}
