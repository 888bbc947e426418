//! In-memory branching story documents.
//!
//! A [`StoryDocument`] is built incrementally, either by the sandboxed
//! builder API or by host code, and published to the [`store::ArtifactStore`]
//! as `story.json` under a directory named by its slug. Mutators are fluent
//! and never fail: operations that reference a missing scene do nothing.

pub mod media;
pub mod slug;
pub mod store;
pub mod verify;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use slug::slugify;

/// When an event fires relative to its scene.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Fires as soon as the scene is entered.
    #[default]
    Autostart,
    /// Fires after the preceding event completes.
    After,
}

impl Trigger {
    /// Anything other than `autostart` is treated as `after`.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("autostart") {
            Trigger::Autostart
        } else {
            Trigger::After
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoryEvent {
    pub key: String,
    #[serde(rename = "event")]
    pub trigger: Trigger,
    pub source: String,
    pub media: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Scene {
    pub key: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub events: Vec<StoryEvent>,
    #[serde(default)]
    pub connections: Vec<String>,
}

impl Scene {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: String::new(),
            events: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Adds `target` to the outgoing connections unless already present.
    pub fn connect(&mut self, target: &str) -> bool {
        if self.connections.iter().any(|c| c == target) {
            return false;
        }
        self.connections.push(target.to_string());
        true
    }
}

/// Provenance of one generated (or placeholder) media file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub prompt: String,
    pub template: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StoryDocument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub is_locked: bool,
    /// Every event of every scene, kept in step with `Scene::events`.
    #[serde(default)]
    pub events: Vec<StoryEvent>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub mindmap: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaRecord>,
    #[serde(skip)]
    current_scene: Option<usize>,
    #[serde(skip)]
    event_seq: u64,
}

impl StoryDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    pub fn scene(&self, key: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.key == key)
    }

    pub fn current_scene(&self) -> Option<&Scene> {
        self.current_scene.and_then(|idx| self.scenes.get(idx))
    }

    /// Starts a new empty scene and makes it current. Re-adding an existing
    /// key replaces that scene in place and drops its events from the flat
    /// event list.
    pub fn add_scene(&mut self, key: &str) -> &mut Self {
        let scene = Scene::new(key);
        match self.scenes.iter().position(|s| s.key == key) {
            Some(idx) => {
                self.events.retain(|e| e.source != key);
                self.scenes[idx] = scene;
                self.current_scene = Some(idx);
            }
            None => {
                self.scenes.push(scene);
                self.current_scene = Some(self.scenes.len() - 1);
            }
        }
        self
    }

    pub fn set_text(&mut self, text: &str) -> &mut Self {
        if let Some(scene) = self.current_scene_mut() {
            scene.text = text.to_string();
        }
        self
    }

    /// Attaches a media event to the current scene. Keys are
    /// `<scene>_<media stem>_<n>` with `n` counting up per document.
    pub fn add_event(&mut self, media: &str, trigger: Trigger) -> &mut Self {
        let Some(idx) = self.current_scene else {
            return self;
        };
        let Some(scene_key) = self.scenes.get(idx).map(|s| s.key.clone()) else {
            return self;
        };
        let stem = media_stem(media);
        let key = loop {
            self.event_seq += 1;
            let candidate = format!("{scene_key}_{stem}_{}", self.event_seq);
            // Documents loaded from disk restart the counter at zero.
            if !self.events.iter().any(|e| e.key == candidate) {
                break candidate;
            }
        };
        let event = StoryEvent {
            key,
            trigger,
            source: scene_key,
            media: media.to_string(),
            attributes: BTreeMap::new(),
        };
        self.scenes[idx].events.push(event.clone());
        self.events.push(event);
        self
    }

    /// Connects `from` to `to` when both scenes exist.
    pub fn link(&mut self, from: &str, to: &str) -> &mut Self {
        if self.scene(to).is_none() {
            return self;
        }
        if let Some(scene) = self.scenes.iter_mut().find(|s| s.key == from) {
            scene.connect(to);
        }
        self
    }

    pub fn set_description(&mut self, description: &str) -> &mut Self {
        self.description = description.to_string();
        self
    }

    pub fn add_keyword(&mut self, keyword: &str) -> &mut Self {
        let keyword = keyword.trim();
        if !keyword.is_empty() && !self.keywords.iter().any(|k| k == keyword) {
            self.keywords.push(keyword.to_string());
        }
        self
    }

    pub fn set_locked(&mut self, locked: bool) -> &mut Self {
        self.is_locked = locked;
        self
    }

    fn current_scene_mut(&mut self) -> Option<&mut Scene> {
        self.current_scene.and_then(|idx| self.scenes.get_mut(idx))
    }
}

fn media_stem(media: &str) -> &str {
    match media.rfind('.') {
        Some(dot) if dot > 0 => &media[..dot],
        _ => media,
    }
}
