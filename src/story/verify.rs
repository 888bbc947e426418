use serde::Serialize;
use std::collections::HashSet;

use super::StoryDocument;

/// Structural problems a document may legitimately carry while it is being
/// built. Nothing here blocks publishing.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    DanglingLink { from: String, to: String },
    OrphanEvent { event: String, source: String },
    DuplicateScene { key: String },
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Issue::DanglingLink { from, to } => {
                write!(f, "scene '{from}' links to missing scene '{to}'")
            }
            Issue::OrphanEvent { event, source } => {
                write!(f, "event '{event}' belongs to missing scene '{source}'")
            }
            Issue::DuplicateScene { key } => write!(f, "scene key '{key}' appears more than once"),
        }
    }
}

pub fn verify(doc: &StoryDocument) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut keys = HashSet::new();
    for scene in &doc.scenes {
        if !keys.insert(scene.key.as_str()) {
            issues.push(Issue::DuplicateScene {
                key: scene.key.clone(),
            });
        }
    }
    for scene in &doc.scenes {
        for target in &scene.connections {
            if !keys.contains(target.as_str()) {
                issues.push(Issue::DanglingLink {
                    from: scene.key.clone(),
                    to: target.clone(),
                });
            }
        }
    }
    for event in &doc.events {
        if !keys.contains(event.source.as_str()) {
            issues.push(Issue::OrphanEvent {
                event: event.key.clone(),
                source: event.source.clone(),
            });
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::{Scene, StoryEvent, Trigger};

    #[test]
    fn clean_document_has_no_issues() {
        let mut doc = StoryDocument::new("Clean");
        doc.add_scene("a").add_event("a.jpg", Trigger::Autostart);
        doc.add_scene("b");
        doc.link("a", "b");
        assert!(verify(&doc).is_empty());
    }

    #[test]
    fn reports_dangling_links_and_orphan_events() {
        let mut doc = StoryDocument::new("Broken");
        let mut scene = Scene::new("a");
        scene.connections.push("ghost".into());
        doc.scenes.push(scene);
        doc.events.push(StoryEvent {
            key: "lost_1".into(),
            trigger: Trigger::After,
            source: "lost".into(),
            media: "lost.jpg".into(),
            attributes: Default::default(),
        });

        let issues = verify(&doc);
        assert_eq!(
            issues,
            vec![
                Issue::DanglingLink {
                    from: "a".into(),
                    to: "ghost".into()
                },
                Issue::OrphanEvent {
                    event: "lost_1".into(),
                    source: "lost".into()
                },
            ]
        );
        assert_eq!(issues[0].to_string(), "scene 'a' links to missing scene 'ghost'");
    }
}
