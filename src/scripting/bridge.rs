//! Host side of the story builder API.
//!
//! Scripts never hold document references. `create` hands out a small
//! integer handle into a table owned by the execution, and every other
//! bridge function takes that handle plus plain strings. Unknown handles and
//! missing (`nil`) arguments are silent no-ops, matching the document
//! model's own missing-context policy.

use mlua::{Lua, LuaSerdeExt};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::console::Responder;
use crate::story::media::planned_filename;
use crate::story::store::ArtifactStore;
use crate::story::{StoryDocument, Trigger};

pub const BRIDGE_GLOBAL: &str = "__story_bridge";

pub type Handle = u32;

/// Documents created during one execution, addressed by handle.
#[derive(Debug, Default)]
pub struct DocumentTable {
    docs: Vec<StoryDocument>,
    published: BTreeSet<usize>,
}

impl DocumentTable {
    pub fn create(&mut self, doc: StoryDocument) -> Handle {
        self.docs.push(doc);
        self.docs.len() as Handle
    }

    pub fn get(&self, handle: Handle) -> Option<&StoryDocument> {
        index(handle).and_then(|idx| self.docs.get(idx))
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut StoryDocument> {
        index(handle).and_then(|idx| self.docs.get_mut(idx))
    }

    pub fn mark_published(&mut self, handle: Handle) {
        if let Some(idx) = index(handle).filter(|idx| *idx < self.docs.len()) {
            self.published.insert(idx);
        }
    }

    pub fn is_published(&self, handle: Handle) -> bool {
        index(handle).is_some_and(|idx| self.published.contains(&idx))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn into_documents(self) -> Vec<StoryDocument> {
        self.docs
    }
}

fn index(handle: Handle) -> Option<usize> {
    (handle as usize).checked_sub(1)
}

/// A media generation requested by the script, performed after it returns.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingMedia {
    pub handle: Handle,
    pub prompt: String,
    pub template: String,
    pub file: String,
}

/// Mutable state shared by every bridge function of one execution.
#[derive(Debug, Default)]
pub struct BridgeState {
    pub documents: DocumentTable,
    pub pending: Vec<PendingMedia>,
}

pub type SharedState = Rc<RefCell<BridgeState>>;

/// Installs the bridge table as a global. The prelude captures it and
/// removes the global before any script code runs.
pub fn install(
    lua: &Lua,
    state: SharedState,
    artifacts: ArtifactStore,
    out: Responder,
) -> mlua::Result<()> {
    let bridge = lua.create_table()?;

    let log_out = out.clone();
    bridge.set(
        "log",
        lua.create_function(move |_lua, line: String| {
            debug!(line = %line, "script log");
            log_out.log(line);
            Ok(())
        })?,
    )?;

    let st = state.clone();
    let create_out = out.clone();
    bridge.set(
        "create",
        lua.create_function(move |_lua, (name, description): (String, Option<String>)| {
            let doc = StoryDocument::with_description(&name, description.unwrap_or_default());
            let handle = st.borrow_mut().documents.create(doc);
            create_out.log(format!("📖 Story created: {name}"));
            Ok(handle)
        })?,
    )?;

    let st = state.clone();
    let scene_out = out.clone();
    bridge.set(
        "add_scene",
        lua.create_function(move |_lua, (handle, key): (Handle, Option<String>)| {
            let Some(key) = key else {
                return Ok(());
            };
            if let Some(doc) = st.borrow_mut().documents.get_mut(handle) {
                doc.add_scene(&key);
                scene_out.log(format!("  📝 Added scene: {key}"));
            }
            Ok(())
        })?,
    )?;

    let st = state.clone();
    bridge.set(
        "set_text",
        lua.create_function(move |_lua, (handle, text): (Handle, Option<String>)| {
            let Some(text) = text else {
                return Ok(());
            };
            if let Some(doc) = st.borrow_mut().documents.get_mut(handle) {
                doc.set_text(&text);
            }
            Ok(())
        })?,
    )?;

    let st = state.clone();
    let event_out = out.clone();
    bridge.set(
        "add_event",
        lua.create_function(
            move |_lua, (handle, media, trigger): (Handle, Option<String>, Option<String>)| {
                let Some(media) = media else {
                    return Ok(());
                };
                let trigger = Trigger::parse(trigger.as_deref().unwrap_or("autostart"));
                if let Some(doc) = st.borrow_mut().documents.get_mut(handle) {
                    if doc.current_scene().is_some() {
                        doc.add_event(&media, trigger);
                        let label = match trigger {
                            Trigger::Autostart => "autostart",
                            Trigger::After => "after",
                        };
                        event_out.log(format!("  🎬 Added event: {media} ({label})"));
                    }
                }
                Ok(())
            },
        )?,
    )?;

    let st = state.clone();
    let link_out = out.clone();
    bridge.set(
        "link",
        lua.create_function(
            move |_lua, (handle, from, to): (Handle, Option<String>, Option<String>)| {
                let (Some(from), Some(to)) = (from, to) else {
                    return Ok(());
                };
                if let Some(doc) = st.borrow_mut().documents.get_mut(handle) {
                    let before = doc.scene(&from).map(|s| s.connections.len());
                    doc.link(&from, &to);
                    if doc.scene(&from).map(|s| s.connections.len()) != before {
                        link_out.log(format!("  🔗 Linked: {from} → {to}"));
                    }
                }
                Ok(())
            },
        )?,
    )?;

    let st = state.clone();
    bridge.set(
        "set_description",
        lua.create_function(move |_lua, (handle, description): (Handle, Option<String>)| {
            let Some(description) = description else {
                return Ok(());
            };
            if let Some(doc) = st.borrow_mut().documents.get_mut(handle) {
                doc.set_description(&description);
            }
            Ok(())
        })?,
    )?;

    let st = state.clone();
    bridge.set(
        "add_keyword",
        lua.create_function(move |_lua, (handle, keyword): (Handle, Option<String>)| {
            let Some(keyword) = keyword else {
                return Ok(());
            };
            if let Some(doc) = st.borrow_mut().documents.get_mut(handle) {
                doc.add_keyword(&keyword);
            }
            Ok(())
        })?,
    )?;

    let st = state.clone();
    bridge.set(
        "set_locked",
        lua.create_function(move |_lua, (handle, locked): (Handle, bool)| {
            if let Some(doc) = st.borrow_mut().documents.get_mut(handle) {
                doc.set_locked(locked);
            }
            Ok(())
        })?,
    )?;

    let st = state.clone();
    let media_out = out.clone();
    bridge.set(
        "queue_media",
        lua.create_function(
            move |_lua, (handle, prompt, template): (Handle, Option<String>, Option<String>)| {
                let Some(prompt) = prompt else {
                    return Ok(None);
                };
                let template = template.unwrap_or_else(|| "default".to_string());
                let file = planned_filename(&prompt);
                let mut state = st.borrow_mut();
                if state.documents.get(handle).is_none() {
                    return Ok(None);
                }
                media_out.log(format!(
                    "🎨 Queued media generation: {file} ({template} style)"
                ));
                state.pending.push(PendingMedia {
                    handle,
                    prompt,
                    template,
                    file: file.clone(),
                });
                Ok(Some(file))
            },
        )?,
    )?;

    let st = state;
    let publish_out = out;
    bridge.set(
        "publish",
        lua.create_function(move |lua, handle: Handle| {
            let mut state = st.borrow_mut();
            let Some(doc) = state.documents.get(handle) else {
                return lua.to_value(&serde_json::json!({
                    "success": false,
                    "error": format!("Unknown story handle: {handle}"),
                }));
            };
            publish_out.log(format!("✅ Publishing story: {}", doc.name));
            let reply = match artifacts.publish(doc) {
                Ok(summary) => {
                    publish_out.log(format!("   📊 Scenes: {}", summary.scenes));
                    publish_out.log(format!("   🎬 Events: {}", summary.events));
                    publish_out.log(format!("   🎨 Media: {}", summary.media));
                    publish_out.log(format!("   📂 Path: {}", summary.path));
                    for warning in &summary.warnings {
                        publish_out.log(format!("   ⚠️ {warning}"));
                    }
                    state.documents.mark_published(handle);
                    serde_json::json!({ "success": true, "story": summary })
                }
                Err(e) => {
                    warn!(handle, err = %e, "script publish failed");
                    publish_out.log(format!("❌ Failed to publish story: {e}"));
                    serde_json::json!({ "success": false, "error": e.to_string() })
                }
            };
            lua.to_value(&reply)
        })?,
    )?;

    lua.globals().set(BRIDGE_GLOBAL, bridge)
}
