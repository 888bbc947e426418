//! External collaborators: the relational community store, the
//! generative-media backend and the emoji avatar renderer.

pub mod avatar;
pub mod media;
pub mod memory_store;
pub mod rest_store;
pub mod store;

pub use avatar::AvatarRenderer;
pub use media::{DisabledMedia, FalClient, ImageRequest, MediaError, MediaGenerator};
pub use memory_store::MemoryStore;
pub use rest_store::RestStore;
pub use store::{CommunityStore, StoreError};
