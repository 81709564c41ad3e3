use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::artifact::RecordingArtifact;

pub const OBJECT_URL_PREFIX: &str = "blob:mic-check/";

/// Registry of transient playable URLs for completed recordings
#[derive(Clone, Default)]
pub struct ObjectUrls {
    entries: Arc<Mutex<HashMap<String, Arc<RecordingArtifact>>>>,
}

impl ObjectUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `artifact`; the entry lives as long as the returned guard
    pub fn create(&self, artifact: Arc<RecordingArtifact>) -> ObjectUrl {
        let id = Uuid::new_v4().to_string();
        self.entries.lock().insert(id.clone(), artifact);
        debug!("Object URL created: {}{}", OBJECT_URL_PREFIX, id);

        ObjectUrl {
            url: format!("{}{}", OBJECT_URL_PREFIX, id),
            id,
            registry: self.clone(),
        }
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<RecordingArtifact>> {
        self.resolve_id(url.strip_prefix(OBJECT_URL_PREFIX)?)
    }

    pub fn resolve_id(&self, id: &str) -> Option<Arc<RecordingArtifact>> {
        self.entries.lock().get(id).cloned()
    }

    /// Returns whether an entry was removed
    pub fn revoke(&self, url: &str) -> bool {
        let Some(id) = url.strip_prefix(OBJECT_URL_PREFIX) else {
            return false;
        };
        let removed = self.entries.lock().remove(id).is_some();
        if removed {
            debug!("Object URL revoked: {}", url);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Live object URL; revoked on drop
pub struct ObjectUrl {
    url: String,
    id: String,
    registry: ObjectUrls,
}

impl ObjectUrl {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObjectUrl").field(&self.url).finish()
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}
