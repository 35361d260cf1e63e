use crate::light::Light;
use crate::types::{DeviceId, DiscoveredLight};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Concurrent map of known lights
///
/// Cheap to clone; every clone sees the same lights. Entries are never
/// removed, a light that stops answering stays listed with its last state.
#[derive(Clone, Default)]
pub struct Registry {
    lights: Arc<RwLock<HashMap<DeviceId, Arc<Light>>>>,
}

/// Outcome of [`Registry::upsert`]
pub struct Upsert {
    pub light: Arc<Light>,
    pub inserted: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Light>> {
        self.lights.read().await.get(id).cloned()
    }

    /// Snapshot of every light, in no particular order
    pub async fn list(&self) -> Vec<Arc<Light>> {
        self.lights.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.lights.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lights.read().await.is_empty()
    }

    /// Insert a newly found light or merge it into the existing entry
    pub async fn upsert(&self, found: DiscoveredLight) -> Upsert {
        let existing = self.get(&found.id).await;
        if let Some(light) = existing {
            light.merge(found).await;
            return Upsert { light, inserted: false };
        }

        let mut lights = self.lights.write().await;
        // Another writer may have won the race since the read above
        let raced = lights.get(&found.id).cloned();
        if let Some(light) = raced {
            drop(lights);
            light.merge(found).await;
            return Upsert { light, inserted: false };
        }

        tracing::info!("New light {} at {}", found.id, found.info.location);
        let light = Arc::new(Light::new(found));
        lights.insert(light.id().to_string(), light.clone());
        Upsert { light, inserted: true }
    }
}
