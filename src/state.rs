use crate::config::Config;
use crate::pipeline::elevation::ElevationSource;
use crate::types::activity::Activity;
use dashmap::DashMap;
use std::sync::Arc;

/// Where activities live between requests.
pub trait ActivityStore: Send + Sync {
    fn find(&self, id: &str) -> Option<Activity>;
    fn save(&self, activity: Activity) -> Activity;
    fn delete(&self, id: &str) -> bool;
    fn list_for_user(&self, user_id: &str) -> Vec<Activity>;
}

/// Archive of original uploads, by file name.
pub trait BlobStore: Send + Sync {
    fn put(&self, name: &str, bytes: Vec<u8>);
    fn get(&self, name: &str) -> Option<Vec<u8>>;
}

#[derive(Default)]
pub struct InMemoryActivityStore {
    activities: DashMap<String, Activity>,
}

impl ActivityStore for InMemoryActivityStore {
    fn find(&self, id: &str) -> Option<Activity> {
        self.activities.get(id).map(|entry| entry.value().clone())
    }

    fn save(&self, activity: Activity) -> Activity {
        self.activities.insert(activity.id.clone(), activity.clone());
        activity
    }

    fn delete(&self, id: &str) -> bool {
        self.activities.remove(id).is_some()
    }

    fn list_for_user(&self, user_id: &str) -> Vec<Activity> {
        let mut activities: Vec<Activity> = self
            .activities
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        activities.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        activities
    }
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, name: &str, bytes: Vec<u8>) {
        self.blobs.insert(name.to_string(), bytes);
    }

    fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.get(name).map(|entry| entry.value().clone())
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    activities: Arc<dyn ActivityStore>,
    blobs: Arc<dyn BlobStore>,
    elevation: ElevationSource,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let elevation = ElevationSource::from_config(&config);
        Self::with_parts(
            config,
            Arc::new(InMemoryActivityStore::default()),
            Arc::new(InMemoryBlobStore::default()),
            elevation,
        )
    }

    pub fn with_parts(
        config: Config,
        activities: Arc<dyn ActivityStore>,
        blobs: Arc<dyn BlobStore>,
        elevation: ElevationSource,
    ) -> Self {
        Self {
            config: Arc::new(config),
            activities,
            blobs,
            elevation,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn activities(&self) -> &dyn ActivityStore {
        self.activities.as_ref()
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    pub fn elevation(&self) -> &ElevationSource {
        &self.elevation
    }

    pub fn save(&self, activity: Activity) -> Activity {
        let saved = self.activities.save(activity);
        tracing::info!(
            "Saved activity {} ({} laps, {} points, {:.2} km)",
            saved.id,
            saved.laps.len(),
            saved.point_count(),
            saved.total_distance() / 1000.0
        );
        saved
    }
}
