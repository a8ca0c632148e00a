use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use planter_types::{PlantProfile, ProfileId};
use tokio::sync::Mutex;

use crate::{sort_profiles, ProfileStore, StoreError};

/// Profiles kept as one JSON object (`id -> profile`) in a local file.
/// Every mutation rewrites the whole document.
pub struct JsonFileProfileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileProfileStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, PlantProfile>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| StoreError::Parse(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    async fn save(&self, all: &BTreeMap<String, PlantProfile>) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(all).map_err(|e| StoreError::Parse(e.to_string()))?;
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[async_trait]
impl ProfileStore for JsonFileProfileStore {
    async fn put(&self, profile: PlantProfile) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.load().await?;
        all.insert(profile.id.0.clone(), profile);
        self.save(&all).await
    }

    async fn get(&self, id: &ProfileId) -> Result<Option<PlantProfile>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(id.as_str()))
    }

    async fn remove(&self, id: &ProfileId) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.load().await?;
        let removed = all.remove(id.as_str()).is_some();
        if removed {
            self.save(&all).await?;
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<PlantProfile>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut all: Vec<PlantProfile> = self.load().await?.into_values().collect();
        sort_profiles(&mut all);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planter_types::{AlertMessages, CareProfile, ProfileKind};

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");

        let store = JsonFileProfileStore::open(&path);
        assert!(store.list().await.unwrap().is_empty());

        let profile = PlantProfile {
            id: ProfileId::real(),
            kind: ProfileKind::Real,
            name: "Mint".into(),
            care: CareProfile {
                moisture_percent: 55,
                min_temp: 12,
                max_temp: 27,
                watering_frequency: "every 3 days".into(),
                watering_description: "water at the base".into(),
            },
            image: None,
            messages: AlertMessages::default(),
        };
        store.put(profile.clone()).await.unwrap();

        let reopened = JsonFileProfileStore::open(&path);
        assert_eq!(reopened.get(&ProfileId::real()).await.unwrap(), Some(profile));
        assert!(reopened.remove(&ProfileId::real()).await.unwrap());
        assert!(reopened.get(&ProfileId::real()).await.unwrap().is_none());
    }
}
