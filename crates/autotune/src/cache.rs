//! Persistent record of the best configuration per device and problem.

use anyhow::Result;
use gemmtune_kernels::config::{KernelProfile, ProblemShape};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AutotuneCache {
    best: HashMap<String, KernelProfile>,
}

impl AutotuneCache {
    pub fn new() -> Self {
        Self {
            best: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.best.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best.is_empty()
    }

    pub fn get(&self, device: &str, shape: &ProblemShape) -> Option<&KernelProfile> {
        self.best.get(&cache_key(device, shape))
    }

    /// Store `profile` unless a faster one is already recorded.
    pub fn insert_if_faster(&mut self, device: &str, profile: KernelProfile) -> bool {
        let key = cache_key(device, &profile.configuration.shape);
        if let Some(existing) = self.best.get(&key) {
            if profile.average_time_us >= existing.average_time_us {
                return false;
            }
        }
        self.best.insert(key, profile);
        true
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read(path)?;
        let cache = serde_json::from_slice(&data)?;
        Ok(cache)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = serde_json::to_vec_pretty(self)?;
        fs::write(path, blob)?;
        Ok(())
    }
}

fn cache_key(device: &str, shape: &ProblemShape) -> String {
    let shape = serde_json::to_string(shape).unwrap_or_else(|_| "invalid-shape".to_string());
    format!("{device}/{shape}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemmtune_kernels::config::Configuration;

    fn profile(shape: ProblemShape, average_time_us: f64) -> KernelProfile {
        KernelProfile::new("tiled", Configuration::new(shape, vec![8, 4]), average_time_us)
    }

    #[test]
    fn keeps_the_faster_profile() {
        let shape = ProblemShape::square(64);
        let mut cache = AutotuneCache::new();
        assert!(cache.insert_if_faster("cpu0", profile(shape, 20.0)));
        assert!(!cache.insert_if_faster("cpu0", profile(shape, 25.0)));
        assert!(cache.insert_if_faster("cpu0", profile(shape, 15.0)));
        assert!(cache.insert_if_faster("cpu1", profile(shape, 90.0)));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("cpu0", &shape).unwrap().average_time_us, 15.0);
    }

    #[test]
    fn missing_file_loads_empty() -> Result<()> {
        let path = std::env::temp_dir().join(format!("gemmtune-missing-{}.json", std::process::id()));
        let cache = AutotuneCache::load_from_file(&path)?;
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn round_trips_through_disk() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("gemmtune-cache-{}", std::process::id()));
        let path = dir.join("best.json");
        let shape = ProblemShape::square(32);
        let mut cache = AutotuneCache::new();
        cache.insert_if_faster("cpu0", profile(shape, 12.5));
        cache.save_to_file(&path)?;

        let loaded = AutotuneCache::load_from_file(&path)?;
        assert_eq!(loaded.get("cpu0", &shape).unwrap().average_time_us, 12.5);
        fs::remove_dir_all(dir)?;
        Ok(())
    }
}
