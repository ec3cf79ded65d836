// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::fetch::encode_uri;
use super::{decode_blocking, url_extension, AssetCache, AssetError, Fetcher};
use crate::audio::AudioBuffer;
use crate::config::SampleConfig;

/// Identifies one decoded sample file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    pub machine: String,
    pub sound_type: String,
    pub variation: usize,
}

/// Directory of the available drum machine samples: a base URL plus, per
/// `"{machine}_{sound type}"` key, the relative paths of its variations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleMap {
    base: String,
    entries: BTreeMap<String, Vec<String>>,
}

impl SampleMap {
    /// Parses the JSON directory. Non-list values other than `_base` are
    /// kept as keys with no files.
    pub fn from_json(bytes: &[u8]) -> Result<SampleMap, AssetError> {
        let value: BTreeMap<String, Value> =
            serde_json::from_slice(bytes).map_err(AssetError::SampleMap)?;

        let mut map = SampleMap::default();
        for (key, value) in value {
            if key == "_base" {
                map.base = value.as_str().unwrap_or_default().to_string();
                continue;
            }
            let files = match value {
                Value::Array(files) => files
                    .into_iter()
                    .filter_map(|file| file.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            };
            map.entries.insert(key, files);
        }
        Ok(map)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn key(machine: &str, sound_type: &str) -> String {
        format!("{}_{}", machine, sound_type)
    }

    pub fn contains(&self, machine: &str, sound_type: &str) -> bool {
        self.entries.contains_key(&SampleMap::key(machine, sound_type))
    }

    pub fn files(&self, machine: &str, sound_type: &str) -> &[String] {
        self.entries
            .get(&SampleMap::key(machine, sound_type))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of `"{machine}_{sound}"` entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted, de-duplicated machine names.
    pub fn machines(&self) -> Vec<String> {
        self.entries
            .keys()
            .filter_map(|key| key.split('_').next())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn sound_types(&self, machine: &str) -> Vec<String> {
        let prefix = format!("{}_", machine);
        self.entries
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect()
    }

    /// Resolves a request to its cache key and URL. The variation is clamped
    /// to the last available file.
    pub fn resolve(
        &self,
        machine: &str,
        sound_type: &str,
        variation: usize,
    ) -> Result<(SampleKey, String), AssetError> {
        let files = self.files(machine, sound_type);
        let Some(last) = files.len().checked_sub(1) else {
            return Err(AssetError::MissingSample(SampleMap::key(machine, sound_type)));
        };
        let variation = variation.min(last);
        let url = format!("{}{}", self.base, encode_uri(&files[variation]));
        Ok((
            SampleKey {
                machine: machine.to_string(),
                sound_type: sound_type.to_string(),
                variation,
            },
            url,
        ))
    }
}

/// Loads and caches drum machine samples described by a remote sample map.
pub struct SampleLoader {
    fetcher: Arc<dyn Fetcher>,
    map_url: String,
    map: OnceCell<Option<Arc<SampleMap>>>,
    cache: AssetCache<SampleKey, AudioBuffer>,
}

impl SampleLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &SampleConfig) -> SampleLoader {
        SampleLoader {
            fetcher,
            map_url: config.map_url().to_string(),
            map: OnceCell::new(),
            cache: AssetCache::new(),
        }
    }

    /// Fetches the sample map. Only the first call fetches; a failed fetch
    /// leaves the loader permanently without samples. Returns whether the
    /// map is available.
    pub async fn init(&self) -> bool {
        self.map
            .get_or_init(|| async {
                match self.fetch_map().await {
                    Ok(map) => {
                        info!(url = %self.map_url, entries = map.len(), "Loaded sample map");
                        Some(Arc::new(map))
                    }
                    Err(e) => {
                        warn!(url = %self.map_url, err = %e, "Failed to load sample map, samples disabled");
                        None
                    }
                }
            })
            .await
            .is_some()
    }

    async fn fetch_map(&self) -> Result<SampleMap, AssetError> {
        let bytes = self.fetcher.fetch(&self.map_url).await?;
        SampleMap::from_json(&bytes)
    }

    /// True once the sample map has been loaded successfully.
    pub fn is_initialized(&self) -> bool {
        matches!(self.map.get(), Some(Some(_)))
    }

    pub fn map(&self) -> Option<&Arc<SampleMap>> {
        self.map.get().and_then(Option::as_ref)
    }

    pub fn has_samples(&self, machine: &str, sound_type: &str) -> bool {
        self.map()
            .is_some_and(|map| map.contains(machine, sound_type))
    }

    pub fn sample_count(&self, machine: &str, sound_type: &str) -> usize {
        self.map()
            .map(|map| map.files(machine, sound_type).len())
            .unwrap_or(0)
    }

    pub fn machines(&self) -> Vec<String> {
        self.map().map(|map| map.machines()).unwrap_or_default()
    }

    pub fn sound_types(&self, machine: &str) -> Vec<String> {
        self.map()
            .map(|map| map.sound_types(machine))
            .unwrap_or_default()
    }

    /// Returns an already decoded sample without fetching.
    pub fn cached(&self, machine: &str, sound_type: &str, variation: usize) -> Option<Arc<AudioBuffer>> {
        let (key, _) = self.map()?.resolve(machine, sound_type, variation).ok()?;
        self.cache.get(&key)
    }

    /// Loads a sample, serving it from the cache when possible. Any failure
    /// is logged and reported as `None`.
    pub async fn load_sample(
        &self,
        machine: &str,
        sound_type: &str,
        variation: usize,
    ) -> Option<Arc<AudioBuffer>> {
        let Some(map) = self.map() else {
            debug!(machine, sound_type, err = %AssetError::NotInitialized, "Sample unavailable");
            return None;
        };
        let (key, url) = match map.resolve(machine, sound_type, variation) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(err = %e, "Sample unavailable");
                return None;
            }
        };

        let fetcher = self.fetcher.clone();
        self.cache
            .get_or_load(key, || async move {
                match fetch_sample(fetcher.as_ref(), &url).await {
                    Ok(buffer) => {
                        info!(
                            url = %url,
                            channels = buffer.channel_count(),
                            sample_rate = buffer.sample_rate(),
                            duration_ms = (buffer.duration() * 1000.0) as u64,
                            "Sample loaded"
                        );
                        Some(buffer)
                    }
                    Err(e) => {
                        warn!(url = %url, err = %e, "Failed to load sample");
                        None
                    }
                }
            })
            .await
    }

    /// Loads the first variation of every sound of a machine concurrently.
    /// Returns how many loaded.
    pub async fn preload_machine(self: &Arc<Self>, machine: &str) -> usize {
        let mut loads = JoinSet::new();
        for sound_type in self.sound_types(machine) {
            let loader = self.clone();
            let machine = machine.to_string();
            loads.spawn(async move { loader.load_sample(&machine, &sound_type, 0).await.is_some() });
        }

        let mut loaded = 0;
        while let Some(result) = loads.join_next().await {
            if matches!(result, Ok(true)) {
                loaded += 1;
            }
        }
        info!(machine, loaded, "Preloaded machine");
        loaded
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Sample cache cleared");
    }

    /// Number of decoded samples held in memory.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

async fn fetch_sample(fetcher: &dyn Fetcher, url: &str) -> Result<AudioBuffer, AssetError> {
    let bytes = fetcher.fetch(url).await?;
    decode_blocking(bytes, url_extension(url)).await
}

impl std::fmt::Debug for SampleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleLoader")
            .field("map_url", &self.map_url)
            .field("initialized", &self.is_initialized())
            .field("cache_size", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{wav_bytes, MockFetcher};

    const MAP_URL: &str = "https://samples.test/map.json";

    fn sample_map() -> &'static str {
        r#"{
            "_base": "https://samples.test/kits/",
            "RolandTR808_bd": ["808/bd 0.wav", "808/bd1.wav"],
            "RolandTR808_sd": ["808/sd0.wav"],
            "RolandTR909_bd": ["909/bd0.wav"],
            "RolandTR909_hh": "not-a-list"
        }"#
    }

    fn fetcher() -> Arc<MockFetcher> {
        let fetcher = MockFetcher::new();
        fetcher.insert(MAP_URL, sample_map().as_bytes().to_vec());
        fetcher.insert(
            "https://samples.test/kits/808/bd%200.wav",
            wav_bytes(&[0.5; 128], 1, 44_100),
        );
        fetcher.insert(
            "https://samples.test/kits/808/bd1.wav",
            wav_bytes(&[0.25; 64], 1, 44_100),
        );
        fetcher.insert(
            "https://samples.test/kits/808/sd0.wav",
            wav_bytes(&[0.1; 32], 1, 44_100),
        );
        Arc::new(fetcher)
    }

    fn loader(fetcher: Arc<MockFetcher>) -> Arc<SampleLoader> {
        Arc::new(SampleLoader::new(fetcher, &SampleConfig::new(MAP_URL)))
    }

    #[test]
    fn test_sample_map() {
        let map = SampleMap::from_json(sample_map().as_bytes()).unwrap();
        assert_eq!(map.base(), "https://samples.test/kits/");
        assert_eq!(map.machines(), vec!["RolandTR808", "RolandTR909"]);
        assert_eq!(map.sound_types("RolandTR808"), vec!["bd", "sd"]);
        assert!(map.contains("RolandTR909", "hh"));
        assert!(map.files("RolandTR909", "hh").is_empty());

        let (key, url) = map.resolve("RolandTR808", "bd", 9).unwrap();
        assert_eq!(key.variation, 1);
        assert_eq!(url, "https://samples.test/kits/808/bd1.wav");

        let (_, url) = map.resolve("RolandTR808", "bd", 0).unwrap();
        assert_eq!(url, "https://samples.test/kits/808/bd%200.wav");

        assert!(matches!(
            map.resolve("RolandTR909", "hh", 0),
            Err(AssetError::MissingSample(_))
        ));
    }

    #[test]
    fn test_invalid_sample_map() {
        assert!(matches!(
            SampleMap::from_json(b"[1, 2]"),
            Err(AssetError::SampleMap(_))
        ));
    }

    #[tokio::test]
    async fn test_uninitialized_loader() {
        let loader = loader(fetcher());
        assert!(!loader.is_initialized());
        assert!(!loader.has_samples("RolandTR808", "bd"));
        assert!(loader.load_sample("RolandTR808", "bd", 0).await.is_none());
        assert!(loader.machines().is_empty());
    }

    #[tokio::test]
    async fn test_load_sample() {
        let _ = tracing_subscriber::fmt::try_init();
        let fetcher = fetcher();
        let loader = loader(fetcher.clone());
        assert!(loader.init().await);
        assert!(loader.init().await);
        assert_eq!(fetcher.calls(MAP_URL), 1);

        assert!(loader.has_samples("RolandTR808", "bd"));
        assert_eq!(loader.sample_count("RolandTR808", "bd"), 2);
        assert_eq!(loader.sample_count("RolandTR808", "cp"), 0);

        assert!(loader.cached("RolandTR808", "bd", 0).is_none());
        let buffer = loader.load_sample("RolandTR808", "bd", 0).await.unwrap();
        assert_eq!(buffer.frames(), 128);
        let cached = loader.cached("RolandTR808", "bd", 0).unwrap();
        assert!(Arc::ptr_eq(&buffer, &cached));

        loader.load_sample("RolandTR808", "bd", 0).await.unwrap();
        assert_eq!(fetcher.calls("https://samples.test/kits/808/bd%200.wav"), 1);
        assert_eq!(loader.cache_size(), 1);

        loader.clear_cache();
        assert_eq!(loader.cache_size(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_requests_fetch_once() {
        let fetcher = fetcher();
        fetcher.set_delay(std::time::Duration::from_millis(50));
        let loader = loader(fetcher.clone());
        assert!(loader.init().await);

        let a = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load_sample("RolandTR808", "sd", 0).await }
        });
        let b = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load_sample("RolandTR808", "sd", 0).await }
        });

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fetcher.calls("https://samples.test/kits/808/sd0.wav"), 1);
    }

    #[tokio::test]
    async fn test_missing_and_failed_samples() {
        let fetcher = fetcher();
        let loader = loader(fetcher.clone());
        loader.init().await;

        // Absent from the map: no fetch at all.
        assert!(loader.load_sample("LinnDrum", "bd", 0).await.is_none());
        // In the map but the file is missing: fetched, fails, retried next time.
        assert!(loader.load_sample("RolandTR909", "bd", 0).await.is_none());
        assert!(loader.load_sample("RolandTR909", "bd", 0).await.is_none());
        assert_eq!(fetcher.calls("https://samples.test/kits/909/bd0.wav"), 2);
        assert_eq!(loader.cache_size(), 0);
    }

    #[tokio::test]
    async fn test_failed_map_fetch() {
        let fetcher = Arc::new(MockFetcher::new());
        let loader = loader(fetcher.clone());
        assert!(!loader.init().await);
        assert!(!loader.init().await);
        assert_eq!(fetcher.calls(MAP_URL), 1);
        assert!(!loader.is_initialized());
        assert!(loader.load_sample("RolandTR808", "bd", 0).await.is_none());
    }

    #[tokio::test]
    async fn test_preload_machine() {
        let loader = loader(fetcher());
        loader.init().await;
        assert_eq!(loader.preload_machine("RolandTR808").await, 2);
        assert_eq!(loader.cache_size(), 2);
    }
}
