use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Value used by the flush thresholds to mean "never trigger on this".
pub const DISABLE_AUTO_FLUSH: i32 = -1;

/// Paged store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Capacity of every buffer allocated by the store, in bytes
    pub buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { buffer_size: 1024 }
    }
}

/// Flush thresholds for writer buffers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlushConfig {
    pub max_buffered_docs: i32,
    pub ram_buffer_size_mb: f64,
    pub max_buffered_delete_terms: i32,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            max_buffered_docs: DISABLE_AUTO_FLUSH,
            ram_buffer_size_mb: 16.0,
            max_buffered_delete_terms: DISABLE_AUTO_FLUSH,
        }
    }
}

impl FlushConfig {
    pub fn flush_on_doc_count(&self) -> bool {
        self.max_buffered_docs != DISABLE_AUTO_FLUSH
    }

    pub fn flush_on_ram(&self) -> bool {
        self.ram_buffer_size_mb != DISABLE_AUTO_FLUSH as f64
    }

    pub fn flush_on_delete_terms(&self) -> bool {
        self.max_buffered_delete_terms != DISABLE_AUTO_FLUSH
    }

    /// RAM limit in bytes, or `None` when RAM-triggered flushing is off
    pub fn ram_limit_bytes(&self) -> Option<u64> {
        self.flush_on_ram()
            .then(|| (self.ram_buffer_size_mb * 1024.0 * 1024.0) as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.flush_on_doc_count() && self.max_buffered_docs < 1 {
            return Err(StrataError::Config(format!(
                "max_buffered_docs must be at least 1 or disabled, got {}",
                self.max_buffered_docs
            )));
        }
        if self.flush_on_ram() && self.ram_buffer_size_mb <= 0.0 {
            return Err(StrataError::Config(format!(
                "ram_buffer_size_mb must be positive or disabled, got {}",
                self.ram_buffer_size_mb
            )));
        }
        if self.flush_on_delete_terms() && self.max_buffered_delete_terms < 1 {
            return Err(StrataError::Config(format!(
                "max_buffered_delete_terms must be at least 1 or disabled, got {}",
                self.max_buffered_delete_terms
            )));
        }
        if !self.flush_on_doc_count() && !self.flush_on_ram() {
            return Err(StrataError::Config(
                "at least one of max_buffered_docs and ram_buffer_size_mb must be enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Ordinal cache flavour
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Lru,
    Unbounded,
}

/// Ordinal cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub ordinal_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::Lru,
            ordinal_capacity: 4096,
        }
    }
}

/// Partition writer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriterConfig {
    /// How long `open` waits for the write lock
    pub lock_timeout_ms: u64,
    /// Number of in-memory buffers documents are sharded across
    pub buffer_shards: usize,
    /// Commit after every policy-triggered flush (suppressed in batch mode)
    pub auto_commit_on_flush: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 1000,
            buffer_shards: 4,
            auto_commit_on_flush: true,
        }
    }
}

/// Flush presets for different workloads
#[derive(Clone, Copy, Debug)]
pub enum FlushProfile {
    LowLatency,
    Balanced,
    Bulk,
}

impl FlushProfile {
    pub fn ram_buffer_size_mb(&self) -> f64 {
        match self {
            FlushProfile::LowLatency => 4.0,
            FlushProfile::Balanced => 16.0,
            FlushProfile::Bulk => 256.0,
        }
    }

    pub fn max_buffered_docs(&self) -> i32 {
        match self {
            FlushProfile::LowLatency => 1_000,
            FlushProfile::Balanced => DISABLE_AUTO_FLUSH,
            FlushProfile::Bulk => DISABLE_AUTO_FLUSH,
        }
    }

    pub fn apply_to(&self, config: &mut StrataConfig) {
        config.flush.ram_buffer_size_mb = self.ram_buffer_size_mb();
        config.flush.max_buffered_docs = self.max_buffered_docs();
        // Bulk loads commit once at the end
        config.writer.auto_commit_on_flush = !matches!(self, FlushProfile::Bulk);
    }
}

impl std::str::FromStr for FlushProfile {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low-latency" | "low_latency" => Ok(FlushProfile::LowLatency),
            "balanced" => Ok(FlushProfile::Balanced),
            "bulk" => Ok(FlushProfile::Bulk),
            other => Err(StrataError::Config(format!("unknown flush profile '{}'", other))),
        }
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    pub store: StoreConfig,
    pub flush: FlushConfig,
    pub cache: CacheConfig,
    pub writer: WriterConfig,
}

impl StrataConfig {
    /// Build a configuration from a flat key/value map.
    ///
    /// Keys are either dotted (`flush.max_buffered_docs`) or the camel-case
    /// option names (`maxBufferedDocs`, `ramBufferSizeMB`,
    /// `maxBufferedDeleteTerms`). Missing keys keep their defaults.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        // The profile is the base; explicit options override it
        if let Some(value) = map.get("profile") {
            let profile: FlushProfile = value.trim().parse()?;
            profile.apply_to(&mut config);
        }
        let mut keys: Vec<_> = map.keys().filter(|k| k.as_str() != "profile").collect();
        keys.sort();

        for key in keys {
            let value = map[key].trim();
            match key.as_str() {
                "store.buffer_size" | "bufferSize" => {
                    config.store.buffer_size = parse(key, value)?;
                }
                "flush.max_buffered_docs" | "maxBufferedDocs" => {
                    config.flush.max_buffered_docs = parse(key, value)?;
                }
                "flush.ram_buffer_size_mb" | "ramBufferSizeMB" => {
                    config.flush.ram_buffer_size_mb = parse(key, value)?;
                }
                "flush.max_buffered_delete_terms" | "maxBufferedDeleteTerms" => {
                    config.flush.max_buffered_delete_terms = parse(key, value)?;
                }
                "cache.kind" => {
                    config.cache.kind = match value.to_lowercase().as_str() {
                        "lru" => CacheKind::Lru,
                        "unbounded" => CacheKind::Unbounded,
                        other => {
                            return Err(StrataError::Config(format!(
                                "unknown cache kind '{}'",
                                other
                            )))
                        }
                    };
                }
                "cache.ordinal_capacity" => {
                    config.cache.ordinal_capacity = parse(key, value)?;
                }
                "writer.lock_timeout_ms" => {
                    config.writer.lock_timeout_ms = parse(key, value)?;
                }
                "writer.buffer_shards" => {
                    config.writer.buffer_shards = parse(key, value)?;
                }
                "writer.auto_commit_on_flush" => {
                    config.writer.auto_commit_on_flush = parse(key, value)?;
                }
                other => {
                    return Err(StrataError::Config(format!(
                        "unrecognized option '{}'",
                        other
                    )))
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a flat JSON object of scalars into a configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut map = HashMap::with_capacity(object.len());
        for (key, value) in object {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(StrataError::Config(format!(
                        "option '{}' must be a scalar, got {}",
                        key, other
                    )))
                }
            };
            map.insert(key, value);
        }
        Self::from_map(&map)
    }

    /// Apply a flush profile to this configuration
    pub fn with_profile(mut self, profile: FlushProfile) -> Self {
        profile.apply_to(&mut self);
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.store.buffer_size = buffer_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.buffer_size == 0 {
            return Err(StrataError::Config("buffer_size must be positive".to_string()));
        }
        if self.writer.buffer_shards == 0 {
            return Err(StrataError::Config("buffer_shards must be positive".to_string()));
        }
        if self.cache.kind == CacheKind::Lru && self.cache.ordinal_capacity == 0 {
            return Err(StrataError::Config(
                "ordinal_capacity must be positive for an lru cache".to_string(),
            ));
        }
        self.flush.validate()
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| StrataError::Config(format!("invalid value '{}' for '{}': {}", value, key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_configs() {
        let config = StrataConfig::default();
        assert_eq!(config.store.buffer_size, 1024);
        assert!(!config.flush.flush_on_doc_count());
        assert!(config.flush.flush_on_ram());
        assert_eq!(config.flush.ram_limit_bytes(), Some(16 * 1024 * 1024));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_map_accepts_both_key_styles() {
        let config = StrataConfig::from_map(&map(&[
            ("maxBufferedDocs", "2"),
            ("ramBufferSizeMB", "-1"),
            ("flush.max_buffered_delete_terms", "10"),
            ("store.buffer_size", "3"),
        ]))
        .unwrap();

        assert_eq!(config.flush.max_buffered_docs, 2);
        assert!(!config.flush.flush_on_ram());
        assert_eq!(config.flush.ram_limit_bytes(), None);
        assert_eq!(config.flush.max_buffered_delete_terms, 10);
        assert_eq!(config.store.buffer_size, 3);
    }

    #[test]
    fn test_from_map_rejects_bad_input() {
        assert!(matches!(
            StrataConfig::from_map(&map(&[("nope", "1")])),
            Err(StrataError::Config(_))
        ));
        assert!(matches!(
            StrataConfig::from_map(&map(&[("maxBufferedDocs", "two")])),
            Err(StrataError::Config(_))
        ));
        // Both triggers disabled
        assert!(matches!(
            StrataConfig::from_map(&map(&[("ramBufferSizeMB", "-1")])),
            Err(StrataError::Config(_))
        ));
    }

    #[test]
    fn test_from_json() {
        let config = StrataConfig::from_json_str(
            r#"{"maxBufferedDocs": 100, "cache.kind": "unbounded", "writer.auto_commit_on_flush": false}"#,
        )
        .unwrap();
        assert_eq!(config.flush.max_buffered_docs, 100);
        assert_eq!(config.cache.kind, CacheKind::Unbounded);
        assert!(!config.writer.auto_commit_on_flush);

        assert!(StrataConfig::from_json_str(r#"{"maxBufferedDocs": [1]}"#).is_err());
    }

    #[test]
    fn test_profiles() {
        let config = StrataConfig::default().with_profile(FlushProfile::Bulk);
        assert_eq!(config.flush.ram_buffer_size_mb, 256.0);
        assert!(!config.writer.auto_commit_on_flush);

        let config = StrataConfig::default().with_profile(FlushProfile::LowLatency);
        assert_eq!(config.flush.max_buffered_docs, 1_000);

        assert!("durable".parse::<FlushProfile>().is_err());
    }

    #[test]
    fn test_explicit_options_override_profile() {
        let config = StrataConfig::from_map(&map(&[
            ("maxBufferedDocs", "2"),
            ("profile", "bulk"),
            ("writer.auto_commit_on_flush", "true"),
        ]))
        .unwrap();
        assert_eq!(config.flush.max_buffered_docs, 2);
        assert_eq!(config.flush.ram_buffer_size_mb, 256.0);
        assert!(config.writer.auto_commit_on_flush);

        let config = StrataConfig::from_map(&map(&[
            ("profile", "low-latency"),
            ("ramBufferSizeMB", "8"),
        ]))
        .unwrap();
        assert_eq!(config.flush.ram_buffer_size_mb, 8.0);
        assert_eq!(config.flush.max_buffered_docs, 1_000);
    }
}
