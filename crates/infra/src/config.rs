//! Run configuration.
//!
//! Loaded from `STOCKWARDEN_*` environment variables with defaults matching
//! the marketplace's collection names.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_BATCH_CEILING;

/// Collection names read and written by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collections {
    pub orders: String,
    pub products: String,
    pub deliveries: String,
    /// Release journal: one document per order whose reservation was released.
    pub releases: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            orders: "orders".to_string(),
            products: "products".to_string(),
            deliveries: "deliveries".to_string(),
            releases: "reservation_releases".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
    #[error("collection names must be distinct: {0}")]
    DuplicateCollection(String),
}

impl ConfigError {
    fn invalid(key: &str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Reconciliation run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    pub collections: Collections,
    /// Pending orders older than this are released.
    pub pending_ttl: Duration,
    /// Requested operations per batch (capped by the store's ceiling).
    pub batch_size: usize,
    /// Plan and report only.
    pub dry_run: bool,
    /// Pause between batch commits.
    pub batch_pause: Duration,
    /// Write the JSON report here in addition to the log.
    pub report_path: Option<PathBuf>,
    /// Name for logging
    pub name: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            collections: Collections::default(),
            pending_ttl: Duration::from_secs(30 * 60),
            batch_size: DEFAULT_BATCH_CEILING,
            dry_run: false,
            batch_pause: Duration::ZERO,
            report_path: None,
            name: "stockwarden-reconcile".to_string(),
        }
    }
}

impl ReconcileConfig {
    pub fn with_collections(mut self, collections: Collections) -> Self {
        self.collections = collections;
        self
    }

    pub fn with_product_collection(mut self, name: impl Into<String>) -> Self {
        self.collections.products = name.into();
        self
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment-shaped).
    ///
    /// | key | default |
    /// |-----|---------|
    /// | `STOCKWARDEN_ORDERS_COLLECTION` | `orders` |
    /// | `STOCKWARDEN_PRODUCTS_COLLECTION` | `products` |
    /// | `STOCKWARDEN_DELIVERIES_COLLECTION` | `deliveries` |
    /// | `STOCKWARDEN_RELEASES_COLLECTION` | `reservation_releases` |
    /// | `STOCKWARDEN_PENDING_TTL_MINUTES` | `30` |
    /// | `STOCKWARDEN_BATCH_SIZE` | `500` |
    /// | `STOCKWARDEN_DRY_RUN` | `false` |
    /// | `STOCKWARDEN_BATCH_PAUSE_MS` | `0` |
    /// | `STOCKWARDEN_REPORT_PATH` | unset |
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("STOCKWARDEN_ORDERS_COLLECTION") {
            config.collections.orders = v;
        }
        if let Some(v) = get("STOCKWARDEN_PRODUCTS_COLLECTION") {
            config.collections.products = v;
        }
        if let Some(v) = get("STOCKWARDEN_DELIVERIES_COLLECTION") {
            config.collections.deliveries = v;
        }
        if let Some(v) = get("STOCKWARDEN_RELEASES_COLLECTION") {
            config.collections.releases = v;
        }
        if let Some(v) = get("STOCKWARDEN_PENDING_TTL_MINUTES") {
            let minutes: u64 = parse_number("STOCKWARDEN_PENDING_TTL_MINUTES", &v)?;
            config.pending_ttl = Duration::from_secs(minutes * 60);
        }
        if let Some(v) = get("STOCKWARDEN_BATCH_SIZE") {
            config.batch_size = parse_number("STOCKWARDEN_BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("STOCKWARDEN_DRY_RUN") {
            config.dry_run = parse_bool("STOCKWARDEN_DRY_RUN", &v)?;
        }
        if let Some(v) = get("STOCKWARDEN_BATCH_PAUSE_MS") {
            config.batch_pause =
                Duration::from_millis(parse_number("STOCKWARDEN_BATCH_PAUSE_MS", &v)?);
        }
        if let Some(v) = get("STOCKWARDEN_REPORT_PATH") {
            config.report_path = Some(PathBuf::from(v));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "0", "must be at least 1"));
        }
        if self.pending_ttl.is_zero() {
            return Err(ConfigError::invalid("pending_ttl", "0", "must be positive"));
        }

        let c = &self.collections;
        let names = [&c.orders, &c.products, &c.deliveries, &c.releases];
        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid("collections", "", "collection name is empty"));
            }
            if names[..i].contains(name) {
                return Err(ConfigError::DuplicateCollection((*name).clone()));
            }
        }
        Ok(())
    }

    /// Expiry threshold as a calendar duration.
    pub fn pending_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.pending_ttl).unwrap_or(chrono::Duration::MAX)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid(key, value, "expected a non-negative integer"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = ReconcileConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ReconcileConfig::default());
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.pending_ttl, Duration::from_secs(1800));
        assert!(!config.dry_run);
    }

    #[test]
    fn reads_overrides() {
        let config = ReconcileConfig::from_lookup(lookup(&[
            ("STOCKWARDEN_PRODUCTS_COLLECTION", "products_v2"),
            ("STOCKWARDEN_PENDING_TTL_MINUTES", "45"),
            ("STOCKWARDEN_BATCH_SIZE", "100"),
            ("STOCKWARDEN_DRY_RUN", "yes"),
            ("STOCKWARDEN_REPORT_PATH", "/tmp/report.json"),
        ]))
        .unwrap();

        assert_eq!(config.collections.products, "products_v2");
        assert_eq!(config.pending_ttl, Duration::from_secs(45 * 60));
        assert_eq!(config.batch_size, 100);
        assert!(config.dry_run);
        assert_eq!(config.report_path, Some(PathBuf::from("/tmp/report.json")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ReconcileConfig::from_lookup(lookup(&[("STOCKWARDEN_BATCH_SIZE", "lots")])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            ReconcileConfig::from_lookup(lookup(&[("STOCKWARDEN_BATCH_SIZE", "0")])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            ReconcileConfig::from_lookup(lookup(&[("STOCKWARDEN_DRY_RUN", "maybe")])),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn collections_must_be_distinct() {
        let config = ReconcileConfig::default().with_product_collection("orders");
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateCollection("orders".to_string()))
        );
    }
}
