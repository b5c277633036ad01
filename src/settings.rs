use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::limits::MAX_PER_SLOT_LIMIT;

/// Runtime configuration, read from `CHAIRBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub max_per_slot: u32,
    /// Freshness window for the catalog and schedule tables.
    pub config_ttl: Duration,
    /// Freshness window for the bookings table.
    pub bookings_ttl: Duration,
    /// Appends since the last compaction before the log is rewritten.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_per_slot: 1,
            config_ttl: Duration::from_secs(300),
            bookings_ttl: Duration::from_secs(60),
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key → value source. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let max_per_slot = match parsed("CHAIRBOOK_MAX_PER_SLOT") {
            Some(n) if (1..=u64::from(MAX_PER_SLOT_LIMIT)).contains(&n) => n as u32,
            Some(n) => {
                warn!("CHAIRBOOK_MAX_PER_SLOT={n} out of range, using {}", defaults.max_per_slot);
                defaults.max_per_slot
            }
            None => defaults.max_per_slot,
        };

        Self {
            data_dir: lookup("CHAIRBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_per_slot,
            config_ttl: parsed("CHAIRBOOK_CONFIG_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.config_ttl),
            bookings_ttl: parsed("CHAIRBOOK_BOOKINGS_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.bookings_ttl),
            compact_threshold: parsed("CHAIRBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: lookup("CHAIRBOOK_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("chairbook.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(settings(&[]), Settings::default());
    }

    #[test]
    fn reads_every_variable() {
        let s = settings(&[
            ("CHAIRBOOK_DATA_DIR", "/var/lib/chairbook"),
            ("CHAIRBOOK_MAX_PER_SLOT", "2"),
            ("CHAIRBOOK_CONFIG_TTL_SECS", "30"),
            ("CHAIRBOOK_BOOKINGS_TTL_SECS", "5"),
            ("CHAIRBOOK_COMPACT_THRESHOLD", "10"),
            ("CHAIRBOOK_METRICS_PORT", "9100"),
        ]);
        assert_eq!(s.wal_path(), PathBuf::from("/var/lib/chairbook/chairbook.wal"));
        assert_eq!(s.max_per_slot, 2);
        assert_eq!(s.config_ttl, Duration::from_secs(30));
        assert_eq!(s.bookings_ttl, Duration::from_secs(5));
        assert_eq!(s.compact_threshold, 10);
        assert_eq!(s.metrics_port, Some(9100));
    }

    #[test]
    fn bad_values_fall_back() {
        let s = settings(&[
            ("CHAIRBOOK_MAX_PER_SLOT", "0"),
            ("CHAIRBOOK_CONFIG_TTL_SECS", "soon"),
            ("CHAIRBOOK_METRICS_PORT", "99999"),
        ]);
        assert_eq!(s.max_per_slot, 1);
        assert_eq!(s.config_ttl, Duration::from_secs(300));
        assert_eq!(s.metrics_port, None);
    }
}
