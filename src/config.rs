use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SLOTS: &str = "A1,A2,B1,B2,C1";

/// Process configuration, read once from `PARKD_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Slots created on start when the log holds none.
    pub seed_slots: Vec<String>,
    pub compact_threshold: u64,
    pub compact_every: Duration,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparsable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("PARKD_DATA_DIR").unwrap_or_else(|| "./data".into());
        let seed_slots = parse_slot_list(&lookup("PARKD_SLOTS").unwrap_or_else(|| DEFAULT_SLOTS.into()));
        let compact_threshold = lookup("PARKD_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let compact_every = lookup("PARKD_COMPACT_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));
        let metrics_port = lookup("PARKD_METRICS_PORT").and_then(|s| s.parse().ok());

        Self {
            data_dir: PathBuf::from(data_dir),
            seed_slots,
            compact_threshold,
            compact_every,
            metrics_port,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("parkd.wal")
    }
}

fn parse_slot_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
