use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub vworld: VWorldConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `HISTO_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("HISTO_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            store: StoreConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            vworld: VWorldConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  store:      db_path={}, journal_mode={}, synchronous={}",
            self.store.db_path.display(),
            self.store.journal_mode.pragma_value(),
            self.store.synchronous.pragma_value()
        );
        tracing::info!("  scheduler:  schedule_path={}", self.scheduler.schedule_path.display());
        tracing::info!(
            "  vworld:     configured={}, timeout={}s",
            self.vworld.is_configured(),
            self.vworld.timeout_secs
        );
    }
}

// ── Store ─────────────────────────────────────────────────────

/// SQLite journal mode applied when the store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Readers are not blocked by an in-flight writer.
    #[default]
    Wal,
    Delete,
}

impl JournalMode {
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
        }
    }

    /// Parse a config value, case-insensitively. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wal" => Some(Self::Wal),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// SQLite `synchronous` level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Off,
    /// Trades durability of the last commits on power loss for throughput.
    #[default]
    Normal,
    Full,
}

impl SyncMode {
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "normal" => Some(Self::Normal),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub journal_mode: JournalMode,
    pub synchronous: SyncMode,
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        let journal_mode = profiled_env_opt(p, "HISTO_JOURNAL_MODE");
        let synchronous = profiled_env_opt(p, "HISTO_SYNCHRONOUS");
        Self {
            db_path: PathBuf::from(profiled_env_or(p, "HISTO_DB_PATH", "data/histo.db")),
            journal_mode: journal_mode
                .as_deref()
                .and_then(JournalMode::parse)
                .unwrap_or_default(),
            synchronous: synchronous.as_deref().and_then(SyncMode::parse).unwrap_or_default(),
            busy_timeout_ms: profiled_env_u64(p, "HISTO_BUSY_TIMEOUT_MS", 5_000),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/histo.db"),
            journal_mode: JournalMode::default(),
            synchronous: SyncMode::default(),
            busy_timeout_ms: 5_000,
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub schedule_path: PathBuf,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            schedule_path: PathBuf::from(profiled_env_or(
                p,
                "HISTO_SCHEDULE_PATH",
                "schedules/interval_schedule.json",
            )),
        }
    }
}

// ── VWorld address search ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VWorldConfig {
    pub api_key: Option<String>,
    pub domain: Option<String>,
    pub timeout_secs: u64,
}

impl VWorldConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_key: profiled_env_opt(p, "VWORLD_API_KEY"),
            domain: profiled_env_opt(p, "VWORLD_DOMAIN"),
            timeout_secs: profiled_env_u64(p, "VWORLD_TIMEOUT_SECS", 10),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_mode_parse() {
        assert_eq!(JournalMode::parse("WAL"), Some(JournalMode::Wal));
        assert_eq!(JournalMode::parse(" delete "), Some(JournalMode::Delete));
        assert_eq!(JournalMode::parse("memory"), None);
    }

    #[test]
    fn sync_mode_parse_and_pragma() {
        assert_eq!(SyncMode::parse("normal"), Some(SyncMode::Normal));
        assert_eq!(SyncMode::parse("FULL").map(SyncMode::pragma_value), Some("FULL"));
        assert_eq!(SyncMode::parse("extra"), None);
    }

    #[test]
    fn store_defaults_favor_wal_normal() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.journal_mode, JournalMode::Wal);
        assert_eq!(cfg.synchronous, SyncMode::Normal);
        assert_eq!(cfg.busy_timeout_ms, 5_000);
    }
}
