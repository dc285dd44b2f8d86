//! Configuration for the engine runtime.
//!
//! Defaults can be overridden via environment variables:
//!
//! - `ENGINE_WAL_DIR`           (default: "./data/wal")
//! - `ENGINE_MAILBOX_SIZE`      (default: "4096")
//! - `ENGINE_BATCH_MAX`         (default: "256")
//! - `ENGINE_WAL_BUF_SIZE`      (default: 1 MiB)
//! - `ENGINE_OUTBOX_BUF_SIZE`   (default: 1 MiB)
//! - `ENGINE_PUBLISHER_POLL_MS` (default: "50")
//! - `ENGINE_EVENT_BUS_SIZE`    (default: "65536")
//! - `ENGINE_ENABLE_PUBLISHER`  (default: "true")
//! - `ENGINE_MAX_PAYLOAD`       (default: 4 MiB)
//!
//! A size of 0 falls back to its default.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use engine_wal::DEFAULT_MAX_PAYLOAD;

use crate::error::ConfigError;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding `<symbol>.wal`, `<symbol>.ev.wal`, `<symbol>.ev.cursor`.
    pub wal_dir: PathBuf,

    /// Bounded mailbox capacity per symbol; a full mailbox rejects with `Busy`.
    pub mailbox_size: usize,

    /// Most commands group-committed per WAL flush.
    pub batch_max: usize,

    pub wal_buf_size: usize,
    pub outbox_buf_size: usize,

    /// Fallback wake-up interval for publishers.
    pub publisher_poll: Duration,

    pub event_bus_size: usize,

    /// Start an outbox publisher per symbol.
    pub enable_publisher: bool,

    /// Largest record payload accepted when reading logs.
    pub max_payload: usize,
}

pub const DEFAULT_MAILBOX_SIZE: usize = 4096;
pub const DEFAULT_BATCH_MAX: usize = 256;
pub const DEFAULT_BUF_SIZE: usize = 1 << 20;
pub const DEFAULT_PUBLISHER_POLL_MS: u64 = 50;
pub const DEFAULT_EVENT_BUS_SIZE: usize = 65536;

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            wal_dir: PathBuf::from("./data/wal"),
            mailbox_size: DEFAULT_MAILBOX_SIZE,
            batch_max: DEFAULT_BATCH_MAX,
            wal_buf_size: DEFAULT_BUF_SIZE,
            outbox_buf_size: DEFAULT_BUF_SIZE,
            publisher_poll: Duration::from_millis(DEFAULT_PUBLISHER_POLL_MS),
            event_bus_size: DEFAULT_EVENT_BUS_SIZE,
            enable_publisher: true,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl EngineConfig {
    /// Construct an `EngineConfig` from environment variables, falling back
    /// to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = EngineConfig::default();

        let wal_dir = lookup("ENGINE_WAL_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(d.wal_dir);

        let poll_ms = size_or_default(&lookup, "ENGINE_PUBLISHER_POLL_MS", DEFAULT_PUBLISHER_POLL_MS)?;

        Ok(EngineConfig {
            wal_dir,
            mailbox_size: size_or_default(&lookup, "ENGINE_MAILBOX_SIZE", d.mailbox_size)?,
            batch_max: size_or_default(&lookup, "ENGINE_BATCH_MAX", d.batch_max)?,
            wal_buf_size: size_or_default(&lookup, "ENGINE_WAL_BUF_SIZE", d.wal_buf_size)?,
            outbox_buf_size: size_or_default(&lookup, "ENGINE_OUTBOX_BUF_SIZE", d.outbox_buf_size)?,
            publisher_poll: Duration::from_millis(poll_ms),
            event_bus_size: size_or_default(&lookup, "ENGINE_EVENT_BUS_SIZE", d.event_bus_size)?,
            enable_publisher: read_or_default(&lookup, "ENGINE_ENABLE_PUBLISHER", d.enable_publisher)?,
            max_payload: size_or_default(&lookup, "ENGINE_MAX_PAYLOAD", d.max_payload)?,
        })
    }
}

fn read_or_default<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(val) => val.trim().parse::<T>().map_err(|_| ConfigError::Invalid { key, value: val }),
        None => Ok(default),
    }
}

/// Like `read_or_default`, but 0 also means "use the default".
fn size_or_default<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Default + PartialEq + Copy,
{
    let v = read_or_default(lookup, key, default)?;
    Ok(if v == T::default() { default } else { v })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg.wal_dir, PathBuf::from("./data/wal"));
        assert_eq!(cfg.mailbox_size, 4096);
        assert_eq!(cfg.batch_max, 256);
        assert_eq!(cfg.publisher_poll, Duration::from_millis(50));
        assert_eq!(cfg.event_bus_size, 65536);
        assert!(cfg.enable_publisher);
        assert_eq!(cfg.max_payload, 4 << 20);
    }

    #[test]
    fn overrides_and_zero_fallback() {
        let cfg = from_pairs(&[
            ("ENGINE_WAL_DIR", "/tmp/x"),
            ("ENGINE_MAILBOX_SIZE", "8"),
            ("ENGINE_BATCH_MAX", "0"),
            ("ENGINE_ENABLE_PUBLISHER", "false"),
        ])
        .unwrap();
        assert_eq!(cfg.wal_dir, PathBuf::from("/tmp/x"));
        assert_eq!(cfg.mailbox_size, 8);
        assert_eq!(cfg.batch_max, 256);
        assert!(!cfg.enable_publisher);
    }

    #[test]
    fn explicit_zero_sizes_use_defaults() {
        let cfg = from_pairs(&[
            ("ENGINE_MAILBOX_SIZE", "0"),
            ("ENGINE_WAL_BUF_SIZE", "0"),
            ("ENGINE_PUBLISHER_POLL_MS", "0"),
            ("ENGINE_MAX_PAYLOAD", "1024"),
        ])
        .unwrap();
        assert_eq!(cfg.mailbox_size, DEFAULT_MAILBOX_SIZE);
        assert_eq!(cfg.wal_buf_size, DEFAULT_BUF_SIZE);
        assert_eq!(cfg.publisher_poll, Duration::from_millis(DEFAULT_PUBLISHER_POLL_MS));
        assert_eq!(cfg.max_payload, 1024);
    }

    #[test]
    fn malformed_value_is_an_error() {
        let err = from_pairs(&[("ENGINE_MAILBOX_SIZE", "-3")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ENGINE_MAILBOX_SIZE", .. }));
    }
}
