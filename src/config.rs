//! Service settings.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If `SESSION_PLANNER_CONFIG` names a JSON file, read it over the defaults
//!    (missing keys keep their default)
//! 3. Apply `SESSION_PLANNER_*` environment overrides (highest priority)
//!
//! Invalid environment values are ignored with a warning.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "SESSION_PLANNER_CONFIG";

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: IpAddr,
    /// Plan API port.
    pub port: u16,
    /// Health and metrics port.
    pub health_port: u16,
    /// Catalog JSON file; the built-in catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
    /// Where the plan snapshot is persisted; kept in memory when unset.
    pub snapshot_path: Option<PathBuf>,
    /// Price of one session in minor currency units.
    pub unit_price_minor: u64,
    /// Session count of the pack a fresh plan starts with.
    pub default_pack: Option<u16>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            health_port: 8080,
            catalog_path: None,
            snapshot_path: None,
            unit_price_minor: 5000,
            default_pack: None,
        }
    }
}

impl Settings {
    pub fn api_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn health_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.health_port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == self.health_port {
            return Err(ConfigError::InvalidValue(format!(
                "API and health servers cannot share port {}",
                self.port
            )));
        }
        if self.default_pack == Some(0) {
            return Err(ConfigError::InvalidValue(
                "default pack must hold at least one session".into(),
            ));
        }
        Ok(())
    }
}

/// Load settings from the file named by `SESSION_PLANNER_CONFIG`, if any,
/// then apply environment overrides.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let path = read_env_string(CONFIG_ENV).map(PathBuf::from);
    load_settings_from_path(path.as_deref())
}

/// Load settings from `path` (or defaults) with environment overrides.
///
/// A path that does not exist is an error: it was asked for explicitly.
pub fn load_settings_from_path(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut settings = match path {
        Some(path) => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        }
        None => Settings::default(),
    };
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Apply `SESSION_PLANNER_*` overrides read through `lookup`.
pub fn apply_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) =
        read("SESSION_PLANNER_PORT").and_then(|v| checked_u16("SESSION_PLANNER_PORT", &v))
    {
        settings.port = v;
    }
    if let Some(v) = read("SESSION_PLANNER_HEALTH_PORT")
        .and_then(|v| checked_u16("SESSION_PLANNER_HEALTH_PORT", &v))
    {
        settings.health_port = v;
    }
    if let Some(v) = read("SESSION_PLANNER_CATALOG") {
        settings.catalog_path = Some(PathBuf::from(v));
    }
    if let Some(v) = read("SESSION_PLANNER_SNAPSHOT") {
        settings.snapshot_path = Some(PathBuf::from(v));
    }
    if let Some(v) = read("SESSION_PLANNER_UNIT_PRICE") {
        match parse_u64_range(&v, 0, 100_000_000) {
            Some(n) => settings.unit_price_minor = n,
            None => warn!(
                key = "SESSION_PLANNER_UNIT_PRICE",
                value = %v,
                "invalid u64 env var, ignoring"
            ),
        }
    }
    if let Some(v) = read("SESSION_PLANNER_DEFAULT_PACK")
        .and_then(|v| checked_u16("SESSION_PLANNER_DEFAULT_PACK", &v))
    {
        settings.default_pack = Some(v);
    }
}

/// Parse a positive `u16`, warning when the value is unusable.
fn checked_u16(name: &str, value: &str) -> Option<u16> {
    let result = parse_u16_range(value, 1, u16::MAX);
    if result.is_none() {
        warn!(key = name, value = %value, "invalid u16 env var, ignoring");
    }
    result
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.api_addr().port(), 3000);
        assert_eq!(settings.health_addr().port(), 8080);
    }

    #[test]
    fn test_overrides_applied() {
        let mut settings = Settings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("SESSION_PLANNER_PORT", "4000"),
                ("SESSION_PLANNER_SNAPSHOT", "/var/lib/planner/plan.json"),
                ("SESSION_PLANNER_UNIT_PRICE", "7500"),
                ("SESSION_PLANNER_DEFAULT_PACK", "10"),
            ]),
        );
        assert_eq!(settings.port, 4000);
        assert_eq!(
            settings.snapshot_path,
            Some(PathBuf::from("/var/lib/planner/plan.json"))
        );
        assert_eq!(settings.unit_price_minor, 7500);
        assert_eq!(settings.default_pack, Some(10));
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let mut settings = Settings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("SESSION_PLANNER_PORT", "0"),
                ("SESSION_PLANNER_HEALTH_PORT", "not-a-port"),
                ("SESSION_PLANNER_UNIT_PRICE", "-3"),
                ("SESSION_PLANNER_CATALOG", ""),
            ]),
        );
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_from_file_keeps_missing_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"port": 3100, "default_pack": 5}"#).unwrap();

        let settings = load_settings_from_path(Some(&path)).unwrap();
        assert_eq!(settings.port, 3100);
        assert_eq!(settings.default_pack, Some(5));
        assert_eq!(settings.health_port, 8080);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_settings_from_path(Some(&dir.path().join("absent.json")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_port_clash_rejected() {
        let settings = Settings {
            health_port: 3000,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, u16::MAX), Some(8080));
        assert_eq!(parse_u16_range("0", 1, u16::MAX), None);
        assert_eq!(parse_u16_range("70000", 1, u16::MAX), None);
        assert_eq!(parse_u64_range(" 42 ", 0, 100), Some(42));
    }
}
