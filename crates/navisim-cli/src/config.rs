//! Configuration – reads/writes `~/.navisim/config.toml`.

use navisim_sim::LidarConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted simulator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Integration step of the pose integrator, in milliseconds.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// Optional JSON scene file loaded into the raycaster at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects_path: Option<PathBuf>,

    /// Per-topic buffer of the event bus.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    #[serde(default)]
    pub lidar: LidarConfig,
}

fn default_tick_period_ms() -> u64 {
    10
}
fn default_bus_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            objects_path: None,
            bus_capacity: default_bus_capacity(),
            lidar: LidarConfig::default(),
        }
    }
}

impl Config {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Reject values the runtime cannot start with.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_period_ms == 0 {
            return Err("tick_period_ms must be at least 1".to_string());
        }
        if self.bus_capacity == 0 {
            return Err("bus_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Return the config path: `$NAVISIM_CONFIG` when set, otherwise
/// `~/.navisim/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("NAVISIM_CONFIG") {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".navisim").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `NAVISIM_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `NAVISIM_TICK_PERIOD_MS` | `tick_period_ms` |
/// | `NAVISIM_OBJECTS_PATH` | `objects_path` |
/// | `NAVISIM_BUS_CAPACITY` | `bus_capacity` |
/// | `NAVISIM_SCAN_RATE_HZ` | `lidar.scan_rate_hz` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("NAVISIM_TICK_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.tick_period_ms = ms;
    }
    if let Ok(v) = std::env::var("NAVISIM_OBJECTS_PATH") {
        cfg.objects_path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("NAVISIM_BUS_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>()
    {
        cfg.bus_capacity = capacity;
    }
    if let Ok(v) = std::env::var("NAVISIM_SCAN_RATE_HZ")
        && let Ok(hz) = v.parse::<f64>()
    {
        cfg.lidar.scan_rate_hz = hz;
    }
}

/// Save the config to disk, creating the parent directory if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.tick_period_ms, 10);
        assert_eq!(loaded.bus_capacity, 256);
        assert_eq!(loaded.lidar.frame_id, "lidar_link");
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "tick_period_ms = 20\nobjects_path = \"/tmp/objects.json\"\n\n[lidar]\nmax_distance = 30.0\n",
        )
        .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.tick_period(), Duration::from_millis(20));
        assert_eq!(cfg.objects_path, Some(PathBuf::from("/tmp/objects.json")));
        assert_eq!(cfg.bus_capacity, 256);
        assert_eq!(cfg.lidar.max_distance, 30.0);
        assert_eq!(cfg.lidar.min_distance, 0.1);
        assert_eq!(cfg.lidar.vertical_angles.len(), 5);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tick_period_ms = \"fast\"").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_navisim_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".navisim"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn validate_rejects_zero_tick_and_capacity() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_ok());
        cfg.tick_period_ms = 0;
        assert!(cfg.validate().is_err());

        let cfg = Config {
            bus_capacity: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn apply_env_overrides_changes_tick_period() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("NAVISIM_TICK_PERIOD_MS", "25") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.tick_period_ms, 25);
        unsafe { std::env::remove_var("NAVISIM_TICK_PERIOD_MS") };
    }

    #[test]
    fn apply_env_overrides_changes_objects_path() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("NAVISIM_OBJECTS_PATH", "/srv/scene.json") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.objects_path, Some(PathBuf::from("/srv/scene.json")));
        unsafe { std::env::remove_var("NAVISIM_OBJECTS_PATH") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_capacity() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("NAVISIM_BUS_CAPACITY", "lots") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.bus_capacity, 256);
        unsafe { std::env::remove_var("NAVISIM_BUS_CAPACITY") };
    }

    #[test]
    fn apply_env_overrides_changes_scan_rate() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("NAVISIM_SCAN_RATE_HZ", "2.5") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.lidar.scan_rate_hz, 2.5);
        unsafe { std::env::remove_var("NAVISIM_SCAN_RATE_HZ") };
    }
}
