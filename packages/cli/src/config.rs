//! INI configuration file.
//!
//! Loading starts from [`Settings::default`] and overlays every key found in
//! the file; a missing file yields the defaults.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use daemons::{ExecEnv, HostlerConfig, PoolConfig, WhipConfig};
use db::DbConfig;
use ini::Ini;
use paddock_core::HOST_DEFAULT;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "paddock.cfg";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] ini::Error),

    #[error("Failed to write config file: {0}")]
    Write(#[from] std::io::Error),

    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaddockSection {
    pub host: String,
    pub sys_path: Vec<String>,
    pub venv_path: Option<String>,
    pub venv_exclusive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSection {
    pub db_url: String,
    pub db_namespace: String,
    pub db_database: String,
    pub db_username: Option<String>,
    pub db_password: Option<String>,
    pub redis_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolSection {
    pub check_time: Duration,
    pub sleep_time: Duration,
    pub max_workhorses: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhipSection {
    pub check_time: Duration,
    pub limits_update_time: Duration,
    pub max_jobs: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostlerSection {
    pub check_time: Duration,
    pub stale_minutes: u64,
}

/// Every setting of a paddock deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub paddock: PaddockSection,
    pub connection: ConnectionSection,
    pub pool: PoolSection,
    pub whip: WhipSection,
    pub hostler: HostlerSection,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            paddock: PaddockSection {
                host: HOST_DEFAULT.to_string(),
                sys_path: Vec::new(),
                venv_path: None,
                venv_exclusive: false,
            },
            connection: ConnectionSection {
                db_url: "ws://127.0.0.1:8000".to_string(),
                db_namespace: "paddock".to_string(),
                db_database: "main".to_string(),
                db_username: None,
                db_password: None,
                redis_url: "redis://127.0.0.1:6379/0".to_string(),
            },
            pool: PoolSection {
                check_time: Duration::from_secs(30),
                sleep_time: Duration::from_secs(1),
                max_workhorses: None,
            },
            whip: WhipSection {
                check_time: Duration::from_secs(1),
                limits_update_time: Duration::from_secs(60),
                max_jobs: 100,
            },
            hostler: HostlerSection {
                check_time: Duration::from_secs(5),
                stale_minutes: 5,
            },
        }
    }
}

impl Settings {
    /// Load from `path`, or the defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Write every setting to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        Ok(())
    }

    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("paddock"))
            .set("host", self.paddock.host.as_str())
            .set("sys_path", self.paddock.sys_path.join(":"))
            .set("venv_path", self.paddock.venv_path.clone().unwrap_or_default())
            .set("venv_exclusive", self.paddock.venv_exclusive.to_string());
        ini.with_section(Some("connection"))
            .set("db_url", self.connection.db_url.as_str())
            .set("db_namespace", self.connection.db_namespace.as_str())
            .set("db_database", self.connection.db_database.as_str())
            .set("db_username", self.connection.db_username.clone().unwrap_or_default())
            .set("db_password", self.connection.db_password.clone().unwrap_or_default())
            .set("redis_url", self.connection.redis_url.as_str());
        ini.with_section(Some("pool"))
            .set("check_time", secs(self.pool.check_time))
            .set("sleep_time", secs(self.pool.sleep_time))
            .set(
                "max_workhorses",
                self.pool.max_workhorses.map(|m| m.to_string()).unwrap_or_default(),
            );
        ini.with_section(Some("whip"))
            .set("check_time", secs(self.whip.check_time))
            .set("limits_update_time", secs(self.whip.limits_update_time))
            .set("max_jobs", self.whip.max_jobs.to_string());
        ini.with_section(Some("hostler"))
            .set("check_time", secs(self.hostler.check_time))
            .set("stale_minutes", self.hostler.stale_minutes.to_string());
        ini
    }

    pub fn db_config(&self) -> DbConfig {
        let connection = &self.connection;
        let config = DbConfig::remote(connection.db_url.as_str())
            .with_namespace(connection.db_namespace.as_str())
            .with_database(connection.db_database.as_str());
        match (&connection.db_username, &connection.db_password) {
            (Some(username), Some(password)) => config.with_credentials(username, password),
            _ => config,
        }
    }

    pub fn exec_env(&self) -> ExecEnv {
        ExecEnv::new(
            &self.paddock.sys_path,
            self.paddock.venv_path.as_deref(),
            self.paddock.venv_exclusive,
        )
    }

    pub fn pool_config(&self, name: impl Into<String>) -> PoolConfig {
        PoolConfig {
            check_time: self.pool.check_time,
            sleep_time: self.pool.sleep_time,
            max_workhorses: self.pool.max_workhorses,
            ..PoolConfig::new(name)
        }
    }

    pub fn whip_config(&self) -> WhipConfig {
        WhipConfig {
            host: self.paddock.host.clone(),
            check_time: self.whip.check_time,
            limits_update_time: self.whip.limits_update_time,
            max_jobs: self.whip.max_jobs,
        }
    }

    pub fn hostler_config(&self) -> HostlerConfig {
        HostlerConfig {
            host: self.paddock.host.clone(),
            check_time: self.hostler.check_time,
            stale_after: Duration::from_secs(self.hostler.stale_minutes.saturating_mul(60)),
        }
    }
}

fn secs(duration: Duration) -> String {
    duration.as_secs_f64().to_string()
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a non-negative integer"))
}

fn parse_seconds(section: &str, key: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(|| invalid(section, key, value, "must be a non-negative number of seconds"))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" | "" => Ok(false),
        _ => Err(invalid(section, key, value, "must be true or false")),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_ini(ini: &Ini) -> Result<Settings, ConfigError> {
    let mut settings = Settings::default();

    if let Some(section) = ini.section(Some("paddock")) {
        if let Some(v) = section.get("host").and_then(non_empty) {
            settings.paddock.host = v;
        }
        if let Some(v) = section.get("sys_path") {
            settings.paddock.sys_path = v
                .split(':')
                .filter_map(non_empty)
                .collect();
        }
        if let Some(v) = section.get("venv_path") {
            settings.paddock.venv_path = non_empty(v);
        }
        if let Some(v) = section.get("venv_exclusive") {
            settings.paddock.venv_exclusive = parse_bool("paddock", "venv_exclusive", v)?;
        }
    }

    if let Some(section) = ini.section(Some("connection")) {
        if let Some(v) = section.get("db_url").and_then(non_empty) {
            settings.connection.db_url = v;
        }
        if let Some(v) = section.get("db_namespace").and_then(non_empty) {
            settings.connection.db_namespace = v;
        }
        if let Some(v) = section.get("db_database").and_then(non_empty) {
            settings.connection.db_database = v;
        }
        if let Some(v) = section.get("db_username") {
            settings.connection.db_username = non_empty(v);
        }
        if let Some(v) = section.get("db_password") {
            settings.connection.db_password = non_empty(v);
        }
        if let Some(v) = section.get("redis_url").and_then(non_empty) {
            settings.connection.redis_url = v;
        }
    }

    if let Some(section) = ini.section(Some("pool")) {
        if let Some(v) = section.get("check_time") {
            settings.pool.check_time = parse_seconds("pool", "check_time", v)?;
        }
        if let Some(v) = section.get("sleep_time") {
            settings.pool.sleep_time = parse_seconds("pool", "sleep_time", v)?;
        }
        if let Some(v) = section.get("max_workhorses") {
            settings.pool.max_workhorses = match non_empty(v) {
                Some(max) => Some(parse_number("pool", "max_workhorses", &max)?),
                None => None,
            };
        }
    }

    if let Some(section) = ini.section(Some("whip")) {
        if let Some(v) = section.get("check_time") {
            settings.whip.check_time = parse_seconds("whip", "check_time", v)?;
        }
        if let Some(v) = section.get("limits_update_time") {
            settings.whip.limits_update_time = parse_seconds("whip", "limits_update_time", v)?;
        }
        if let Some(v) = section.get("max_jobs") {
            settings.whip.max_jobs = parse_number("whip", "max_jobs", v)?;
        }
    }

    if let Some(section) = ini.section(Some("hostler")) {
        if let Some(v) = section.get("check_time") {
            settings.hostler.check_time = parse_seconds("hostler", "check_time", v)?;
        }
        if let Some(v) = section.get("stale_minutes") {
            settings.hostler.stale_minutes = parse_number("hostler", "stale_minutes", v)?;
        }
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, tempdir};

    fn load_str(content: &str) -> Result<Settings, ConfigError> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        Settings::load(file.path())
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.cfg")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn overlays_found_keys() {
        let settings = load_str(
            "[paddock]\nhost = worker-3\nsys_path = /opt/a::/opt/b\n\n\
             [pool]\ncheck_time = 2.5\nmax_workhorses = 4\n\n\
             [hostler]\nstale_minutes = 10\n",
        )
        .unwrap();

        assert_eq!(settings.paddock.host, "worker-3");
        assert_eq!(settings.paddock.sys_path, vec!["/opt/a", "/opt/b"]);
        assert_eq!(settings.pool.check_time, Duration::from_millis(2500));
        assert_eq!(settings.pool.max_workhorses, Some(4));
        assert_eq!(settings.pool.sleep_time, Duration::from_secs(1));
        assert_eq!(settings.whip.max_jobs, 100);
        assert_eq!(
            settings.hostler_config().stale_after,
            Duration::from_secs(600)
        );
        assert_eq!(settings.whip_config().host, "worker-3");
    }

    #[test]
    fn empty_values_mean_unset() {
        let settings =
            load_str("[pool]\nmax_workhorses =\n\n[connection]\ndb_username =\n").unwrap();
        assert_eq!(settings.pool.max_workhorses, None);
        assert!(settings.db_config().credentials.is_none());
    }

    #[test]
    fn invalid_value_names_the_key() {
        let err = load_str("[whip]\nmax_jobs = lots\n").unwrap_err();
        match err {
            ConfigError::InvalidValue {
                section, key, value, ..
            } => {
                assert_eq!(section, "whip");
                assert_eq!(key, "max_jobs");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(load_str("[pool]\ncheck_time = -1\n").is_err());
        assert!(load_str("[paddock]\nvenv_exclusive = maybe\n").is_err());
    }

    #[test]
    fn saved_file_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("paddock.cfg");

        let mut settings = Settings::default();
        settings.paddock.venv_path = Some("/srv/env".into());
        settings.paddock.venv_exclusive = true;
        settings.connection.db_username = Some("root".into());
        settings.connection.db_password = Some("secret".into());
        settings.pool.max_workhorses = Some(8);
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(
            loaded.db_config().credentials,
            Some(("root".to_string(), "secret".to_string()))
        );
    }
}
