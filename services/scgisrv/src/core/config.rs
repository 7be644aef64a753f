//! Service configuration
//!
//! Loaded with figment: built-in defaults, then the YAML file, then
//! `SCGISRV_` environment variables (`__` separates sections, e.g.
//! `SCGISRV_ABUS__TIMEOUT_MS=300`).

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::Level;

use super::constants::{ABUS_PORT, FRAME_OVERHEAD, MAX_FRAME_BYTES};
use crate::error::{Result, ScgiSrvError};

/// Smallest frame that still carries one four-byte write
pub const MIN_FRAME_BYTES: usize = FRAME_OVERHEAD + 12;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub eth: EthConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub can: CanConfig,
    #[serde(default)]
    pub abus: AbusConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scgi: ScgiConfig,
    #[serde(default)]
    pub datalogger: DataLoggerConfig,
    #[serde(default)]
    pub dbase: DbaseConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub locations: LocationsConfig,
    #[serde(default)]
    pub debuglog: DebugLogConfig,
    /// Controllers with a fixed address, keyed `c<NAD>`
    #[serde(default)]
    pub static_plcs: BTreeMap<String, StaticPlcConfig>,
}

/// Password as written in the file: empty, a number, or a numeric string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PasswordSetting {
    Number(i64),
    Text(String),
}

impl Default for PasswordSetting {
    fn default() -> Self {
        PasswordSetting::Text(String::new())
    }
}

impl PasswordSetting {
    /// `None` when unset, error when not a 16-bit number
    pub fn parse(&self) -> Result<Option<u16>> {
        let invalid = |raw: String| ScgiSrvError::config(format!("invalid password \"{raw}\""));
        match self {
            PasswordSetting::Number(n) => u16::try_from(*n)
                .map(Some)
                .map_err(|_| invalid(n.to_string())),
            PasswordSetting::Text(s) if s.trim().is_empty() => Ok(None),
            PasswordSetting::Text(s) => s
                .trim()
                .parse::<u16>()
                .map(Some)
                .map_err(|_| invalid(s.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EthConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
    pub autodetect_enabled: bool,
    pub autodetect_address: String,
}

impl Default for EthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: ABUS_PORT,
            autodetect_enabled: true,
            autodetect_address: "192.168.1.255".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: bool,
    /// Push entries older than this are listed as expired
    pub timeout_h: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_h: 24,
        }
    }
}

impl PushConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_h * 3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanConfig {
    pub enabled: bool,
    pub channel: String,
    pub bitrate: u32,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: "can0".to_string(),
            bitrate: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbusConfig {
    pub timeout_ms: u64,
    pub number_of_retries: u32,
    pub password: PasswordSetting,
    pub max_frame_bytes: usize,
}

impl Default for AbusConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 200,
            number_of_retries: 3,
            password: PasswordSetting::default(),
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

impl AbusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validated by `Config::validate`, invalid values read as unset here
    pub fn password(&self) -> Option<u16> {
        self.password.parse().ok().flatten()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a read value is served from the cache, 0 disables caching
    pub valid_period_s: u64,
    /// Window before expiry in which a background refresh is started
    pub request_period_s: u64,
    /// Sweep period for expired entries, 0 disables the sweep
    pub cleanup_period_s: u64,
}

impl CacheConfig {
    pub fn valid_period(&self) -> Duration {
        Duration::from_secs(self.valid_period_s)
    }

    pub fn request_period(&self) -> Duration {
        Duration::from_secs(self.request_period_s)
    }

    pub fn cleanup_period(&self) -> Duration {
        Duration::from_secs(self.cleanup_period_s)
    }

    pub fn is_enabled(&self) -> bool {
        self.valid_period_s > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScgiConfig {
    pub bind_address: String,
    pub port: u16,
    pub server_timeout_s: u64,
    pub config_check_period_s: u64,
    pub reply_with_descriptions: bool,
    pub tls_enabled: bool,
}

impl Default for ScgiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 4000,
            server_timeout_s: 10,
            config_check_period_s: 10,
            reply_with_descriptions: true,
            tls_enabled: false,
        }
    }
}

impl ScgiConfig {
    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server_timeout_s)
    }

    pub fn config_check_period(&self) -> Duration {
        Duration::from_secs(self.config_check_period_s.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataLoggerConfig {
    pub enabled: bool,
}

impl Default for DataLoggerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbaseConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub max_query_size: usize,
}

impl Default for DbaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 3306,
            name: "cybro".to_string(),
            user: "root".to_string(),
            password: "root".to_string(),
            max_query_size: 1_000_000,
        }
    }
}

impl DbaseConfig {
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub enabled: bool,
    pub db_sync_timeout_min: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_sync_timeout_min: 1,
        }
    }
}

impl RelayConfig {
    pub fn db_sync_period(&self) -> Duration {
        Duration::from_secs(self.db_sync_timeout_min.max(1) * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationsConfig {
    /// Base for every relative path below
    pub app_dir: PathBuf,
    pub log_dir: PathBuf,
    pub alc_dir: PathBuf,
    pub data_logger_config_file: PathBuf,
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from("."),
            log_dir: PathBuf::from("log"),
            alc_dir: PathBuf::from("alc"),
            data_logger_config_file: PathBuf::from("data_logger.xml"),
        }
    }
}

impl LocationsConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.app_dir.join(path)
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.log_dir)
    }

    pub fn alc_dir(&self) -> PathBuf {
        self.resolve(&self.alc_dir)
    }

    pub fn data_logger_config_file(&self) -> PathBuf {
        self.resolve(&self.data_logger_config_file)
    }

    pub fn tls_cert(&self) -> PathBuf {
        self.app_dir.join("tls").join("private.crt")
    }

    pub fn tls_key(&self) -> PathBuf {
        self.app_dir.join("tls").join("private.key")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugLogConfig {
    pub enabled: bool,
    pub log_to_file: bool,
    pub level: String,
    pub max_file_size_kb: u64,
    pub backup_count: u32,
}

impl Default for DebugLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_to_file: true,
            level: "debug".to_string(),
            max_file_size_kb: 1024,
            backup_count: 5,
        }
    }
}

impl DebugLogConfig {
    pub fn level(&self) -> Result<Level> {
        self.level
            .parse::<Level>()
            .map_err(|_| ScgiSrvError::config(format!("invalid log level \"{}\"", self.level)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticPlcConfig {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub password: PasswordSetting,
}

/// Static controller entry after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPlc {
    pub nad: u32,
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    pub password: Option<u16>,
}

impl Config {
    /// Load defaults, YAML file and environment, then validate
    pub fn load(path: &Path) -> Result<Self> {
        let config: Config = Self::figment(path)
            .extract()
            .map_err(|e| ScgiSrvError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("SCGISRV_").split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        self.abus.password.parse()?;
        if self.abus.timeout_ms == 0 {
            return Err(ScgiSrvError::config("abus.timeout_ms must be positive"));
        }
        if self.abus.max_frame_bytes < MIN_FRAME_BYTES {
            return Err(ScgiSrvError::config(format!(
                "abus.max_frame_bytes must be at least {}",
                MIN_FRAME_BYTES
            )));
        }
        if self.eth.enabled && self.eth.bind_address.parse::<IpAddr>().is_err() {
            return Err(ScgiSrvError::config(format!(
                "invalid eth.bind_address \"{}\"",
                self.eth.bind_address
            )));
        }
        self.debuglog.level()?;
        self.static_plcs()?;
        Ok(())
    }

    /// Parse the `static_plcs` table
    pub fn static_plcs(&self) -> Result<Vec<StaticPlc>> {
        let name_pattern = Regex::new(r"^c(\d+)$")
            .map_err(|e| ScgiSrvError::internal(format!("plc name pattern: {e}")))?;

        self.static_plcs
            .iter()
            .map(|(name, plc)| {
                let invalid_name = || ScgiSrvError::config(format!("invalid plc config name \"{name}\""));
                let nad = name_pattern
                    .captures(name)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .ok_or_else(invalid_name)?;

                let ip = match plc.ip.as_deref().map(str::trim) {
                    None | Some("") => None,
                    Some(raw) => Some(raw.parse::<IpAddr>().map_err(|_| {
                        ScgiSrvError::config(format!("invalid ip \"{raw}\" for {name}"))
                    })?),
                };

                Ok(StaticPlc {
                    nad,
                    ip,
                    port: plc.port,
                    password: plc.password.parse()?,
                })
            })
            .collect()
    }

    /// Whether anything needs the database
    pub fn needs_database(&self) -> bool {
        self.dbase.enabled && (self.relay.enabled || self.datalogger.enabled)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.eth.port, 8442);
        assert_eq!(config.scgi.port, 4000);
        assert_eq!(config.abus.timeout(), Duration::from_millis(200));
        assert_eq!(config.abus.password(), None);
        assert!(!config.cache.is_enabled());
    }

    #[test]
    fn test_yaml_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "scgisrv.yaml",
                r#"
abus:
  timeout_ms: 500
  password: 1234
cache:
  valid_period_s: 10
  request_period_s: 5
static_plcs:
  c1000:
    ip: 192.168.1.50
    port: 8442
  c12:
    ip: ""
"#,
            )?;
            jail.set_env("SCGISRV_SCGI__PORT", "4100");
            jail.set_env("SCGISRV_ABUS__NUMBER_OF_RETRIES", "1");

            let config = Config::load(Path::new("scgisrv.yaml")).map_err(|e| e.to_string())?;
            assert_eq!(config.abus.timeout_ms, 500);
            assert_eq!(config.abus.number_of_retries, 1);
            assert_eq!(config.abus.password(), Some(1234));
            assert_eq!(config.scgi.port, 4100);
            assert_eq!(config.cache.request_period(), Duration::from_secs(5));

            let plcs = config.static_plcs().map_err(|e| e.to_string())?;
            assert_eq!(plcs.len(), 2);
            let c12 = plcs.iter().find(|p| p.nad == 12).unwrap();
            assert_eq!(c12.ip, None);
            let c1000 = plcs.iter().find(|p| p.nad == 1000).unwrap();
            assert_eq!(c1000.ip, Some("192.168.1.50".parse().unwrap()));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_password() {
        let mut config = Config::default();
        config.abus.password = PasswordSetting::Text("secret".into());
        let err = config.validate().unwrap_err();
        assert_eq!(err, ScgiSrvError::config("invalid password \"secret\""));

        config.abus.password = PasswordSetting::Number(70_000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_plc_name() {
        let mut config = Config::default();
        config
            .static_plcs
            .insert("plc7".into(), StaticPlcConfig::default());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid plc config name \"plc7\""));
    }

    #[test]
    fn test_frame_size_floor() {
        let mut config = Config::default();
        config.abus.max_frame_bytes = MIN_FRAME_BYTES - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_locations() {
        let locations = LocationsConfig {
            app_dir: PathBuf::from("/opt/scgi"),
            log_dir: PathBuf::from("/var/log/scgi"),
            ..LocationsConfig::default()
        };
        assert_eq!(locations.log_dir(), PathBuf::from("/var/log/scgi"));
        assert_eq!(locations.alc_dir(), PathBuf::from("/opt/scgi/alc"));
        assert_eq!(locations.tls_key(), PathBuf::from("/opt/scgi/tls/private.key"));
    }
}
