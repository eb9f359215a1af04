//! Configuration loading and validation
//!
//! The configuration file is YAML with four sections: transports,
//! endpoints, rules, and settings. Loading goes through
//! [`Config::load`], which parses, applies defaults, and validates
//! referential integrity (every rule names existing endpoints, every
//! endpoint names an existing transport).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, Endpoint, SyncRule, Transport};

/// Default staleness timeout for cross-host lock reclamation
pub const DEFAULT_STALE_LOCK_SECS: u64 = 30 * 60;

/// Files above this size are listed without a checksum
pub const DEFAULT_CHECKSUM_MAX_SIZE: u64 = 100 * 1024 * 1024;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transports: Vec<Transport>,

    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    #[serde(default)]
    pub rules: Vec<RuleEntry>,

    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// A rule plus its optional per-rule schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    #[serde(flatten)]
    pub rule: SyncRule,

    /// Overrides the global scheduler interval for this rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleConfig>,
}

/// Per-rule scheduling override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub enabled: bool,

    /// Duration string such as `90s`, `5m`, or `1h30m`
    pub interval: String,
}

/// Global engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding the lock file (defaults to the data dir)
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,

    /// Directory holding the history database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Checksum algorithm name: `sha256` (default) or `md5`
    #[serde(default = "default_checksum_algorithm")]
    pub checksum_algorithm: String,

    /// Size ceiling above which files are listed without a checksum
    #[serde(default = "default_checksum_max_size")]
    pub checksum_max_size: u64,

    /// Cross-host lock staleness timeout
    #[serde(default = "default_stale_lock_timeout")]
    pub stale_lock_timeout: String,
}

/// Global scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Default interval between runs for rules without a schedule
    #[serde(default = "default_interval")]
    pub interval: String,
}

/// Logging settings consumed by the daemon binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level: `trace`, `debug`, `info`, `warn`, or `error`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file; stderr when absent
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".rulesync")
}

fn default_checksum_algorithm() -> String {
    "sha256".to_string()
}

fn default_checksum_max_size() -> u64 {
    DEFAULT_CHECKSUM_MAX_SIZE
}

fn default_stale_lock_timeout() -> String {
    "30m".to_string()
}

fn default_interval() -> String {
    "5m".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock_dir: None,
            data_dir: default_data_dir(),
            checksum_algorithm: default_checksum_algorithm(),
            checksum_max_size: default_checksum_max_size(),
            stale_lock_timeout: default_stale_lock_timeout(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_interval(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Loads and validates a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound
            } else {
                ConfigError::Invalid(e.to_string())
            }
        })?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks uniqueness, referential integrity, and rule validity
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut transport_names = std::collections::HashSet::new();
        for t in &self.transports {
            if t.name.is_empty() {
                return Err(ConfigError::Invalid("transport name cannot be empty".into()));
            }
            if !transport_names.insert(t.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate transport name: {}",
                    t.name
                )));
            }
        }

        let mut endpoint_names = std::collections::HashSet::new();
        for e in &self.endpoints {
            if e.name.is_empty() {
                return Err(ConfigError::Invalid("endpoint name cannot be empty".into()));
            }
            if !endpoint_names.insert(e.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate endpoint name: {}",
                    e.name
                )));
            }
            if !transport_names.contains(e.transport.as_str()) {
                return Err(ConfigError::TransportNotFound(e.transport.clone()));
            }
        }

        let mut rule_names = std::collections::HashSet::new();
        for entry in &self.rules {
            let rule = &entry.rule;
            rule.validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if !rule_names.insert(rule.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate rule name: {}",
                    rule.name
                )));
            }
            for endpoint in [&rule.source_endpoint, &rule.target_endpoint] {
                if !endpoint_names.contains(endpoint.as_str()) {
                    return Err(ConfigError::EndpointNotFound(endpoint.clone()));
                }
            }
            if let Some(schedule) = &entry.schedule {
                parse_duration(&schedule.interval)?;
            }
        }

        parse_duration(&self.scheduler.interval)?;
        parse_duration(&self.settings.stale_lock_timeout)?;

        Ok(())
    }

    /// Looks up a rule by name
    pub fn rule(&self, name: &str) -> Result<&RuleEntry, ConfigError> {
        self.rules
            .iter()
            .find(|r| r.rule.name == name)
            .ok_or_else(|| ConfigError::Invalid(format!("rule not found: {name}")))
    }

    /// Looks up an endpoint by name
    pub fn endpoint(&self, name: &str) -> Result<&Endpoint, ConfigError> {
        self.endpoints
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ConfigError::EndpointNotFound(name.to_string()))
    }

    /// Looks up a transport by name
    pub fn transport(&self, name: &str) -> Result<&Transport, ConfigError> {
        self.transports
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ConfigError::TransportNotFound(name.to_string()))
    }

    /// All enabled rules, in configuration order
    pub fn enabled_rules(&self) -> impl Iterator<Item = &RuleEntry> {
        self.rules.iter().filter(|r| r.rule.enabled)
    }

    /// Lock directory, defaulting to the data directory
    pub fn lock_dir(&self) -> PathBuf {
        self.settings
            .lock_dir
            .clone()
            .unwrap_or_else(|| self.settings.data_dir.clone())
    }
}

/// Parses a duration string of `<n><unit>` components
///
/// Units are `s`, `m`, and `h`; components may be chained (`1h30m`).
/// A bare integer is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ConfigError::Invalid("empty duration".into()));
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid duration: {s}")))?;
        digits.clear();
        let unit_secs = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => return Err(ConfigError::Invalid(format!("invalid duration unit in: {s}"))),
        };
        total += value * unit_secs;
    }
    if !digits.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "duration missing unit: {s}"
        )));
    }
    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
transports:
  - name: disk
    kind: local
endpoints:
  - name: laptop
    transport: disk
    root: /home/user/docs
  - name: backup
    transport: disk
    root: /mnt/backup/docs
rules:
  - name: docs
    mode: push
    source_endpoint: laptop
    target_endpoint: backup
    ignore_patterns: ["*.tmp", ".git"]
    conflict_strategy: keep-newest
    schedule:
      enabled: true
      interval: 15m
scheduler:
  enabled: true
  interval: 5m
"#;

    #[test]
    fn test_parse_sample() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        let entry = config.rule("docs").unwrap();
        assert!(entry.rule.enabled, "rules default to enabled");
        assert_eq!(entry.rule.ignore_patterns.len(), 2);
        assert_eq!(
            entry.schedule.as_ref().unwrap().interval,
            "15m"
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.endpoints.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/rulesync.yaml")),
            Err(ConfigError::NotFound)
        ));
    }

    #[test]
    fn test_unknown_endpoint_rejected() {
        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.rules[0].rule.target_endpoint = "nowhere".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EndpointNotFound(_))
        ));
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.endpoints[0].transport = "tape".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TransportNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        let duplicate = config.rules[0].clone();
        config.rules.push(duplicate);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("10m5").is_err());
    }
}
