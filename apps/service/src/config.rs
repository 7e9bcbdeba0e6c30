use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use logger::LogFormat;
use thiserror::Error;

use crate::monitoring::Thresholds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("Failed to write config: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("Invalid [{section}] value: {reason}")]
    InvalidValue { section: &'static str, reason: String },
    #[error("No config directory available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitoring: MonitoringConfig,
    pub database: DatabaseConfig,
    pub alerts: AlertsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Minutes between two check cycles
    pub check_interval_minutes: u64,
    pub batch_size: usize,
    pub response_time_threshold_ms: u64,
    pub downtime_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Recipient of email alerts
    pub alert_email: Option<String>,
    pub slack_webhook: Option<String>,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `compact` or `json`
    pub format: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            check_interval_minutes: 5,
            batch_size: crate::monitoring::batch::DEFAULT_BATCH_SIZE,
            response_time_threshold_ms: thresholds.response_time_threshold_ms,
            downtime_threshold: thresholds.downtime_threshold,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "apimon.db".into(), max_connections: 8 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/apimon/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("apimon/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };
        let unset = |value: &Option<String>| value.clone().unwrap_or_else(|| "(unset)".into());

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_title_2 = write_title_indented(2);
        let write_2 = write_indented(2);

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Monitoring")?;
        write_1(f, "Check Interval (minutes)", &self.monitoring.check_interval_minutes)?;
        write_1(f, "Batch Size", &self.monitoring.batch_size)?;
        write_1(f, "Response Time Threshold (ms)", &self.monitoring.response_time_threshold_ms)?;
        write_1(f, "Downtime Threshold", &self.monitoring.downtime_threshold)?;

        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_1(f, "Max Connections", &self.database.max_connections)?;

        write_title_1(f, "Alerts")?;
        write_1(f, "Alert Email", &unset(&self.alerts.alert_email))?;
        write_1(
            f,
            "Slack Webhook",
            &if self.alerts.slack_webhook.is_some() { "configured" } else { "(unset)" },
        )?;
        match &self.alerts.smtp {
            Some(smtp) => {
                write_title_2(f, "SMTP")?;
                write_2(f, "Host", &smtp.host)?;
                write_2(f, "Port", &smtp.port)?;
                write_2(f, "User", &unset(&smtp.username))?;
                write_2(f, "From", &unset(&smtp.from))?;
            }
            None => write_1(f, "SMTP", &"(unset)")?,
        }

        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/apimon/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let mut config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(ConfigError::ReadFailed)?;
            toml::from_str(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.apply_env_overrides()?;
        config.log_format()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(ConfigError::WriteFailed)
    }

    /// Let the process environment win over file values
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(path) = lookup("APIMON_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(value) = lookup("APIMON_CHECK_INTERVAL") {
            self.monitoring.check_interval_minutes = parse_env("APIMON_CHECK_INTERVAL", value)?;
        }
        if let Some(email) = lookup("ALERT_EMAIL") {
            self.alerts.alert_email = Some(email);
        }
        if let Some(webhook) = lookup("SLACK_WEBHOOK_URL") {
            self.alerts.slack_webhook = Some(webhook);
        }

        if let Some(host) = lookup("SMTP_HOST") {
            let smtp = self.alerts.smtp.get_or_insert_with(|| SmtpConfig {
                host: String::new(),
                port: default_smtp_port(),
                username: None,
                password: None,
                from: None,
            });
            smtp.host = host;
        }
        // The remaining SMTP values only make sense once a host is known
        if let Some(smtp) = self.alerts.smtp.as_mut() {
            if let Some(port) = lookup("SMTP_PORT") {
                smtp.port = parse_env("SMTP_PORT", port)?;
            }
            if let Some(user) = lookup("SMTP_USER") {
                smtp.username = Some(user);
            }
            if let Some(password) = lookup("SMTP_PASSWORD") {
                smtp.password = Some(password);
            }
            if let Some(from) = lookup("SMTP_FROM") {
                smtp.from = Some(from);
            }
        }

        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            downtime_threshold: self.monitoring.downtime_threshold,
            response_time_threshold_ms: self.monitoring.response_time_threshold_ms,
        }
    }

    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.logging.format.parse().map_err(|reason| ConfigError::InvalidValue { section: "logging", reason })
    }

    pub fn check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.monitoring.check_interval_minutes.max(1) * 60)
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.monitoring.check_interval_minutes, 5);
        assert_eq!(config.monitoring.batch_size, 5);
        assert_eq!(config.thresholds(), Thresholds::default());
        assert_eq!(config.check_interval(), std::time::Duration::from_secs(300));
        assert!(config.alerts.smtp.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[
                ("APIMON_CHECK_INTERVAL", "2"),
                ("ALERT_EMAIL", "ops@example.com"),
                ("SMTP_HOST", "smtp.example.com"),
                ("SMTP_PORT", "465"),
                ("SMTP_USER", "bot"),
            ]))
            .unwrap();

        assert_eq!(config.monitoring.check_interval_minutes, 2);
        assert_eq!(config.alerts.alert_email.as_deref(), Some("ops@example.com"));
        let smtp = config.alerts.smtp.unwrap();
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.username.as_deref(), Some("bot"));
    }

    #[test]
    fn test_smtp_port_without_host_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[("SMTP_PORT", "25")])).unwrap();
        assert!(config.alerts.smtp.is_none());
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = Config::default();
        let err = config.apply_overrides(lookup(&[("APIMON_CHECK_INTERVAL", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: "APIMON_CHECK_INTERVAL", .. }));
    }

    #[test]
    fn test_default_config_is_written_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apimon.toml");
        let mut config = Config::default();
        config.database.path = "/var/lib/apimon/apimon.db".into();
        config.write_config(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let parsed: Config = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.database.path, "/var/lib/apimon/apimon.db");
        assert_eq!(parsed.monitoring.downtime_threshold, 3);
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apimon.toml");
        fs::write(&path, "[logging]\nformat = \"yaml\"\n").unwrap();

        let err = Config::from_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { section: "logging", .. }));

        fs::write(&path, "[logging]\nformat = \"json\"\n").unwrap();
        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.log_format().unwrap(), LogFormat::Json);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str("[monitoring]\nbatch_size = 10\n").unwrap();
        assert_eq!(parsed.monitoring.batch_size, 10);
        assert_eq!(parsed.monitoring.check_interval_minutes, 5);
        assert_eq!(parsed.logging.level, "info");
    }
}
