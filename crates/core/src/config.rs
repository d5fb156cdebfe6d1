use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub carrier: CarrierConfig,
    pub insurance: InsuranceConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// RapidDeals carrier gateway settings.
#[derive(Clone, Debug)]
pub struct CarrierConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Loadsure cargo-insurance gateway settings. Disabled installs skip the
/// insurance flows entirely.
#[derive(Clone, Debug)]
pub struct InsuranceConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub carrier_base_url: Option<String>,
    pub carrier_api_key: Option<String>,
    pub insurance_enabled: Option<bool>,
    pub insurance_base_url: Option<String>,
    pub insurance_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://freightdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            carrier: CarrierConfig {
                base_url: "https://api.rapiddeals.example.com".to_string(),
                api_key: String::new().into(),
                timeout_secs: 30,
                max_retries: 3,
            },
            insurance: InsuranceConfig {
                enabled: false,
                base_url: "https://api.loadsure.example.com".to_string(),
                api_key: None,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("freightdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(carrier) = patch.carrier {
            if let Some(base_url) = carrier.base_url {
                self.carrier.base_url = base_url;
            }
            if let Some(carrier_api_key_value) = carrier.api_key {
                self.carrier.api_key = secret_value(carrier_api_key_value);
            }
            if let Some(timeout_secs) = carrier.timeout_secs {
                self.carrier.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = carrier.max_retries {
                self.carrier.max_retries = max_retries;
            }
        }

        if let Some(insurance) = patch.insurance {
            if let Some(enabled) = insurance.enabled {
                self.insurance.enabled = enabled;
            }
            if let Some(base_url) = insurance.base_url {
                self.insurance.base_url = base_url;
            }
            if let Some(insurance_api_key_value) = insurance.api_key {
                self.insurance.api_key = Some(secret_value(insurance_api_key_value));
            }
            if let Some(timeout_secs) = insurance.timeout_secs {
                self.insurance.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FREIGHTDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FREIGHTDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("FREIGHTDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FREIGHTDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FREIGHTDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FREIGHTDESK_CARRIER_BASE_URL") {
            self.carrier.base_url = value;
        }
        if let Some(value) = read_env("FREIGHTDESK_CARRIER_API_KEY") {
            self.carrier.api_key = secret_value(value);
        }
        if let Some(value) = read_env("FREIGHTDESK_CARRIER_TIMEOUT_SECS") {
            self.carrier.timeout_secs = parse_u64("FREIGHTDESK_CARRIER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FREIGHTDESK_CARRIER_MAX_RETRIES") {
            self.carrier.max_retries = parse_u32("FREIGHTDESK_CARRIER_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("FREIGHTDESK_INSURANCE_ENABLED") {
            self.insurance.enabled = parse_bool("FREIGHTDESK_INSURANCE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("FREIGHTDESK_INSURANCE_BASE_URL") {
            self.insurance.base_url = value;
        }
        if let Some(value) = read_env("FREIGHTDESK_INSURANCE_API_KEY") {
            self.insurance.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("FREIGHTDESK_INSURANCE_TIMEOUT_SECS") {
            self.insurance.timeout_secs = parse_u64("FREIGHTDESK_INSURANCE_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("FREIGHTDESK_LOGGING_LEVEL").or_else(|| read_env("FREIGHTDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FREIGHTDESK_LOGGING_FORMAT").or_else(|| read_env("FREIGHTDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(carrier_base_url) = overrides.carrier_base_url {
            self.carrier.base_url = carrier_base_url;
        }
        if let Some(carrier_api_key) = overrides.carrier_api_key {
            self.carrier.api_key = secret_value(carrier_api_key);
        }
        if let Some(enabled) = overrides.insurance_enabled {
            self.insurance.enabled = enabled;
        }
        if let Some(insurance_base_url) = overrides.insurance_base_url {
            self.insurance.base_url = insurance_base_url;
        }
        if let Some(insurance_api_key) = overrides.insurance_api_key {
            self.insurance.api_key = Some(secret_value(insurance_api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_carrier(&self.carrier)?;
        validate_insurance(&self.insurance)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("freightdesk.toml"), PathBuf::from("config/freightdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_carrier(carrier: &CarrierConfig) -> Result<(), ConfigError> {
    if !carrier.base_url.starts_with("http://") && !carrier.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "carrier.base_url must start with http:// or https://".to_string(),
        ));
    }

    if carrier.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "carrier.api_key is required. Request one from the RapidDeals integrations desk"
                .to_string(),
        ));
    }

    if carrier.timeout_secs == 0 || carrier.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "carrier.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_insurance(insurance: &InsuranceConfig) -> Result<(), ConfigError> {
    if insurance.enabled {
        let missing = insurance
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "insurance.api_key is required when insurance.enabled is true".to_string(),
            ));
        }
    }

    if !insurance.base_url.starts_with("http://") && !insurance.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "insurance.base_url must start with http:// or https://".to_string(),
        ));
    }

    if insurance.timeout_secs == 0 || insurance.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "insurance.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    carrier: Option<CarrierPatch>,
    insurance: Option<InsurancePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CarrierPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct InsurancePatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CARRIER_API_KEY", "rd-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("freightdesk.toml");
            fs::write(
                &path,
                r#"
[carrier]
api_key = "${TEST_CARRIER_API_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.carrier.api_key.expose_secret() == "rd-from-env",
                "carrier api key should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_CARRIER_API_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FREIGHTDESK_CARRIER_API_KEY", "rd-test");
        env::set_var("FREIGHTDESK_LOG_LEVEL", "warn");
        env::set_var("FREIGHTDESK_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "FREIGHTDESK_CARRIER_API_KEY",
            "FREIGHTDESK_LOG_LEVEL",
            "FREIGHTDESK_LOG_FORMAT",
        ]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FREIGHTDESK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("FREIGHTDESK_CARRIER_API_KEY", "rd-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("freightdesk.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[carrier]
api_key = "rd-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.carrier.api_key.expose_secret() == "rd-from-env",
                "env carrier api key should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["FREIGHTDESK_DATABASE_URL", "FREIGHTDESK_CARRIER_API_KEY"]);
        result
    }

    #[test]
    fn insurance_requires_api_key_when_enabled() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FREIGHTDESK_CARRIER_API_KEY", "rd-valid");
        env::set_var("FREIGHTDESK_INSURANCE_ENABLED", "true");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("insurance.api_key")
            );
            ensure(has_message, "validation failure should mention insurance.api_key")
        })();

        clear_vars(&["FREIGHTDESK_CARRIER_API_KEY", "FREIGHTDESK_INSURANCE_ENABLED"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FREIGHTDESK_CARRIER_API_KEY", "rd-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("rd-secret-value"),
                "debug output should not contain the carrier api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["FREIGHTDESK_CARRIER_API_KEY"]);
        result
    }
}
