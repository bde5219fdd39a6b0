use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::parameters::{ExtractionParameters, Quarter, TickerSymbol};
use crate::simulation::{
    ProgressProfile, SimulationProfiles, MAX_INTERVAL_MS, PROGRESS_COMPLETE,
};

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["brava.toml", "config/brava.toml"];

const MAX_COLLAPSE_DELAY_MS: u64 = 60_000;

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub defaults: DefaultsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    pub schema: ProgressProfile,
    pub validation: ProgressProfile,
    pub extraction: ProgressProfile,
    pub collapse_delay_ms: u64,
}

/// Parameters the configuration panel starts with.
#[derive(Clone, Debug, PartialEq)]
pub struct DefaultsConfig {
    pub ticker_symbol: TickerSymbol,
    pub quarter: Quarter,
    pub year: String,
}

#[derive(Clone, Debug, PartialEq)]
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
    pub ticker_symbol: Option<TickerSymbol>,
    pub quarter: Option<u8>,
    pub year: Option<String>,
    pub collapse_delay_ms: Option<u64>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
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
        let defaults = ExtractionParameters::default();
        Self {
            simulation: SimulationConfig {
                schema: ProgressProfile::SCHEMA_DETECTION,
                validation: ProgressProfile::VALIDATION,
                extraction: ProgressProfile::EXTRACTION,
                collapse_delay_ms: 1_000,
            },
            defaults: DefaultsConfig {
                ticker_symbol: defaults.ticker_symbol,
                quarter: defaults.quarter,
                year: defaults.year,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
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
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options
                .config_path
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides)?;
        config.validate()?;

        Ok(config)
    }

    pub fn simulation_profiles(&self) -> SimulationProfiles {
        SimulationProfiles {
            schema_detection: self.simulation.schema,
            validation: self.simulation.validation,
            extraction: self.simulation.extraction,
        }
    }

    pub fn collapse_delay(&self) -> Duration {
        Duration::from_millis(self.simulation.collapse_delay_ms)
    }

    pub fn default_parameters(&self) -> ExtractionParameters {
        ExtractionParameters {
            ticker_symbol: self.defaults.ticker_symbol,
            quarter: self.defaults.quarter,
            year: self.defaults.year.clone(),
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(simulation) = patch.simulation {
            if let Some(collapse_delay_ms) = simulation.collapse_delay_ms {
                self.simulation.collapse_delay_ms = collapse_delay_ms;
            }
            if let Some(schema) = simulation.schema {
                schema.apply_to(&mut self.simulation.schema);
            }
            if let Some(validation) = simulation.validation {
                validation.apply_to(&mut self.simulation.validation);
            }
            if let Some(extraction) = simulation.extraction {
                extraction.apply_to(&mut self.simulation.extraction);
            }
        }

        if let Some(defaults) = patch.defaults {
            if let Some(ticker_symbol) = defaults.ticker_symbol {
                self.defaults.ticker_symbol =
                    parse_ticker("defaults.ticker_symbol", &ticker_symbol)?;
            }
            if let Some(quarter) = defaults.quarter {
                self.defaults.quarter = parse_quarter("defaults.quarter", quarter)?;
            }
            if let Some(year) = defaults.year {
                self.defaults.year = year;
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        apply_profile_env("SCHEMA", &mut self.simulation.schema)?;
        apply_profile_env("VALIDATION", &mut self.simulation.validation)?;
        apply_profile_env("EXTRACTION", &mut self.simulation.extraction)?;

        if let Some(value) = read_env("BRAVA_SIMULATION_COLLAPSE_DELAY_MS") {
            self.simulation.collapse_delay_ms =
                parse_u64("BRAVA_SIMULATION_COLLAPSE_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("BRAVA_DEFAULT_TICKER") {
            self.defaults.ticker_symbol =
                value.parse().map_err(|_| invalid_env("BRAVA_DEFAULT_TICKER", &value))?;
        }
        if let Some(value) = read_env("BRAVA_DEFAULT_QUARTER") {
            let quarter = parse_u8("BRAVA_DEFAULT_QUARTER", &value)?;
            self.defaults.quarter =
                Quarter::new(quarter).map_err(|_| invalid_env("BRAVA_DEFAULT_QUARTER", &value))?;
        }
        if let Some(value) = read_env("BRAVA_DEFAULT_YEAR") {
            self.defaults.year = value;
        }

        let log_level = read_env("BRAVA_LOGGING_LEVEL").or_else(|| read_env("BRAVA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("BRAVA_LOGGING_FORMAT").or_else(|| read_env("BRAVA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(ticker_symbol) = overrides.ticker_symbol {
            self.defaults.ticker_symbol = ticker_symbol;
        }
        if let Some(quarter) = overrides.quarter {
            self.defaults.quarter = parse_quarter("quarter", quarter)?;
        }
        if let Some(year) = overrides.year {
            self.defaults.year = year;
        }
        if let Some(collapse_delay_ms) = overrides.collapse_delay_ms {
            self.simulation.collapse_delay_ms = collapse_delay_ms;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_simulation(&self.simulation)?;
        validate_defaults(&self.defaults)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// An explicit path is used only if it exists; otherwise the working
/// directory candidates are tried in order.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn apply_profile_env(stage: &str, profile: &mut ProgressProfile) -> Result<(), ConfigError> {
    let increment_key = format!("BRAVA_SIMULATION_{stage}_INCREMENT");
    if let Some(value) = read_env(&increment_key) {
        profile.increment = parse_u8(&increment_key, &value)?;
    }
    let interval_key = format!("BRAVA_SIMULATION_{stage}_INTERVAL_MS");
    if let Some(value) = read_env(&interval_key) {
        profile.interval_ms = parse_u64(&interval_key, &value)?;
    }
    Ok(())
}

fn validate_simulation(simulation: &SimulationConfig) -> Result<(), ConfigError> {
    for (name, profile) in [
        ("schema", &simulation.schema),
        ("validation", &simulation.validation),
        ("extraction", &simulation.extraction),
    ] {
        if profile.increment == 0 || profile.increment > PROGRESS_COMPLETE {
            return Err(ConfigError::Validation(format!(
                "simulation.{name}.increment must be in range 1..=100"
            )));
        }
        if profile.interval_ms == 0 || profile.interval_ms > MAX_INTERVAL_MS {
            return Err(ConfigError::Validation(format!(
                "simulation.{name}.interval_ms must be in range 1..=60000"
            )));
        }
    }

    if simulation.collapse_delay_ms > MAX_COLLAPSE_DELAY_MS {
        return Err(ConfigError::Validation(
            "simulation.collapse_delay_ms must be at most 60000".to_string(),
        ));
    }

    Ok(())
}

fn validate_defaults(defaults: &DefaultsConfig) -> Result<(), ConfigError> {
    if defaults.year.trim().is_empty() {
        return Err(ConfigError::Validation("defaults.year must not be empty".to_string()));
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

fn parse_ticker(key: &str, value: &str) -> Result<TickerSymbol, ConfigError> {
    value.parse().map_err(|_| {
        ConfigError::Validation(format!(
            "{key} must be one of GIGANTE|WALMART|SORIANA (got `{value}`)"
        ))
    })
}

fn parse_quarter(key: &str, value: u8) -> Result<Quarter, ConfigError> {
    Quarter::new(value)
        .map_err(|_| ConfigError::Validation(format!("{key} must be in range 1..=4 (got {value})")))
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_env(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.trim().parse::<u8>().map_err(|_| invalid_env(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_env(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    simulation: Option<SimulationPatch>,
    defaults: Option<DefaultsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SimulationPatch {
    collapse_delay_ms: Option<u64>,
    schema: Option<ProfilePatch>,
    validation: Option<ProfilePatch>,
    extraction: Option<ProfilePatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfilePatch {
    increment: Option<u8>,
    interval_ms: Option<u64>,
}

impl ProfilePatch {
    fn apply_to(self, profile: &mut ProgressProfile) {
        if let Some(increment) = self.increment {
            profile.increment = increment;
        }
        if let Some(interval_ms) = self.interval_ms {
            profile.interval_ms = interval_ms;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DefaultsPatch {
    ticker_symbol: Option<String>,
    quarter: Option<u8>,
    year: Option<String>,
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
    use std::time::Duration;

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::domain::parameters::TickerSymbol;
    use crate::simulation::ProgressProfile;

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
    fn defaults_match_panel_initial_state() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(
            config.simulation.schema == ProgressProfile::SCHEMA_DETECTION,
            "schema profile should default to 10% every 200ms",
        )?;
        ensure(
            config.simulation.extraction == ProgressProfile::EXTRACTION,
            "extraction profile should default to 8% every 180ms",
        )?;
        ensure(
            config.collapse_delay() == Duration::from_millis(1_000),
            "collapse delay should default to one second",
        )?;
        let params = config.default_parameters();
        ensure(params.ticker_symbol == TickerSymbol::Gigante, "default ticker is GIGANTE")?;
        ensure(params.quarter.get() == 1, "default quarter is 1")?;
        ensure(params.year == "2025", "default year is 2025")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_BRAVA_TICKER", "SORIANA");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("brava.toml");
            fs::write(
                &path,
                r#"
[defaults]
ticker_symbol = "${TEST_BRAVA_TICKER}"
quarter = 3

[simulation.validation]
interval_ms = 50
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.defaults.ticker_symbol == TickerSymbol::Soriana,
                "ticker should be interpolated from environment",
            )?;
            ensure(config.defaults.quarter.get() == 3, "quarter should come from file")?;
            ensure(
                config.simulation.validation.interval_ms == 50
                    && config.simulation.validation.increment == 15,
                "partial profile patch should keep the default increment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_BRAVA_TICKER"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BRAVA_LOG_LEVEL", "warn");
        env::set_var("BRAVA_LOG_FORMAT", "pretty");

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

        clear_vars(&["BRAVA_LOG_LEVEL", "BRAVA_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BRAVA_DEFAULT_TICKER", "WALMART");
        env::set_var("BRAVA_SIMULATION_SCHEMA_INCREMENT", "25");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("brava.toml");
            fs::write(
                &path,
                r#"
[simulation]
collapse_delay_ms = 250

[simulation.schema]
increment = 20
interval_ms = 100

[defaults]
ticker_symbol = "SORIANA"
year = "2024"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    year: Some("2026".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.defaults.year == "2026", "override year should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.defaults.ticker_symbol == TickerSymbol::Walmart,
                "env ticker should win over file and defaults",
            )?;
            ensure(
                config.simulation.schema.increment == 25,
                "env increment should win over file",
            )?;
            ensure(
                config.simulation.schema.interval_ms == 100,
                "file interval should win over defaults",
            )?;
            ensure(
                config.collapse_delay() == Duration::from_millis(250),
                "file collapse delay should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["BRAVA_DEFAULT_TICKER", "BRAVA_SIMULATION_SCHEMA_INCREMENT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BRAVA_SIMULATION_EXTRACTION_INCREMENT", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("simulation.extraction.increment")
            );
            ensure(has_message, "validation failure should name the offending profile")
        })();

        clear_vars(&["BRAVA_SIMULATION_EXTRACTION_INCREMENT"]);
        result
    }

    #[test]
    fn unknown_ticker_in_file_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("brava.toml");
        fs::write(&path, "[defaults]\nticker_symbol = \"AAPL\"\n").map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => return Err("unknown ticker should fail validation".to_string()),
                Err(error) => error,
            };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("AAPL")),
            "validation failure should echo the rejected ticker",
        )
    }

    #[test]
    fn malformed_env_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BRAVA_DEFAULT_QUARTER", "7");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("quarter 7 should be rejected".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "BRAVA_DEFAULT_QUARTER", "error should name the env key")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["BRAVA_DEFAULT_QUARTER"]);
        result
    }

    #[test]
    fn required_file_must_exist() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");
        let error = match AppConfig::load(LoadOptions {
            config_path: Some(missing),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("missing required file should fail".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::MissingConfigFile(_)),
            "missing file should produce MissingConfigFile",
        )
    }
}
