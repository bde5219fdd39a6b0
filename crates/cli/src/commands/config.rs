use std::env;
use std::fs;
use std::path::Path;

use brava_core::config::{resolve_config_path, AppConfig, LoadOptions};
use brava_core::simulation::ProgressProfile;
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

struct ConfigSource<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source =
        ConfigSource { doc: config_file_doc.as_ref(), path: config_file_path.as_deref() };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    for (name, env_stage, profile) in [
        ("schema", "SCHEMA", &config.simulation.schema),
        ("validation", "VALIDATION", &config.simulation.validation),
        ("extraction", "EXTRACTION", &config.simulation.extraction),
    ] {
        render_profile(&mut lines, &source, name, env_stage, profile);
    }
    lines.push(render_line(
        "simulation.collapse_delay_ms",
        &config.simulation.collapse_delay_ms.to_string(),
        field_source(
            "simulation.collapse_delay_ms",
            &["BRAVA_SIMULATION_COLLAPSE_DELAY_MS"],
            &source,
        ),
    ));

    lines.push(render_line(
        "defaults.ticker_symbol",
        config.defaults.ticker_symbol.as_str(),
        field_source("defaults.ticker_symbol", &["BRAVA_DEFAULT_TICKER"], &source),
    ));
    lines.push(render_line(
        "defaults.quarter",
        &config.defaults.quarter.get().to_string(),
        field_source("defaults.quarter", &["BRAVA_DEFAULT_QUARTER"], &source),
    ));
    lines.push(render_line(
        "defaults.year",
        &config.defaults.year,
        field_source("defaults.year", &["BRAVA_DEFAULT_YEAR"], &source),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        field_source("logging.level", &["BRAVA_LOGGING_LEVEL", "BRAVA_LOG_LEVEL"], &source),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        field_source("logging.format", &["BRAVA_LOGGING_FORMAT", "BRAVA_LOG_FORMAT"], &source),
    ));

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn render_profile(
    lines: &mut Vec<String>,
    source: &ConfigSource<'_>,
    name: &str,
    env_stage: &str,
    profile: &ProgressProfile,
) {
    let increment_key = format!("simulation.{name}.increment");
    let increment_env = format!("BRAVA_SIMULATION_{env_stage}_INCREMENT");
    lines.push(render_line(
        &increment_key,
        &profile.increment.to_string(),
        field_source(&increment_key, &[increment_env.as_str()], source),
    ));

    let interval_key = format!("simulation.{name}.interval_ms");
    let interval_env = format!("BRAVA_SIMULATION_{env_stage}_INTERVAL_MS");
    lines.push(render_line(
        &interval_key,
        &profile.interval_ms.to_string(),
        field_source(&interval_key, &[interval_env.as_str()], source),
    ));
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(key_path: &str, env_keys: &[&str], source: &ConfigSource<'_>) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = source.doc {
        if contains_path(doc, key_path) {
            let file_path = source
                .path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::contains_path;

    #[test]
    fn nested_profile_keys_are_found_in_file_doc() {
        let doc = "[simulation.schema]\nincrement = 20\n".parse::<Value>().expect("toml");

        assert!(contains_path(&doc, "simulation.schema.increment"));
        assert!(!contains_path(&doc, "simulation.schema.interval_ms"));
        assert!(!contains_path(&doc, "defaults.year"));
    }
}
