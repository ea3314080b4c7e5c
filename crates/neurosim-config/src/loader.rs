// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{validate_config, ConfigError, ConfigResult, LogFormat, NeurosimConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "neurosim_configuration.toml";

/// Find the neurosim configuration file
///
/// Search order:
/// 1. `NEUROSIM_CONFIG_PATH` environment variable
/// 2. Current working directory: `./neurosim_configuration.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("NEUROSIM_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by NEUROSIM_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.clone();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent.to_path_buf();
                }
                None => break,
            }
        }
    }

    if let Some(path) = search_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet NEUROSIM_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides (`"simulation.dt" -> "0.0005"`)
///
/// # Errors
///
/// Returns error if config file is not found, contains invalid TOML, carries an
/// unparsable override, or fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<NeurosimConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: NeurosimConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config)?;
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    validate_config(&config)?;
    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `NEUROSIM_DT` -> `simulation.dt`
/// - `NEUROSIM_SEED` -> `simulation.seed`
/// - `NEUROSIM_PARALLEL_THRESHOLD` -> `simulation.parallel_threshold`
/// - `NEUROSIM_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut NeurosimConfig) -> ConfigResult<()> {
    const ENV_KEYS: &[(&str, &str)] = &[
        ("NEUROSIM_DT", "simulation.dt"),
        ("NEUROSIM_SEED", "simulation.seed"),
        ("NEUROSIM_PARALLEL_THRESHOLD", "simulation.parallel_threshold"),
        ("NEUROSIM_LOG_LEVEL", "logging.level"),
    ];

    for (var, key) in ENV_KEYS {
        if let Ok(value) = env::var(var) {
            apply_override(config, key, &value)?;
        }
    }
    Ok(())
}

/// Apply CLI argument overrides to configuration
///
/// Keys are dotted section paths, e.g. `{"simulation.dt": "0.0005", "neurons.lif.tau_rc": "0.01"}`.
/// Unknown keys are rejected rather than silently ignored.
pub fn apply_cli_overrides(
    config: &mut NeurosimConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    for (key, value) in cli_args {
        apply_override(config, key, value)?;
    }
    Ok(())
}

fn apply_override(config: &mut NeurosimConfig, key: &str, value: &str) -> ConfigResult<()> {
    match key {
        "simulation.dt" => config.simulation.dt = parse(key, value)?,
        "simulation.seed" => config.simulation.seed = parse(key, value)?,
        "simulation.validate_schedule" => config.simulation.validate_schedule = parse_bool(key, value)?,
        "simulation.parallel_threshold" => {
            config.simulation.parallel_threshold = parse(key, value)?
        }
        "neurons.lif.tau_rc" => config.neurons.lif.tau_rc = parse(key, value)?,
        "neurons.lif.tau_ref" => config.neurons.lif.tau_ref = parse(key, value)?,
        "neurons.lif.min_voltage" => config.neurons.lif.min_voltage = parse(key, value)?,
        "neurons.lif.amplitude" => config.neurons.lif.amplitude = parse(key, value)?,
        "probes.sample_every" => config.probes.sample_every = parse(key, value)?,
        "logging.level" => config.logging.level = value.to_string(),
        "logging.format" => {
            config.logging.format = match value.to_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "logging.format must be 'text' or 'json', got '{}'",
                        other
                    )))
                }
            }
        }
        other => {
            return Err(ConfigError::InvalidValue(format!(
                "unknown configuration key '{}'",
                other
            )))
        }
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(format!("{} = '{}' cannot be parsed", key, value)))
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!("{} = '{}' is not a boolean", key, value))),
    }
}
