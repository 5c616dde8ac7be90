use std::collections::HashMap;
use std::env::VarError;
use std::path::Path;

use crate::app_config::AppConfig;
use crate::ConfigError;

const CONFIG_PATH_VAR: &str = "DEVPROFILE_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "./config/config.yaml";

/// Load application configuration from the environment and the optional
/// YAML config file.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files first. The config
/// file is located via `DEVPROFILE_CONFIG_PATH` (default
/// `./config/config.yaml`); a missing file is not an error. Each file key is
/// the lower-cased name of an environment variable, and a set environment
/// variable always wins over the file.
///
/// # Errors
///
/// Returns `ConfigError` if the config file cannot be read or parsed, or if
/// any value is invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let file_values = read_config_file(Path::new(&path))?;
    build_app_config(|key| {
        std::env::var(key).or_else(|_| {
            file_values
                .get(&key.to_ascii_lowercase())
                .cloned()
                .ok_or(VarError::NotPresent)
        })
    })
}

/// Reads a flat YAML mapping from `path`. A missing file yields no values.
fn read_config_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => parse_config_values(&raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(source) => Err(ConfigError::ReadConfigFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parses a flat YAML mapping of scalar values into strings keyed by the
/// lower-cased key. An empty document yields no values.
fn parse_config_values(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let parsed: Option<HashMap<String, serde_yaml::Value>> = serde_yaml::from_str(raw)?;

    parsed
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| {
            let key = key.to_ascii_lowercase();
            let value = match value {
                serde_yaml::Value::Null => return None,
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                _ => return Some(Err(ConfigError::NonScalarValue { key })),
            };
            Some(Ok((key, value)))
        })
        .collect()
}

/// Build application configuration using the provided lookup function.
///
/// `lookup` resolves a variable name to its raw value; tests drive it from a
/// `HashMap` instead of the process environment.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    use std::net::SocketAddr;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let bind_addr = parse("DEVPROFILE_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("DEVPROFILE_LOG_LEVEL", "info");

    let github_base_url = or_default("GITHUB_BASE_URL", "https://api.github.com");
    let github_token = lookup("GITHUB_TOKEN")
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let bitbucket_base_url = or_default("BITBUCKET_BASE_URL", "https://api.bitbucket.org/2.0");

    let request_timeout_secs = parse_u64("DEVPROFILE_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default(
        "DEVPROFILE_USER_AGENT",
        "devprofile/0.1 (profile-aggregation)",
    );
    let max_concurrent_requests = parse_usize("DEVPROFILE_MAX_CONCURRENT_REQUESTS", "4")?;
    if max_concurrent_requests == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "DEVPROFILE_MAX_CONCURRENT_REQUESTS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    Ok(AppConfig {
        bind_addr,
        log_level,
        github_base_url,
        github_token,
        bitbucket_base_url,
        request_timeout_secs,
        user_agent,
        max_concurrent_requests,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
