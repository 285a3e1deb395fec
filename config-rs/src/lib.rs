//! config-rs/lib.rs
//! Shared configuration utilities for the diagnostics workspace
//! Provides `.env` loading and typed environment lookups with defaults

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Load variables from a `.env` file in the working directory (or a parent).
///
/// Missing files are not an error; variables already present in the process
/// environment take precedence over the file.
///
/// # Returns
/// `true` if a `.env` file was found and loaded
pub fn load_env() -> bool {
    match dotenv::dotenv() {
        Ok(path) => {
            log::debug!("Loaded environment from {}", path.display());
            true
        }
        Err(err) if err.not_found() => false,
        Err(err) => {
            log::warn!("Failed to load .env file: {}", err);
            false
        }
    }
}

/// Read an environment variable as a non-empty string.
pub fn get_env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an environment variable, falling back to `default`.
///
/// # Arguments
/// * `name` - Variable name (e.g., "DIAG_MAX_WORKERS")
/// * `default` - Value used when the variable is unset or unparsable
pub fn get_env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            log::warn!("Invalid value '{}' in {}, using default", raw, name);
            default
        }),
        Err(_) => default,
    }
}

/// Read a boolean flag. Accepts 1/true/yes/on and 0/false/no/off.
pub fn get_env_bool(name: &str, default: bool) -> bool {
    match get_env_string(name) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                log::warn!("Invalid boolean '{}' in {}, using default {}", raw, name, default);
                default
            }
        },
        None => default,
    }
}

/// Read a whole number of seconds as a `Duration`.
pub fn get_env_duration_secs(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(get_env_or(name, default_secs))
}

/// Resolve the endpoint URL for a downstream service.
///
/// Looks up `<SERVICE>_ENDPOINT` first, then `<SERVICE>_URL`, and finally
/// falls back to `default`.
///
/// # Arguments
/// * `service_name` - The name of the service (e.g., "TELEMETRY", "LLM_API")
/// * `default` - The endpoint to use if neither variable is set
pub fn get_endpoint(service_name: &str, default: &str) -> String {
    let upper = service_name.to_uppercase();
    get_env_string(&format!("{}_ENDPOINT", upper))
        .or_else(|| get_env_string(&format!("{}_URL", upper)))
        .unwrap_or_else(|| default.to_string())
}

/// Environment variable name for a named credential scope.
///
/// Scopes are lower-case identifiers such as `llm` or `warehouse`; the
/// variable is `DIAG_CREDENTIAL_<SCOPE>` with non-alphanumerics mapped to `_`.
pub fn credential_var_name(scope: &str) -> String {
    let normalized: String = scope
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("DIAG_CREDENTIAL_{}", normalized)
}
