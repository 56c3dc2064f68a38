use crate::app_config::AppConfig;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>().map_err(|e| invalid(var, e.to_string()))
    };

    let parse_f64 = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<f64>().map_err(|e| invalid(var, e.to_string()))
    };

    let log_level = or_default("SHELFSCAN_LOG_LEVEL", "info");
    let markets_path = PathBuf::from(or_default(
        "SHELFSCAN_MARKETS_PATH",
        "./config/markets.yaml",
    ));
    let output_dir = PathBuf::from(or_default("SHELFSCAN_OUTPUT_DIR", "./data"));
    let bind_addr = parse_addr("SHELFSCAN_BIND_ADDR", "0.0.0.0:8080")?;

    let request_timeout_secs = parse_u64("SHELFSCAN_REQUEST_TIMEOUT_SECS", "10")?;
    if request_timeout_secs == 0 {
        return Err(invalid(
            "SHELFSCAN_REQUEST_TIMEOUT_SECS",
            "must be greater than zero".to_string(),
        ));
    }
    let user_agent = or_default(
        "SHELFSCAN_USER_AGENT",
        "Mozilla/5.0 (compatible; shelfscan/0.1)",
    );

    let retry_max_attempts = parse_u32("SHELFSCAN_RETRY_MAX_ATTEMPTS", "6")?;
    if retry_max_attempts == 0 {
        return Err(invalid(
            "SHELFSCAN_RETRY_MAX_ATTEMPTS",
            "must be at least 1".to_string(),
        ));
    }
    let retry_initial_delay_ms = parse_u64("SHELFSCAN_RETRY_INITIAL_DELAY_MS", "1000")?;
    let retry_backoff_factor = parse_f64("SHELFSCAN_RETRY_BACKOFF_FACTOR", "2.0")?;
    if !retry_backoff_factor.is_finite() || retry_backoff_factor < 1.0 {
        return Err(invalid(
            "SHELFSCAN_RETRY_BACKOFF_FACTOR",
            format!("must be a finite number >= 1.0, got {retry_backoff_factor}"),
        ));
    }

    let inter_page_delay_ms = parse_u64("SHELFSCAN_INTER_PAGE_DELAY_MS", "250")?;
    let detail_chunk_size = parse_usize("SHELFSCAN_DETAIL_CHUNK_SIZE", "100")?;
    if detail_chunk_size == 0 {
        return Err(invalid(
            "SHELFSCAN_DETAIL_CHUNK_SIZE",
            "must be greater than zero".to_string(),
        ));
    }
    let max_concurrent_chunks = parse_usize("SHELFSCAN_MAX_CONCURRENT_CHUNKS", "1")?;
    let max_concurrent_scrapes = parse_usize("SHELFSCAN_MAX_CONCURRENT_SCRAPES", "2")?;

    Ok(AppConfig {
        log_level,
        markets_path,
        output_dir,
        bind_addr,
        request_timeout_secs,
        user_agent,
        retry_max_attempts,
        retry_initial_delay_ms,
        retry_backoff_factor,
        inter_page_delay_ms,
        detail_chunk_size,
        max_concurrent_chunks: max_concurrent_chunks.max(1),
        max_concurrent_scrapes: max_concurrent_scrapes.max(1),
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
