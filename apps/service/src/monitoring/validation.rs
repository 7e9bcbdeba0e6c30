//! Validation for monitors registered from the command line.

use anyhow::{Result, anyhow};
use url::Url;

use crate::database::models::Monitor;

const MIN_TIMEOUT: u64 = 1;
const MAX_TIMEOUT: u64 = 300; // 5 minutes

/// Validates every user-supplied field of a monitor
pub fn validate_monitor(monitor: &Monitor) -> Result<()> {
    if monitor.name.trim().is_empty() {
        return Err(anyhow!("Monitor name must not be empty"));
    }

    validate_url(&monitor.target.url)?;
    validate_timeout(monitor.target.timeout_seconds)?;
    validate_interval(monitor.interval_minutes)?;
    validate_expected_status(monitor.target.expected_status_code)?;

    for (name, _) in monitor.target.headers.iter() {
        if name.trim().is_empty() {
            return Err(anyhow!("Header names must not be empty"));
        }
    }

    Ok(())
}

/// Validate HTTP/HTTPS target
pub fn validate_url(target: &str) -> Result<()> {
    let url = Url::parse(target).map_err(|e| anyhow!("Invalid URL: {}", e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Invalid scheme for HTTP monitor: {}", other)),
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL has no host: {}", target));
    }

    Ok(())
}

/// Validate timeout is reasonable
pub fn validate_timeout(timeout_seconds: u64) -> Result<()> {
    if timeout_seconds < MIN_TIMEOUT {
        return Err(anyhow!(
            "Timeout too short: {} seconds (minimum: {})",
            timeout_seconds,
            MIN_TIMEOUT
        ));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(anyhow!(
            "Timeout too long: {} seconds (maximum: {})",
            timeout_seconds,
            MAX_TIMEOUT
        ));
    }

    Ok(())
}

pub fn validate_interval(interval_minutes: u32) -> Result<()> {
    if interval_minutes < 1 {
        return Err(anyhow!("Check interval must be at least 1 minute"));
    }
    Ok(())
}

pub fn validate_expected_status(code: u16) -> Result<()> {
    if !(100..=599).contains(&code) {
        return Err(anyhow!("Expected status code out of range: {}", code));
    }
    Ok(())
}
