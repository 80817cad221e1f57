//! Environment variable helpers
//!
//! Unset or empty variables fall back to the caller's default. A variable that is
//! set but does not parse is an error instead of being silently ignored.

use std::str::FromStr;

use crate::error::{CsvloadError, Result};

/// Read a variable, treating an empty value as unset.
pub fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read the first variable that is set out of `keys`.
pub fn var_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| var(key))
}

/// Parse a variable into `T`, returning `None` when unset.
pub fn parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CsvloadError::InvalidEnv {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

/// Parse a variable into `T`, falling back to `default` when unset.
pub fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse(key)?.unwrap_or(default))
}
