//! Environment variable overrides for configuration structs.

use std::env;
use std::str::FromStr;

use tracing::warn;

/// Reads a trimmed, non-empty string override.
pub fn env_string(name: &str) -> Option<String> {
    let value = env::var(name).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Reads and parses an override. Unparseable values are logged and ignored
/// so a typo never prevents startup.
pub fn env_parsed<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_string(name)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(variable = name, value = %raw, error = %error, "Ignoring unparseable environment override");
            None
        }
    }
}
