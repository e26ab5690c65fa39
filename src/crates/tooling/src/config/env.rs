//! Environment variable loading utilities

use crate::{Result, ToolingError};
use std::env;
use std::str::FromStr;

/// Load an environment variable as a string
///
/// # Returns
///
/// * `Ok(Some(value))` if the variable is set and non-empty
/// * `Ok(None)` if it is unset or empty
/// * `Err` if it holds invalid UTF-8
pub fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) if val.trim().is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ToolingError::InvalidEnv {
            key: key.to_string(),
            reason: "contains invalid UTF-8".to_string(),
        }),
    }
}

/// Load and parse an environment variable
///
/// ```rust,ignore
/// let rpm: Option<usize> = get_env_parse("BOOKSMITH_REQUESTS_PER_MINUTE")?;
/// ```
pub fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key)? {
        Some(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ToolingError::InvalidEnv {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Load a boolean environment variable
///
/// Recognizes "true", "1", "yes", "on" and "false", "0", "no", "off", case-insensitively.
pub fn get_env_bool(key: &str) -> Result<Option<bool>> {
    match get_env(key)? {
        Some(val) => match val.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ToolingError::InvalidEnv {
                key: key.to_string(),
                reason: format!("'{}' is not a boolean", val),
            }),
        },
        None => Ok(None),
    }
}

/// Overwrite `target` with the parsed value of `key` when it is set
///
/// # Returns
///
/// Whether an override was applied
pub fn override_from_env<T>(key: &str, target: &mut T) -> Result<bool>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_parse(key)? {
        Some(value) => {
            *target = value;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_missing() {
        assert!(get_env("TOOLING_TEST_MISSING_VAR_12345").unwrap().is_none());
    }

    #[test]
    fn test_get_env_blank_is_unset() {
        env::set_var("TOOLING_TEST_BLANK", "   ");
        assert!(get_env("TOOLING_TEST_BLANK").unwrap().is_none());
        env::remove_var("TOOLING_TEST_BLANK");
    }

    #[test]
    fn test_get_env_parse() {
        env::set_var("TOOLING_TEST_NUMBER", " 42 ");
        let result: Option<u32> = get_env_parse("TOOLING_TEST_NUMBER").unwrap();
        assert_eq!(result, Some(42));
        env::remove_var("TOOLING_TEST_NUMBER");
    }

    #[test]
    fn test_get_env_parse_invalid_names_key() {
        env::set_var("TOOLING_TEST_INVALID_NUMBER", "twelve");
        let err = get_env_parse::<u32>("TOOLING_TEST_INVALID_NUMBER").unwrap_err();
        assert!(err.to_string().contains("TOOLING_TEST_INVALID_NUMBER"));
        env::remove_var("TOOLING_TEST_INVALID_NUMBER");
    }

    #[test]
    fn test_get_env_bool() {
        env::set_var("TOOLING_TEST_BOOL_ON", "Yes");
        env::set_var("TOOLING_TEST_BOOL_OFF", "0");
        env::set_var("TOOLING_TEST_BOOL_BAD", "maybe");

        assert_eq!(get_env_bool("TOOLING_TEST_BOOL_ON").unwrap(), Some(true));
        assert_eq!(get_env_bool("TOOLING_TEST_BOOL_OFF").unwrap(), Some(false));
        assert!(get_env_bool("TOOLING_TEST_BOOL_BAD").is_err());

        env::remove_var("TOOLING_TEST_BOOL_ON");
        env::remove_var("TOOLING_TEST_BOOL_OFF");
        env::remove_var("TOOLING_TEST_BOOL_BAD");
    }

    #[test]
    fn test_override_from_env() {
        let mut concurrency = 3usize;
        assert!(!override_from_env("TOOLING_TEST_UNSET_OVERRIDE", &mut concurrency).unwrap());
        assert_eq!(concurrency, 3);

        env::set_var("TOOLING_TEST_OVERRIDE", "5");
        assert!(override_from_env("TOOLING_TEST_OVERRIDE", &mut concurrency).unwrap());
        assert_eq!(concurrency, 5);
        env::remove_var("TOOLING_TEST_OVERRIDE");
    }
}
