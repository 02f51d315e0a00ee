//! config-rs/lib.rs
//! Shared configuration utilities for consistent environment handling.
//! Provides typed lookups with logged fallbacks so callers never panic on
//! a malformed variable.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Load a `.env` file from the working directory (or its parents) if present.
///
/// Missing files are not an error; values already present in the process
/// environment are never overridden.
///
/// # Returns
/// The path of the loaded file, if one was found
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenv::dotenv() {
        Ok(path) => {
            log::debug!("Loaded environment overrides from {}", path.display());
            Some(path)
        }
        Err(_) => None,
    }
}

/// Get a string variable or the provided default
///
/// # Arguments
/// * `key` - The environment variable name (e.g., "LIFECYCLE_BACKEND_URL")
/// * `default` - The value to use if the variable is unset
pub fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional string variable; empty values count as unset
pub fn env_opt_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get a boolean flag
///
/// Truthy values are "1", "true", "yes", "on" (case-insensitive). Falsy
/// values are "0", "false", "no", "off". Anything else logs a warning and
/// falls back to `default`.
pub fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                log::warn!("Invalid boolean in {}, using default {}", key, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a variable into any `FromStr` type with proper fallback
///
/// # Arguments
/// * `key` - The environment variable name
/// * `default` - The value to use when unset or unparsable
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            log::warn!("Invalid value in {}, using default {}", key, default);
            default
        }),
        Err(_) => default,
    }
}

/// Get a filesystem path variable or the provided default
pub fn env_path(key: &str, default: &str) -> PathBuf {
    env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

/// Get a comma separated list; blank items are dropped
///
/// # Returns
/// The parsed list, or `default` when the variable is unset or yields no items
pub fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    let fallback = || default.iter().map(|s| s.to_string()).collect();

    match env::var(key) {
        Ok(raw) => {
            let items: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if items.is_empty() {
                log::warn!("Empty list in {}, using defaults", key);
                fallback()
            } else {
                items
            }
        }
        Err(_) => fallback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse() {
        std::env::set_var("CFG_TEST_PARSE_OK", "42");
        assert_eq!(env_parse("CFG_TEST_PARSE_OK", 7u64), 42);

        std::env::set_var("CFG_TEST_PARSE_BAD", "forty-two");
        assert_eq!(env_parse("CFG_TEST_PARSE_BAD", 7u64), 7);

        std::env::remove_var("CFG_TEST_PARSE_UNSET");
        assert_eq!(env_parse("CFG_TEST_PARSE_UNSET", 0.5f64), 0.5);
    }

    #[test]
    fn test_env_bool() {
        std::env::set_var("CFG_TEST_BOOL_ON", "Yes");
        assert!(env_bool("CFG_TEST_BOOL_ON", false));

        std::env::set_var("CFG_TEST_BOOL_OFF", "off");
        assert!(!env_bool("CFG_TEST_BOOL_OFF", true));

        std::env::set_var("CFG_TEST_BOOL_BAD", "maybe");
        assert!(env_bool("CFG_TEST_BOOL_BAD", true));
    }

    #[test]
    fn test_env_list() {
        std::env::set_var("CFG_TEST_LIST", " nlp, ,translation ");
        assert_eq!(env_list("CFG_TEST_LIST", &["x"]), vec!["nlp", "translation"]);

        std::env::set_var("CFG_TEST_LIST_EMPTY", " , ");
        assert_eq!(env_list("CFG_TEST_LIST_EMPTY", &["nlp"]), vec!["nlp"]);

        std::env::remove_var("CFG_TEST_LIST_UNSET");
        assert_eq!(env_list("CFG_TEST_LIST_UNSET", &["a", "b"]), vec!["a", "b"]);
    }

    #[test]
    fn test_env_opt_string() {
        std::env::set_var("CFG_TEST_OPT_BLANK", "   ");
        assert_eq!(env_opt_string("CFG_TEST_OPT_BLANK"), None);

        std::env::set_var("CFG_TEST_OPT_SET", "weekly");
        assert_eq!(env_opt_string("CFG_TEST_OPT_SET").as_deref(), Some("weekly"));
    }
}
