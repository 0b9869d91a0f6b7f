//! Coordinator configuration loaded from the environment.

use std::time::Duration;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Tunable parameters of the session coordinator.
///
/// The timing values were tuned empirically; they are parameters here,
/// not invariants.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Base URL of the external credential service.
    pub credential_base_url: String,
    /// BCP-47 language tag handed to the realtime channel.
    pub language: String,
    /// How long after an attempt starts a disconnect still counts as an
    /// early failure eligible for the fallback transport.
    pub early_disconnect_window: Duration,
    /// Pause between tearing down one channel and opening the next.
    pub settle_delay: Duration,
    /// Budget for a single content-collaborator call inside a tool.
    pub content_timeout: Duration,
    /// Pins greeting selection; `None` draws a fresh seed per builder.
    pub greeting_seed: Option<u64>,
}

impl SessionConfig {
    /// Config with defaults for everything but the credential service.
    pub fn new(credential_base_url: impl Into<String>) -> Self {
        Self {
            credential_base_url: credential_base_url.into(),
            language: "en-US".to_string(),
            early_disconnect_window: Duration::from_millis(7000),
            settle_delay: Duration::from_millis(300),
            content_timeout: Duration::from_millis(4000),
            greeting_seed: None,
        }
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let credential_base_url = std::env::var("VIVA_CREDENTIAL_URL")
            .map_err(|_| ConfigError::MissingVar("VIVA_CREDENTIAL_URL".to_string()))?;

        let language = std::env::var("VIVA_LANGUAGE").unwrap_or_else(|_| "en-US".to_string());

        let early_disconnect_window = ms_var("VIVA_EARLY_DISCONNECT_MS", 7000)?;
        let settle_delay = ms_var("VIVA_SETTLE_DELAY_MS", 300)?;
        let content_timeout = ms_var("VIVA_CONTENT_TIMEOUT_MS", 4000)?;

        let greeting_seed = match std::env::var("VIVA_GREETING_SEED") {
            Ok(raw) => Some(raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(
                    "VIVA_GREETING_SEED".to_string(),
                    format!("'{}' is not a valid seed", raw),
                )
            })?),
            Err(_) => None,
        };

        Ok(Self {
            credential_base_url,
            language,
            early_disconnect_window,
            settle_delay,
            content_timeout,
            greeting_seed,
        })
    }
}

fn ms_var(name: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => {
            let millis = raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(
                    name.to_string(),
                    format!("'{}' is not a valid millisecond count", raw),
                )
            })?;
            Ok(Duration::from_millis(millis))
        }
        Err(_) => Ok(Duration::from_millis(default)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("VIVA_CREDENTIAL_URL");
            env::remove_var("VIVA_LANGUAGE");
            env::remove_var("VIVA_EARLY_DISCONNECT_MS");
            env::remove_var("VIVA_SETTLE_DELAY_MS");
            env::remove_var("VIVA_CONTENT_TIMEOUT_MS");
            env::remove_var("VIVA_GREETING_SEED");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value = ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();
        unsafe {
            env::set_var("VIVA_CREDENTIAL_URL", "https://tokens.example.com");
        }

        let config = SessionConfig::from_env().expect("Config should load successfully");

        assert_eq!(config.credential_base_url, "https://tokens.example.com");
        assert_eq!(config.language, "en-US");
        assert_eq!(config.early_disconnect_window, Duration::from_millis(7000));
        assert_eq!(config.settle_delay, Duration::from_millis(300));
        assert_eq!(config.content_timeout, Duration::from_millis(4000));
        assert_eq!(config.greeting_seed, None);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("VIVA_CREDENTIAL_URL", "http://localhost:9000");
            env::set_var("VIVA_LANGUAGE", "de-DE");
            env::set_var("VIVA_EARLY_DISCONNECT_MS", "5000");
            env::set_var("VIVA_SETTLE_DELAY_MS", "150");
            env::set_var("VIVA_CONTENT_TIMEOUT_MS", "2500");
            env::set_var("VIVA_GREETING_SEED", "42");
        }

        let config = SessionConfig::from_env().expect("Config should load successfully");

        assert_eq!(config.credential_base_url, "http://localhost:9000");
        assert_eq!(config.language, "de-DE");
        assert_eq!(config.early_disconnect_window, Duration::from_millis(5000));
        assert_eq!(config.settle_delay, Duration::from_millis(150));
        assert_eq!(config.content_timeout, Duration::from_millis(2500));
        assert_eq!(config.greeting_seed, Some(42));
    }

    #[test]
    #[serial]
    fn test_config_missing_credential_url() {
        clear_env_vars();

        let err = SessionConfig::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(name) => assert_eq!(name, "VIVA_CREDENTIAL_URL"),
            _ => panic!("Expected MissingVar for VIVA_CREDENTIAL_URL"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_window() {
        clear_env_vars();
        unsafe {
            env::set_var("VIVA_CREDENTIAL_URL", "https://tokens.example.com");
            env::set_var("VIVA_EARLY_DISCONNECT_MS", "soon");
        }

        let err = SessionConfig::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "VIVA_EARLY_DISCONNECT_MS"),
            _ => panic!("Expected InvalidValue for VIVA_EARLY_DISCONNECT_MS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_seed() {
        clear_env_vars();
        unsafe {
            env::set_var("VIVA_CREDENTIAL_URL", "https://tokens.example.com");
            env::set_var("VIVA_GREETING_SEED", "lucky");
        }

        let err = SessionConfig::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "VIVA_GREETING_SEED"),
            _ => panic!("Expected InvalidValue for VIVA_GREETING_SEED"),
        }
    }

    #[test]
    fn test_new_applies_defaults() {
        let config = SessionConfig::new("https://tokens.example.com");
        assert_eq!(config.language, "en-US");
        assert_eq!(config.early_disconnect_window, Duration::from_millis(7000));
    }
}
