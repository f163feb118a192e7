//! Configuration validation for the Alice skill service.
//!
//! Checks that timing values are consistent with each other: a turn must
//! give up before the platform deadline, and a backend call must be allowed
//! to outlive a turn so it can still be collected on the next one.

use thiserror::Error;

use crate::config::{
    Config, DialogConfig, NetworkConfig, ObservabilityConfig, OracleConfig, SessionsConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.network.validate() {
            errors.push(e);
        }
        if let Err(e) = self.dialog.validate() {
            errors.push(e);
        }
        if let Err(e) = self.sessions.validate() {
            errors.push(e);
        }
        if let Err(e) = self.oracle.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Err(e) = self.check_timing() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// A backend call shorter than the turn wait could never be collected later.
    fn check_timing(&self) -> ValidationResult<()> {
        let oracle_ms = self.oracle.timeout_secs.saturating_mul(1000);
        if oracle_ms < self.dialog.answer_timeout_ms {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "oracle.timeout_secs ({}s) is shorter than dialog.answer_timeout_ms ({}ms)",
                    self.oracle.timeout_secs, self.dialog.answer_timeout_ms
                ),
            });
        }
        Ok(())
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "network.port".into(),
            });
        }
        if self.bind.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "network.bind".into(),
            });
        }
        Ok(())
    }
}

impl Validate for DialogConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.answer_timeout_ms == 0 {
            return Err(ValidationError::InvalidValue {
                field: "dialog.answer_timeout_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.answer_timeout_ms >= self.platform_deadline_ms {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "dialog.answer_timeout_ms ({}) must be below dialog.platform_deadline_ms ({})",
                    self.answer_timeout_ms, self.platform_deadline_ms
                ),
            });
        }

        for (field, value) in [
            ("dialog.prompt_text", &self.prompt_text),
            ("dialog.thinking_text", &self.thinking_text),
            ("dialog.not_ready_text", &self.not_ready_text),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: field.into(),
                });
            }
        }

        Ok(())
    }
}

impl Validate for SessionsConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.ttl_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "sessions.ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_entries == 0 {
            return Err(ValidationError::InvalidValue {
                field: "sessions.max_entries".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "sessions.sweep_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for OracleConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "oracle.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ValidationError::InvalidValue {
                field: "oracle.endpoint".into(),
                reason: "must be an http(s) URL".into(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "oracle.model".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "invalid".into();
        let result = config.validate();
        assert!(result.is_err());
        if let Err(ValidationError::InvalidValue { field, .. }) = result {
            assert_eq!(field, "observability.log_level");
        }
    }

    #[test]
    fn test_answer_timeout_must_beat_platform_deadline() {
        let mut config = Config::default();
        config.dialog.answer_timeout_ms = 8_000;
        config.oracle.timeout_secs = 10;
        let result = config.validate();
        assert!(matches!(result, Err(ValidationError::Conflict { .. })));
    }

    #[test]
    fn test_oracle_timeout_shorter_than_turn_wait() {
        let mut config = Config::default();
        config.dialog.answer_timeout_ms = 4_500;
        config.oracle.timeout_secs = 4;
        match config.validate() {
            Err(ValidationError::Conflict { reason }) => assert!(reason.contains("oracle")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_zero_ttl_and_capacity() {
        let mut config = Config::default();
        config.sessions.ttl_secs = 0;
        config.sessions.max_entries = 0;
        // Each section reports its first problem only.
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_multiple_errors_are_collected() {
        let mut config = Config::default();
        config.network.port = 0;
        config.sessions.max_entries = 0;
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_endpoint_must_be_http() {
        let mut oracle = OracleConfig::default();
        oracle.endpoint = "api.openai.com".into();
        assert!(oracle.validate().is_err());
    }
}
