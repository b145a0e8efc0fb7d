//! Configuration validation.
//!
//! Semantic checks that serde cannot express. Returns all violations, not
//! just the first, so an operator can fix a config file in one pass.

use crate::config::schema::AppConfig;

/// A single semantic violation in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: &'static str,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate an [`AppConfig`], collecting every violation.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut check = |ok: bool, field: &'static str, message: &'static str| {
        if !ok {
            errors.push(ValidationError { field, message });
        }
    };

    check(
        config.server.request_timeout_secs > 0,
        "server.request_timeout_secs",
        "must be greater than zero",
    );
    check(
        config.db.max_connections > 0,
        "db.max_connections",
        "must be greater than zero",
    );
    check(
        config.limiter.requests_per_second > 0.0,
        "limiter.requests_per_second",
        "must be greater than zero",
    );
    check(config.limiter.burst >= 1, "limiter.burst", "must be at least 1");
    check(
        config.limiter.sweep_interval_secs > 0,
        "limiter.sweep_interval_secs",
        "must be greater than zero",
    );
    check(
        config.limiter.idle_after_secs >= config.limiter.sweep_interval_secs,
        "limiter.idle_after_secs",
        "must be at least the sweep interval",
    );
    check(
        config.tokens.authentication_hours > 0,
        "tokens.authentication_hours",
        "must be greater than zero",
    );
    check(
        config.tokens.activation_hours > 0,
        "tokens.activation_hours",
        "must be greater than zero",
    );
    check(
        config.tokens.password_reset_minutes > 0,
        "tokens.password_reset_minutes",
        "must be greater than zero",
    );
    check(
        config
            .cors
            .trusted_origins
            .iter()
            .all(|o| o.contains("://") && !o.ends_with('/')),
        "cors.trusted_origins",
        "must be absolute origins without a trailing slash",
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_violations() {
        let mut config = AppConfig::default();
        config.limiter.requests_per_second = 0.0;
        config.limiter.burst = 0;
        config.db.max_connections = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "limiter.burst"));
    }

    #[test]
    fn trusted_origins_must_be_absolute_without_trailing_slash() {
        let mut config = AppConfig::default();
        config.cors.trusted_origins = vec!["https://app.example.com".into()];
        assert!(validate_config(&config).is_ok());

        for bad in ["app.example.com", "https://app.example.com/"] {
            let mut config = AppConfig::default();
            config.cors.trusted_origins = vec![bad.into()];
            let errors = validate_config(&config).unwrap_err();
            assert!(
                errors.iter().any(|e| e.field == "cors.trusted_origins"),
                "should reject {bad:?}"
            );
        }
    }

    #[test]
    fn idle_window_shorter_than_sweep_is_rejected() {
        let mut config = AppConfig::default();
        config.limiter.idle_after_secs = 10;
        config.limiter.sweep_interval_secs = 60;
        assert!(validate_config(&config).is_err());
    }
}
