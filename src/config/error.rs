//! Configuration error types.

use thiserror::Error;

/// Errors while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Errors from semantic validation of loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(&'static str),

    #[error("Broker URL must start with redis:// or rediss://")]
    InvalidBrokerUrl,

    #[error("Server port must be non-zero")]
    InvalidPort,

    #[error("Request timeout must be between 1 and 300 seconds")]
    InvalidTimeout,

    #[error("JWT secret must be at least {0} characters")]
    WeakJwtSecret(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_display_reasons() {
        assert!(ValidationError::MissingRequired("BUS_URL")
            .to_string()
            .contains("BUS_URL"));
        assert!(ValidationError::WeakJwtSecret(16).to_string().contains("16"));
    }
}
