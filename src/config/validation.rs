use crate::{
    adapters::static_resolver::parse_address,
    config::models::{DiscoveryConfig, parse_interval},
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Discovery configuration validator
pub struct DiscoveryConfigValidator;

impl DiscoveryConfigValidator {
    /// Validate the entire discovery configuration
    pub fn validate(config: &DiscoveryConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = parse_interval("refresh_interval", &config.refresh_interval) {
            errors.push(e);
        }
        if let Err(e) = parse_interval("expire_interval", &config.expire_interval) {
            errors.push(e);
        }

        for addr in &config.customized_addrs {
            if let Err(e) = parse_address(addr) {
                errors.push(ValidationError::InvalidAddress {
                    address: addr.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }
        let mut message = format!("{} errors found:", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("\n  {}. {}", i + 1, error));
        }
        message
    }
}
