//! Configuration validation errors shared by every engine component

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid threshold {name}: {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("Invalid amount for {name}: {value}")]
    InvalidAmount { name: String, value: f64 },

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Reject NaN/infinite and negative dollar figures
pub fn check_dollars(name: &str, value: f64) -> ConfigResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidAmount {
            name: name.to_string(),
            value,
        });
    }
    Ok(())
}
