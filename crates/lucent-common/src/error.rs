//! Error types shared across the Lucent crates

use thiserror::Error;

/// Result type alias for Lucent operations
pub type Result<T> = std::result::Result<T, LucentError>;

/// Main error type for Lucent
#[derive(Error, Debug)]
pub enum LucentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {setting}: '{value}'")]
    InvalidSetting { setting: String, value: String },

    #[error("Logging error: {0}")]
    Logging(String),
}

impl LucentError {
    /// Create an invalid-setting error for a named configuration key
    pub fn invalid_setting(setting: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidSetting {
            setting: setting.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_setting_message() {
        let err = LucentError::invalid_setting("LOG_LEVEL", "loud");
        assert_eq!(err.to_string(), "Invalid value for LOG_LEVEL: 'loud'");
    }
}
