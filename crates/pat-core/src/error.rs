use thiserror::Error;

/// Top-level error type for PAT.
///
/// Insufficient history is never an error: indicators and risk fields
/// report it as `None`. Only conditions that make a single call
/// meaningless surface here.
#[derive(Debug, Error)]
pub enum PatError {
    /// Malformed symbol, negative price, past expiry, mismatched series.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A numerical solver failed to converge (e.g. implied volatility).
    #[error("no convergence: {0}")]
    NoConvergence(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PatError {
    /// Shorthand for [`PatError::InvalidInput`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            PatError::invalid("negative spot").to_string(),
            "invalid input: negative spot"
        );
        assert_eq!(
            PatError::NoConvergence("iv".into()).to_string(),
            "no convergence: iv"
        );
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<Vec<f64>>("not json").unwrap_err();
        let pat: PatError = err.into();
        assert!(matches!(pat, PatError::Serialization(_)));
    }
}
