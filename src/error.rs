//! Error types.
//!
//! Configuration problems are the only errors this crate surfaces as `Err`
//! values, and they are raised exclusively by the builder; a constructed
//! cache never fails at runtime. Loader failures are captured as
//! [`LoadError`] values, reported through the `on_load_error` listener
//! callback and recorded in the statistics, and the triggering `get` simply
//! returns `None`.

use thiserror::Error;

/// Validation failure raised by [`CacheBuilder::build`](crate::CacheBuilder::build).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// The maximum entry count must be a positive integer.
    #[error("maximum size must be positive, got {0}")]
    InvalidMaximumSize(u64),

    /// The maximum aggregate weight must be a positive integer.
    #[error("maximum weight must be positive, got {0}")]
    InvalidMaximumWeight(u64),

    /// A maximum weight was configured without a weigher function.
    #[error("maximum weight requires a weigher function")]
    MissingWeigher,

    /// Two settings that cannot be combined were both supplied.
    #[error("conflicting settings: {0} and {1}")]
    ConflictingSettings(&'static str, &'static str),

    /// An expiration or refresh duration of zero was supplied.
    #[error("{0} must be a non-zero duration")]
    InvalidExpiration(&'static str),
}

/// A failed load-through attempt.
///
/// Produced when a sync loader panics or an async loader's future panics.
/// Never propagated to `get` callers; delivered to listeners via
/// `on_load_error`.
#[derive(Debug, Clone)]
pub struct LoadError {
    message: String,
}

impl LoadError {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "loader panicked".to_owned());
        LoadError { message }
    }

    /// A human-readable description of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load failed: {}", self.message)
    }
}

impl std::error::Error for LoadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_messages() {
        let err = ConfigurationError::ConflictingSettings("maximum_size", "maximum_weight");
        assert_eq!(
            err.to_string(),
            "conflicting settings: maximum_size and maximum_weight"
        );
        assert_eq!(
            ConfigurationError::InvalidMaximumSize(0).to_string(),
            "maximum size must be positive, got 0"
        );
    }

    #[test]
    fn load_error_from_str_panic() {
        let err = LoadError::from_panic(Box::new("backend down"));
        assert_eq!(err.message(), "backend down");
        assert_eq!(err.to_string(), "load failed: backend down");
    }

    #[test]
    fn load_error_from_string_panic() {
        let err = LoadError::from_panic(Box::new(String::from("timeout")));
        assert_eq!(err.message(), "timeout");
    }

    #[test]
    fn load_error_from_opaque_panic() {
        let err = LoadError::from_panic(Box::new(42_u32));
        assert_eq!(err.message(), "loader panicked");
    }
}
