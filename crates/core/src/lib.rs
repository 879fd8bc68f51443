//! Lantern Core - shared plumbing for the inference engine
//!
//! This crate holds what every other lantern crate depends on:
//! - Error types for parsing, configuration, graph loading and analysis
//! - Cooperative cancellation with a bounded call budget
//! - Logging setup for hosts

pub mod cancel;
pub mod errors;
pub mod logging;

pub use cancel::*;
pub use errors::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_error_converts_to_lantern_error() {
        let err: LanternError = AnalysisError::Cancelled.into();
        assert!(matches!(err, LanternError::AnalysisError(AnalysisError::Cancelled)));
        assert_eq!(err.to_string(), "Analysis was cancelled");
    }

    #[test]
    fn test_invariant_violation_message() {
        let err = AnalysisError::InvariantViolation("symbol a.b diverged".to_string());
        assert_eq!(err.to_string(), "Invariant violation: symbol a.b diverged");
    }

    #[test]
    fn test_config_error_from_toml() {
        let toml_err = toml::from_str::<toml::Table>("passes = [").unwrap_err();
        let err: LanternError = ConfigError::from(toml_err).into();
        assert!(err.to_string().starts_with("Invalid TOML"));
    }

    #[test]
    fn test_call_error_from_cancelled() {
        assert_eq!(CallError::from(AnalysisError::Cancelled), CallError::Cancelled);
    }
}
