use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("Failed to parse Python code: {0}")]
    TreeSitterError(String),

    #[error("Invalid UTF-8 in source code")]
    InvalidUtf8,

    #[error("Missing {0} in syntax tree")]
    MissingNode(String),
}

/// Errors raised while loading engine options
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    TOMLError(#[from] toml::de::Error),

    #[error("Invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },
}

/// Errors raised while loading a package-interface graph document
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Malformed package graph: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Package graph node {0} is referenced but never defined")]
    DanglingReference(String),
}

/// Errors that abort a build.
///
/// Unresolved names, attributes and imports are never errors; they only reduce precision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Analysis was cancelled")]
    Cancelled,

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LanternError {
    #[error(transparent)]
    ParseError(ParseError),
    #[error(transparent)]
    ConfigError(ConfigError),
    #[error(transparent)]
    GraphError(GraphError),
    #[error(transparent)]
    AnalysisError(AnalysisError),
}

impl From<ParseError> for LanternError {
    fn from(value: ParseError) -> Self {
        Self::ParseError(value)
    }
}

impl From<ConfigError> for LanternError {
    fn from(value: ConfigError) -> Self {
        Self::ConfigError(value)
    }
}

impl From<GraphError> for LanternError {
    fn from(value: GraphError) -> Self {
        Self::GraphError(value)
    }
}

impl From<AnalysisError> for LanternError {
    fn from(value: AnalysisError) -> Self {
        Self::AnalysisError(value)
    }
}

pub type Result<T> = std::result::Result<T, LanternError>;
