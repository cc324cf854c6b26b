use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinditError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("API request failed with status {status} after {retries} retries")]
    ApiErrorAfterRetries { status: u16, retries: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Build {build} has no commit position")]
    MissingCommitPosition { build: u64 },

    #[error("No completed builds found for {master}/{builder}")]
    NoCompletedBuilds { master: String, builder: String },

    #[error("Bisection exceeded the limit of {limit} build lookups")]
    ProbeLimitExceeded { limit: usize },
}

impl FinditError {
    /// Whether the surrounding task should retry the operation later.
    ///
    /// Bisection cannot produce a bound without build info, so transport
    /// failures surface here instead of being swallowed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::ApiErrorAfterRetries { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FinditError>;
