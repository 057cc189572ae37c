//! Language-model call errors

/// Failure of a single inference call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Call did not complete within its time bound
    #[error("model call timed out after {after_ms}ms")]
    Timeout {
        /// Bound that expired
        after_ms: u64,
    },

    /// Transport-level failure (connection refused, reset, DNS)
    #[error("model transport failed: {0}")]
    Transport(String),

    /// Endpoint answered with a non-success status
    #[error("model endpoint returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// Model returned nothing usable
    #[error("model returned an empty response")]
    EmptyResponse,

    /// Response text could not be parsed into the expected shape
    #[error("malformed model response: {0}")]
    Malformed(String),
}

impl ModelError {
    /// Check if the error is a timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the response arrived but was unusable
    #[inline]
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::EmptyResponse | Self::Malformed(_))
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout { after_ms: 0 };
        }
        if let Some(status) = err.status() {
            return Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        if err.is_decode() {
            return Self::Malformed(err.to_string());
        }
        Self::Transport(err.to_string())
    }
}
