use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Upstream returned a non-success status. 401 means the key was revoked
    /// or never valid; 429 means the rate limit tripped despite batching.
    #[error("API error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_displays_status_and_message() {
        let err = ApiError::Http {
            status: 401,
            message: "Unauthorized".into(),
        };
        assert_eq!(err.to_string(), "API error 401: Unauthorized");
    }
}
