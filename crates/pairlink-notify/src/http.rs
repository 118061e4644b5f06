use std::time::Duration;

use pairlink_core::CollaboratorError;

/// Build a client with the given overall request timeout.
pub fn client(timeout: Duration) -> Result<reqwest::Client, CollaboratorError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| CollaboratorError::Network(e.to_string()))
}

/// Map a transport failure to a collaborator error.
pub fn classify(err: reqwest::Error, timeout: Duration) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout(timeout)
    } else {
        CollaboratorError::Network(err.to_string())
    }
}

/// Turn a non-success response into an error, keeping the body for logs.
pub async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, CollaboratorError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CollaboratorError::from_status(status.as_u16(), body))
}
