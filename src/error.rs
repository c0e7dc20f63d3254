use thiserror::Error;

/// Nothing in the sync pathway is fatal: transport errors feed the backoff
/// loop, parse errors drop the frame, validation errors become a toast, and
/// provider errors fall back to the degraded view.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed payload: {0}")]
    Parse(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("provider unavailable: {0}")]
    Provider(String),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Http(best_effort_message(&err))
    }
}

/// Pulls the most useful description out of a reqwest error for user-facing
/// toasts: status code when present, otherwise the error chain itself.
fn best_effort_message(err: &reqwest::Error) -> String {
    match err.status() {
        Some(status) => format!("{status}: {err}"),
        None => err.to_string(),
    }
}
