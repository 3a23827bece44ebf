//! Classify fetch errors into retry policy error kinds.

use super::error::FetchError;
use super::policy::ErrorKind;

/// Classify an HTTP status code reported by a source.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code),
        _ => ErrorKind::Other,
    }
}

/// Classify a provider error into an ErrorKind.
pub fn classify(e: &FetchError) -> ErrorKind {
    match e {
        FetchError::Timeout => ErrorKind::Timeout,
        FetchError::Connection(_) => ErrorKind::Connection,
        FetchError::Throttled(_) => ErrorKind::Throttled,
        FetchError::Remote { status } => classify_http_status(*status),
        FetchError::NotFound(_) | FetchError::Other(_) => ErrorKind::Other,
    }
}
