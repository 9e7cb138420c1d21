//! Mapping of HTTP client failures onto transport errors

use steprun_core::port::TransportError;

/// The request never produced a response
pub(crate) fn request_failed(verb: &str, err: reqwest::Error) -> TransportError {
    let kind = if err.is_connect() {
        "connection failed"
    } else if err.is_timeout() {
        "timed out"
    } else {
        "HTTP POST failed"
    };
    TransportError::Request {
        verb: verb.to_string(),
        reason: format!("{}: {}", kind, err),
    }
}

/// Response arrived but its body could not be read
pub(crate) fn body_unreadable(verb: &str, err: reqwest::Error) -> TransportError {
    TransportError::Io(std::io::Error::other(format!(
        "cannot read '{}' response: {}",
        verb, err
    )))
}
