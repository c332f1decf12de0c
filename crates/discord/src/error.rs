//! Mapping serenity failures onto gateway-neutral errors.

use {
    herald_channels::{ConnectError, DeliveryError},
    serenity::{gateway::GatewayError, http::HttpError},
};

/// Discord JSON error codes that mean "you may not message this target".
const FORBIDDEN_CODES: &[isize] = &[
    50001, // missing access
    50007, // cannot send messages to this user
    50013, // missing permissions
];

/// Map a failed connect (token check or client build) to a [`ConnectError`].
pub fn connect_error(err: serenity::Error) -> ConnectError {
    if is_rejection(&err) {
        return ConnectError::invalid_credential("gateway rejected authentication");
    }
    match err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 401 =>
        {
            ConnectError::invalid_credential(format!("401: {}", response.error.message))
        },
        serenity::Error::Http(http) => ConnectError::transport(http),
        other => ConnectError::other("discord client error", other),
    }
}

/// Map a failed send to a per-recipient [`DeliveryError`].
pub fn delivery_error(err: &serenity::Error) -> DeliveryError {
    match err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => classify_http(
            response.status_code.as_u16(),
            response.error.code,
            &response.error.message,
        ),
        other => DeliveryError::Transport(other.to_string()),
    }
}

fn classify_http(status: u16, code: isize, message: &str) -> DeliveryError {
    if status == 403 || FORBIDDEN_CODES.contains(&code) {
        DeliveryError::PermissionDenied(format!("{code}: {message}"))
    } else {
        DeliveryError::Transport(format!("http {status} ({code}): {message}"))
    }
}

/// Whether a client loop exit means the token is no longer accepted.
pub fn is_rejection(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Gateway(GatewayError::InvalidAuthentication)
    )
}
