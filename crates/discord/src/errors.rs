//! Mapping from serenity errors to bridge error kinds.

use {serenity::http::HttpError, threadmirror_common::Error};

/// Classify a Discord API failure: 404s flag dead threads, 403s surface
/// the reinstall hint, 429s are transient.
pub fn map_api_err(context: &str, e: serenity::Error) -> Error {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) = &e {
        return match resp.status_code.as_u16() {
            404 => Error::not_found(context),
            403 => Error::permission_denied(context),
            429 => Error::throttled(context),
            _ => Error::external(context, e),
        };
    }
    Error::external(context, e)
}
