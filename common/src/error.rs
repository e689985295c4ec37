use thiserror::Error;

/// Result alias used across every QCache crate.
pub type QResult<T> = Result<T, QError>;

/// The closed set of error kinds the core can raise (§7). Each caller at a
/// boundary (shard, front-end, HTTP handler) maps these to the
/// transport-appropriate representation; the core itself never panics on
/// a malformed query or a missing key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QError {
    /// Key absent, or present but TTL-expired at read time.
    #[error("dataset not found: {0}")]
    NotFound(String),

    /// The query or update AST violates one of the rules in §4.3.
    /// The string identifies the offending sub-AST, matching the
    /// human-readable-reason requirement of §4.3.7.
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// Content-Type not in {csv, json}, or an unsupported charset.
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    /// No acceptable response content-type could be produced for the
    /// request's `Accept` header.
    #[error("not acceptable: {0}")]
    NotAcceptable(String),

    /// Basic-auth credentials missing or wrong.
    #[error("unauthorized")]
    Unauthorized,

    /// Unrecognized `Content-Encoding`, invalid type hint, or any other
    /// request shape the boundary can't parse.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A dataset is larger than the shard's configured `max_size`; no
    /// partial insert is ever performed.
    #[error("capacity exceeded: {0} bytes requested, {1} bytes max")]
    CapacityExceeded(usize, usize),

    /// The target shard or the L2 process did not respond (transport
    /// worker gone, channel closed).
    #[error("shard unavailable: {0}")]
    ShardUnavailable(String),

    /// Anything from `std::io` surfacing through CSV/JSON parsing.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for QError {
    fn from(err: std::io::Error) -> Self {
        QError::Io(err.to_string())
    }
}

impl QError {
    /// Whether this error is the caller's fault (4xx-shaped) as opposed to
    /// an operational failure (5xx-shaped). Used by the HTTP boundary.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QError::NotFound(_)
                | QError::MalformedQuery(_)
                | QError::UnsupportedMedia(_)
                | QError::NotAcceptable(_)
                | QError::Unauthorized
                | QError::BadRequest(_)
        )
    }
}
