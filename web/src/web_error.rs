//! Maps the core `QError` onto HTTP (§7): client-caused failures become
//! 4xx with a JSON body describing the reason, anything else a 5xx.

use std::fmt;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

use qcache_common::error::QError;

#[derive(Debug, Clone)]
pub struct WebError(pub QError);

impl From<QError> for WebError {
    fn from(err: QError) -> Self {
        WebError(err)
    }
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for WebError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            QError::NotFound(_) => StatusCode::NOT_FOUND,
            QError::MalformedQuery(_) | QError::BadRequest(_) => StatusCode::BAD_REQUEST,
            QError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            QError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            QError::Unauthorized => StatusCode::UNAUTHORIZED,
            QError::CapacityExceeded(_, _) => StatusCode::INTERNAL_SERVER_ERROR,
            QError::ShardUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            QError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if matches!(self.0, QError::Unauthorized) {
            builder.insert_header(("WWW-Authenticate", "Basic realm=\"qcache\""));
        }
        builder.json(ErrorBody { error: self.0.to_string() })
    }
}
