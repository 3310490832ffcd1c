use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

/// Evaluator-local error taxonomy. The service is a thin request/response
/// wrapper around the cache, so almost every failure path bottoms out in
/// `Cache`; `Decode` covers a malformed `SessionAnswers` body at the HTTP
/// boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("cache error: {0}")]
    Cache(#[from] quiz_cache::CacheError),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    pub fn to_status(&self) -> StatusCode {
        match self {
            Error::Decode(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_status();
        (status, self.to_string()).into_response()
    }
}
