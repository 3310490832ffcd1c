use http::StatusCode;
use thiserror::Error;

/// Coordinator-local error taxonomy. Bus/cache failures wrap the library
/// crates' own error types; `State` covers the "event for unknown session"
/// taxon of the error handling design, and `Auth`/`Decode` cover the
/// websocket upgrade and reader-loop paths respectively.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown session: {0}")]
    State(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("evaluator error: {0}")]
    Evaluator(String),

    #[error("cache error: {0}")]
    Cache(#[from] quiz_cache::CacheError),

    #[error("bus error: {0}")]
    Bus(#[from] quiz_bus::BusError),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn to_status(&self) -> StatusCode {
        match self {
            Error::State(_) => StatusCode::NOT_FOUND,
            Error::Decode(_) => StatusCode::BAD_REQUEST,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
