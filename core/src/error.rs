use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};

#[derive(Debug)]
pub enum Error {
    AppState {
        message: String,
    },
    Database {
        message: String,
    },
    NotFound {
        resource: &'static str,
        id: String,
    },
    Gone {
        message: String,
    },
    Conflict {
        message: String,
    },
    InvalidRequest {
        message: String,
    },
    JsonRequest {
        message: String,
    },
    Observability {
        message: String,
    },
    Serialization {
        message: String,
    },
}

impl Error {
    /// Defines the error level for logging this error
    fn level(&self) -> tracing::Level {
        match self {
            Error::AppState { .. } => tracing::Level::ERROR,
            Error::Database { .. } => tracing::Level::ERROR,
            Error::NotFound { .. } => tracing::Level::DEBUG,
            Error::Gone { .. } => tracing::Level::DEBUG,
            Error::Conflict { .. } => tracing::Level::WARN,
            Error::InvalidRequest { .. } => tracing::Level::WARN,
            Error::JsonRequest { .. } => tracing::Level::WARN,
            Error::Observability { .. } => tracing::Level::ERROR,
            Error::Serialization { .. } => tracing::Level::ERROR,
        }
    }

    /// Defines the HTTP status code for responses involving this error
    fn status_code(&self) -> StatusCode {
        match self {
            Error::AppState { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Gone { .. } => StatusCode::GONE,
            Error::Conflict { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Error::JsonRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Observability { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log the error using the `tracing` library
    pub fn log(&self) {
        match self.level() {
            tracing::Level::ERROR => tracing::error!("{self}"),
            tracing::Level::WARN => tracing::warn!("{self}"),
            tracing::Level::INFO => tracing::info!("{self}"),
            tracing::Level::DEBUG => tracing::debug!("{self}"),
            tracing::Level::TRACE => tracing::trace!("{self}"),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::AppState { message } => write!(f, "Error initializing AppState: {message}"),
            Error::Database { message } => write!(f, "Database error: {message}"),
            Error::NotFound { resource, id } => write!(f, "{resource} not found: {id}"),
            Error::Gone { message } => write!(f, "{message}"),
            Error::Conflict { message } => write!(f, "{message}"),
            Error::InvalidRequest { message } => write!(f, "{message}"),
            Error::JsonRequest { message } => write!(f, "{message}"),
            Error::Observability { message } => write!(f, "{message}"),
            Error::Serialization { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database {
            message: err.to_string(),
        }
    }
}

impl IntoResponse for Error {
    /// Log the error and convert it into an Axum response
    fn into_response(self) -> Response {
        self.log();
        let body = json!({"error": self.to_string()});
        (self.status_code(), Json(body)).into_response()
    }
}

pub trait ResultExt<T> {
    fn ok_or_log(self) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn ok_or_log(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                error.log();
                None
            }
        }
    }
}
