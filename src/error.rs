use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

// Seconds a rate-limited client is told to wait
const RETRY_AFTER_SECS: u64 = 60;

// Errors returned to HTTP clients, every variant is terminal for the request
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid or missing API key")]
    Unauthenticated,

    #[error("{0}")]
    TooLarge(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));

        if let ApiError::RateLimited(_) = self {
            return (
                status,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS.to_string())],
                body,
            )
                .into_response();
        }
        (status, body).into_response()
    }
}

// Failures inside tool collaborators, reported back to the model instead of the client
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unknown tool {0}")]
    UnknownTool(String),

    #[error("could not decode content: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("{0}")]
    NotConfigured(&'static str),

    #[error("refusing to fetch {0}: not a public address")]
    Forbidden(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}
