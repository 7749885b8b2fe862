use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode backend response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("invalid interface configuration: {0}")]
    InvalidConfig(String),
    #[error("backend response contained no usable content")]
    EmptyResponse,
    #[error("failed to decode image payload: {0}")]
    Decode(#[from] base64::DecodeError),
}
