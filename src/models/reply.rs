use serde::Deserialize;

/// Success body of the upload and reset endpoints.
#[derive(Debug, Deserialize)]
pub struct MessageReply {
    pub message: String,
}

/// Error body the service attaches to non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}
