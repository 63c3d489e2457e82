//! Typed errors for the delivery path

use thiserror::Error;

/// A failed attempt to hand an event to the collector.
///
/// These never escape [`crate::transport::Collector::deliver`]; they are
/// only surfaced to the failure reporter or to callers of `try_deliver`.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("HTTP request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("collector rejected event with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("delivery queue full, event dropped")]
    QueueFull,

    #[error("delivery queue closed, event dropped")]
    QueueClosed,
}

/// Failure to read a principal off a request.
#[derive(Debug, Error)]
#[error("unable to determine authenticated principal: {0}")]
pub struct AuthError(pub String);

/// Failure to extract method-specific body parameters.
#[derive(Debug, Error)]
#[error("unable to read {method} parameters: {reason}")]
pub struct ExtractError {
    pub method: String,
    pub reason: String,
}
