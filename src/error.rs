//! Error taxonomy (spec.md §7).
//!
//! KV and neighbor-map errors are caught at the HTTP boundary and returned
//! as a 200 OK `{message}` body — the source surfaces failures in-band.
//! Only malformed JSON and genuine transport failures escape as non-2xx
//! responses.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CanError {
    /// A local operation was invoked with a point outside the local zone.
    /// Internal bug indicator — the caller should have routed elsewhere.
    #[error("point not in zone")]
    OutOfZone,

    #[error("Key already exists in map")]
    Exists,

    #[error("Key does not exist in map")]
    Missing,

    #[error("neighbor already present")]
    AlreadyNeighbor,

    #[error("neighbor not found")]
    UnknownNeighbor,

    #[error("no route to point: {0}")]
    RouteFailure(String),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("forwarding failed: {0}")]
    Forwarding(String),
}

impl CanError {
    /// The message carried in the in-band `{message}` JSON envelope.
    pub fn message(&self) -> String {
        self.to_string()
    }
}
