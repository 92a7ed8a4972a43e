//! Collaborator seams: queueing, authentication, signing and delivery.

use serde::{Deserialize, Serialize};

/// A message handed to a queue as part of one batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Identifier echoed back in the batch response.
    pub id: String,
    pub body: String,
}

/// Queue answer to a batch request.
///
/// Either list may be missing entirely, mirroring queue clients that omit
/// empty sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub successful: Option<Vec<String>>,
    pub failed: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("queue rejected batch for {destination}: {reason}")]
    Rejected { destination: String, reason: String },
}

/// Accepts batches of messages bound for a named destination.
pub trait MessageQueue {
    /// Sends every entry in one request and reports which ids were accepted.
    fn send_batch(
        &mut self,
        entries: &[BatchEntry],
        destination: &str,
    ) -> Result<BatchResponse, QueueError>;
}

impl<Q: MessageQueue + ?Sized> MessageQueue for &mut Q {
    fn send_batch(
        &mut self,
        entries: &[BatchEntry],
        destination: &str,
    ) -> Result<BatchResponse, QueueError> {
        (**self).send_batch(entries, destination)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Request(String),
}

/// Supplies bearer tokens for the inbound endpoint.
pub trait TokenProvider {
    fn acquire_token(&mut self) -> Result<String, AuthError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("signing key unavailable: {0}")]
    Key(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Produces RS256 signatures over a JWS signing input.
pub trait Signer {
    fn sign(&self, signing_input: &[u8]) -> Result<Vec<u8>, SignError>;

    /// PEM-encoded SubjectPublicKeyInfo of the signing key.
    fn public_key_pem(&self) -> Result<String, SignError> {
        Err(SignError::Key("public key export not supported".to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery to {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("delivery to {url} failed: {message}")]
    Transport { url: String, message: String },
}

/// Posts a compact JWS to an inbound endpoint.
pub trait Delivery {
    fn post(&mut self, url: &str, jws: &str, bearer_token: &str) -> Result<(), DeliveryError>;
}

/// Checks that an inbound endpoint answers an authenticated request.
pub trait EndpointCheck {
    fn check(&mut self, url: &str, bearer_token: &str) -> Result<(), DeliveryError>;
}
