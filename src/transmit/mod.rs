//! Signs queued SETs and delivers them to their inbound endpoint.

pub mod jws;

use crate::core::event::QueuedRecord;
use crate::core::traits::{
    AuthError, Delivery, DeliveryError, SignError, Signer, TokenProvider,
};
use jws::Jws;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    #[error("There are no records to transmit")]
    NoRecords,
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Reason a single record could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record body is not valid JSON: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("The record is missing at least one of the destination or SET")]
    MissingField,
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Identifier of a record the caller should redeliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub item_identifier: String,
}

/// Records that failed, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailures {
    pub batch_item_failures: Vec<ItemFailure>,
}

/// Delivers queued SETs with one bearer token per batch.
pub struct Transmitter<S, T, D> {
    signer: S,
    tokens: T,
    delivery: D,
}

impl<S, T, D> Transmitter<S, T, D>
where
    S: Signer,
    T: TokenProvider,
    D: Delivery,
{
    pub fn new(signer: S, tokens: T, delivery: D) -> Self {
        Self {
            signer,
            tokens,
            delivery,
        }
    }

    pub fn into_parts(self) -> (S, T, D) {
        (self.signer, self.tokens, self.delivery)
    }

    /// Signs and posts every record, collecting the ids that failed.
    ///
    /// A failing record does not stop the batch. Only an empty batch or a
    /// token failure aborts the call.
    pub fn transmit(
        &mut self,
        records: &[QueuedRecord],
    ) -> Result<BatchItemFailures, TransmitError> {
        if records.is_empty() {
            return Err(TransmitError::NoRecords);
        }
        let token = self.tokens.acquire_token()?;

        let mut failures = BatchItemFailures::default();
        for record in records {
            match self.deliver(record, &token) {
                Ok(destination) => {
                    info!(message_id = %record.message_id, %destination, "SET delivered");
                }
                Err(err) => {
                    error!(message_id = %record.message_id, error = %err, "SET delivery failed");
                    failures.batch_item_failures.push(ItemFailure {
                        item_identifier: record.message_id.clone(),
                    });
                }
            }
        }
        info!(
            records = records.len(),
            failed = failures.batch_item_failures.len(),
            "transmit batch complete"
        );
        Ok(failures)
    }

    fn deliver(&mut self, record: &QueuedRecord, token: &str) -> Result<String, RecordError> {
        let envelope: Value = serde_json::from_str(&record.body)?;
        let set = envelope
            .get("SET")
            .filter(|set| !set.is_null())
            .ok_or(RecordError::MissingField)?;
        let destination = envelope
            .get("destination")
            .and_then(Value::as_str)
            .filter(|destination| !destination.is_empty())
            .ok_or(RecordError::MissingField)?;

        let jws = Jws::build(set, &self.signer)?;
        self.delivery.post(destination, &jws.to_string(), token)?;
        Ok(destination.to_string())
    }
}

/// HTTP-shaped answer to a public key request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub status_code: u16,
    pub body: String,
}

/// Exports the signer's public key so receivers can verify delivered SETs.
///
/// Answers 200 with the PEM body, or 500 when the key cannot be exported.
pub fn public_key_response(signer: &impl Signer) -> PublicKeyResponse {
    match signer.public_key_pem() {
        Ok(pem) => PublicKeyResponse {
            status_code: 200,
            body: pem,
        },
        Err(err) => {
            error!(error = %err, "public key request failed");
            PublicKeyResponse {
                status_code: 500,
                body: "Public key request failed".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticSigner;

    impl Signer for StaticSigner {
        fn sign(&self, _signing_input: &[u8]) -> Result<Vec<u8>, SignError> {
            Ok(b"sig".to_vec())
        }
    }

    struct CountingTokens {
        issued: usize,
        fail: bool,
    }

    impl TokenProvider for CountingTokens {
        fn acquire_token(&mut self) -> Result<String, AuthError> {
            if self.fail {
                return Err(AuthError::Request("401 from token endpoint".to_string()));
            }
            self.issued += 1;
            Ok(format!("token-{}", self.issued))
        }
    }

    /// Records posts and answers 500 for the `down` endpoint.
    #[derive(Default)]
    struct RecordingDelivery {
        posts: Vec<(String, String, String)>,
    }

    impl Delivery for RecordingDelivery {
        fn post(&mut self, url: &str, jws: &str, bearer_token: &str) -> Result<(), DeliveryError> {
            if url == "https://down.test" {
                return Err(DeliveryError::Status {
                    url: url.to_string(),
                    status: 500,
                });
            }
            self.posts
                .push((url.to_string(), jws.to_string(), bearer_token.to_string()));
            Ok(())
        }
    }

    type TestTransmitter = Transmitter<StaticSigner, CountingTokens, RecordingDelivery>;

    fn transmitter(fail_auth: bool) -> TestTransmitter {
        Transmitter::new(
            StaticSigner,
            CountingTokens {
                issued: 0,
                fail: fail_auth,
            },
            RecordingDelivery::default(),
        )
    }

    fn record(id: &str, body: Value) -> QueuedRecord {
        QueuedRecord {
            message_id: id.to_string(),
            body: body.to_string(),
        }
    }

    fn queued(destination: &str) -> Value {
        json!({
            "SET": { "iss": "https://MockRP1.account.gov.uk/publicKey/" },
            "destination": destination,
        })
    }

    #[test]
    fn empty_batch_is_rejected_before_auth() {
        let mut transmitter = transmitter(false);
        assert!(matches!(transmitter.transmit(&[]), Err(TransmitError::NoRecords)));
        let (_, tokens, _) = transmitter.into_parts();
        assert_eq!(tokens.issued, 0);
    }

    #[test]
    fn one_token_signs_the_whole_batch() {
        let mut transmitter = transmitter(false);
        let records = vec![
            record("m1", queued("https://receiver.test")),
            record("m2", queued("https://receiver.test")),
        ];
        let failures = transmitter.transmit(&records).expect("transmit");
        assert!(failures.batch_item_failures.is_empty());

        let (_, tokens, delivery) = transmitter.into_parts();
        assert_eq!(tokens.issued, 1);
        assert_eq!(delivery.posts.len(), 2);
        let (url, jws, bearer) = &delivery.posts[0];
        assert_eq!(url, "https://receiver.test");
        assert_eq!(bearer, "token-1");
        assert_eq!(jws.split('.').count(), 3);
        assert!(jws.ends_with(".c2ln"));
    }

    #[test]
    fn bad_records_are_reported_and_skipped() {
        let mut transmitter = transmitter(false);
        let records = vec![
            record("good", queued("https://receiver.test")),
            QueuedRecord {
                message_id: "not-json".to_string(),
                body: "{".to_string(),
            },
            record("no-set", json!({ "destination": "https://receiver.test" })),
            record("no-destination", json!({ "SET": { "iss": "x" } })),
            record("down", queued("https://down.test")),
        ];
        let failures = transmitter.transmit(&records).expect("transmit");
        let ids: Vec<&str> = failures
            .batch_item_failures
            .iter()
            .map(|failure| failure.item_identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["not-json", "no-set", "no-destination", "down"]);

        let (_, _, delivery) = transmitter.into_parts();
        assert_eq!(delivery.posts.len(), 1);
    }

    #[test]
    fn auth_failure_aborts_the_batch() {
        let mut transmitter = transmitter(true);
        let records = vec![record("m1", queued("https://receiver.test"))];
        assert!(matches!(
            transmitter.transmit(&records),
            Err(TransmitError::Auth(_))
        ));
    }

    #[test]
    fn failures_serialize_for_queue_redelivery() {
        let failures = BatchItemFailures {
            batch_item_failures: vec![ItemFailure {
                item_identifier: "m1".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&failures).expect("serialize"),
            json!({ "batchItemFailures": [{ "itemIdentifier": "m1" }] })
        );
    }

    struct PemSigner;

    impl Signer for PemSigner {
        fn sign(&self, _signing_input: &[u8]) -> Result<Vec<u8>, SignError> {
            Ok(Vec::new())
        }

        fn public_key_pem(&self) -> Result<String, SignError> {
            Ok("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n".to_string())
        }
    }

    #[test]
    fn public_key_is_served_as_pem() {
        let response = public_key_response(&PemSigner);
        assert_eq!(response.status_code, 200);
        assert!(response.body.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert_eq!(
            serde_json::to_value(&response).expect("serialize")["statusCode"],
            json!(200)
        );
    }

    #[test]
    fn signer_without_key_export_answers_500() {
        let response = public_key_response(&StaticSigner);
        assert_eq!(
            response,
            PublicKeyResponse {
                status_code: 500,
                body: "Public key request failed".to_string(),
            }
        );
    }
}
