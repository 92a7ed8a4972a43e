//! Bounded retry loop that generates, batches and queues SETs.

use super::batch::{BatchError, BatchSender, MAX_BATCH_SIZE};
use crate::core::config::{ConfigParams, Environment, RunConfig, ValidationError};
use crate::core::event::QueuedSet;
use crate::core::traits::{AuthError, DeliveryError, EndpointCheck, MessageQueue, TokenProvider};
use crate::sources::ssf::{synthesize, SynthesisError};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Rounds attempted before leftover failures are reported as unsent.
pub const MAX_SEND_ATTEMPTS: u32 = 5;

/// Totals accumulated over every round of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub messages_sent: u64,
    pub send_attempts: u32,
    pub unsent_messages: u64,
    pub total_failed_message_attempts: u64,
    pub config_params: RunConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum HealthCheckError {
    #[error("inbound endpoint health check could not get a token: {0}")]
    Auth(#[from] AuthError),
    #[error("inbound endpoint health check failed: {0}")]
    Endpoint(#[from] DeliveryError),
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    HealthCheck(#[from] HealthCheckError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("failed to encode queued message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Resolves the run config and queues `numMessages` SETs to `destination`.
///
/// Each round regenerates as many fresh tokens as failed in the previous
/// round. The loop stops once everything is accepted or after
/// [`MAX_SEND_ATTEMPTS`] rounds.
pub fn run_generation<Q, R>(
    raw_overrides: Option<&Value>,
    environment: Environment,
    queue: Q,
    destination: &str,
    rng: &mut R,
) -> Result<GenerationReport, GenerationError>
where
    Q: MessageQueue,
    R: Rng,
{
    let config = resolve_config(raw_overrides, environment)?;
    queue_messages(config, environment, queue, destination, rng)
}

/// Like [`run_generation`], but first checks that the resolved inbound
/// endpoint answers an authenticated request. A failed check aborts the run
/// before anything is queued.
pub fn run_checked_generation<Q, R, T, E>(
    raw_overrides: Option<&Value>,
    environment: Environment,
    queue: Q,
    destination: &str,
    rng: &mut R,
    tokens: &mut T,
    endpoint: &mut E,
) -> Result<GenerationReport, GenerationError>
where
    Q: MessageQueue,
    R: Rng,
    T: TokenProvider,
    E: EndpointCheck,
{
    let config = resolve_config(raw_overrides, environment)?;
    check_inbound_endpoint(&config.inbound_endpoint_url, tokens, endpoint)?;
    queue_messages(config, environment, queue, destination, rng)
}

/// Sends one bearer-authenticated request to `url`.
pub fn check_inbound_endpoint(
    url: &str,
    tokens: &mut impl TokenProvider,
    endpoint: &mut impl EndpointCheck,
) -> Result<(), HealthCheckError> {
    let token = tokens.acquire_token()?;
    match endpoint.check(url, &token) {
        Ok(()) => {
            info!(url, "inbound endpoint health check passed");
            Ok(())
        }
        Err(err) => {
            error!(url, error = %err, "inbound endpoint health check failed");
            Err(err.into())
        }
    }
}

fn resolve_config(
    raw_overrides: Option<&Value>,
    environment: Environment,
) -> Result<RunConfig, ValidationError> {
    let mut params = ConfigParams::new(environment);
    if let Some(raw) = raw_overrides {
        params.apply_overrides(raw)?;
    }
    Ok(params.into_config())
}

fn queue_messages<Q, R>(
    config: RunConfig,
    environment: Environment,
    queue: Q,
    destination: &str,
    rng: &mut R,
) -> Result<GenerationReport, GenerationError>
where
    Q: MessageQueue,
    R: Rng,
{
    info!(
        %environment,
        destination,
        num_messages = config.num_messages,
        error_rate = config.error_rate,
        "starting SET generation"
    );

    let mut sender = BatchSender::new(queue, destination);
    let mut remaining = config.num_messages;
    let mut messages_sent = 0;
    let mut total_failed = 0;
    let mut send_attempts = 0;

    while remaining > 0 && send_attempts < MAX_SEND_ATTEMPTS {
        send_attempts += 1;
        let (succeeded, failed) = send_round(&config, &mut sender, rng, remaining)?;
        messages_sent += succeeded;
        total_failed += failed;
        remaining = failed;
        info!(round = send_attempts, succeeded, failed, "send round complete");
    }

    if remaining > 0 {
        warn!(
            unsent = remaining,
            attempts = send_attempts,
            "retry limit reached with unsent messages"
        );
    }

    Ok(GenerationReport {
        messages_sent,
        send_attempts,
        unsent_messages: remaining,
        total_failed_message_attempts: total_failed,
        config_params: config,
    })
}

fn send_round<Q: MessageQueue>(
    config: &RunConfig,
    sender: &mut BatchSender<Q>,
    rng: &mut impl Rng,
    count: u64,
) -> Result<(u64, u64), GenerationError> {
    let mut pending = Vec::new();
    for _ in 0..count {
        let queued = QueuedSet {
            set: synthesize(config, rng, Utc::now())?,
            destination: config.inbound_endpoint_url.clone(),
        };
        pending.push(serde_json::to_string(&queued)?);
    }

    let mut succeeded = 0;
    let mut failed = 0;
    while !pending.is_empty() {
        let rest = pending.split_off(pending.len().min(MAX_BATCH_SIZE));
        let outcome = sender.send_batch(pending)?;
        debug!(
            accepted = outcome.success_count(),
            rejected = outcome.failure_count(),
            "batch dispatched"
        );
        succeeded += outcome.success_count();
        failed += outcome.failure_count();
        pending = rest;
    }
    Ok((succeeded, failed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::{BatchEntry, BatchResponse, QueueError};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Fails the first `n` entries of each call, `n` taken from a script.
    /// Once the script runs out every entry succeeds.
    struct ScriptedQueue {
        failures: VecDeque<usize>,
        batch_sizes: Vec<usize>,
        bodies: Vec<String>,
    }

    impl ScriptedQueue {
        fn new(failures: impl IntoIterator<Item = usize>) -> Self {
            Self {
                failures: failures.into_iter().collect(),
                batch_sizes: Vec::new(),
                bodies: Vec::new(),
            }
        }
    }

    impl MessageQueue for ScriptedQueue {
        fn send_batch(
            &mut self,
            entries: &[BatchEntry],
            _destination: &str,
        ) -> Result<BatchResponse, QueueError> {
            self.batch_sizes.push(entries.len());
            self.bodies
                .extend(entries.iter().map(|entry| entry.body.clone()));
            let fail = self.failures.pop_front().unwrap_or(0).min(entries.len());
            let ids: Vec<String> = entries.iter().map(|entry| entry.id.clone()).collect();
            Ok(BatchResponse {
                failed: Some(ids[..fail].to_vec()),
                successful: Some(ids[fail..].to_vec()),
            })
        }
    }

    fn run(
        overrides: Value,
        queue: &mut ScriptedQueue,
    ) -> Result<GenerationReport, GenerationError> {
        let mut rng = StdRng::seed_from_u64(7);
        run_generation(
            Some(&overrides),
            Environment::Development,
            queue,
            "transmitter",
            &mut rng,
        )
    }

    #[test]
    fn retries_until_every_message_is_queued() {
        let mut queue = ScriptedQueue::new([2, 2, 0]);
        let report = run(json!({ "numMessages": 5 }), &mut queue).expect("report");
        assert_eq!(report.messages_sent, 5);
        assert_eq!(report.send_attempts, 3);
        assert_eq!(report.unsent_messages, 0);
        assert_eq!(report.total_failed_message_attempts, 4);
        assert_eq!(queue.batch_sizes, vec![5, 2, 2]);
    }

    #[test]
    fn gives_up_after_five_rounds() {
        let mut queue = ScriptedQueue::new([1; 5]);
        let report = run(json!({ "numMessages": 5 }), &mut queue).expect("report");
        assert_eq!(report.messages_sent, 4);
        assert_eq!(report.send_attempts, 5);
        assert_eq!(report.unsent_messages, 1);
        assert_eq!(report.total_failed_message_attempts, 5);
    }

    #[test]
    fn splits_rounds_into_batches_of_ten() {
        let mut queue = ScriptedQueue::new([]);
        let report = run(json!({ "numMessages": 25 }), &mut queue).expect("report");
        assert_eq!(report.messages_sent, 25);
        assert_eq!(report.send_attempts, 1);
        assert_eq!(queue.batch_sizes, vec![10, 10, 5]);
    }

    #[test]
    fn queued_bodies_carry_set_and_destination() {
        let mut queue = ScriptedQueue::new([]);
        run(
            json!({ "numMessages": 2, "inboundEndpointURL": "https://receiver.test" }),
            &mut queue,
        )
        .expect("report");
        for body in &queue.bodies {
            let value: Value = serde_json::from_str(body).expect("json");
            assert_eq!(value["destination"], "https://receiver.test");
            assert_eq!(value["SET"]["aud"], "https://inbound.ssf.account.gov.uk/");
        }
    }

    #[test]
    fn invalid_overrides_stop_before_sending() {
        let mut queue = ScriptedQueue::new([]);
        let err = run(json!({ "errorRate": 2 }), &mut queue).unwrap_err();
        assert_eq!(err.to_string(), "Invalid entry for errorRate parameter");
        assert!(queue.batch_sizes.is_empty());
    }

    #[test]
    fn report_serializes_with_camel_case_names() {
        let mut queue = ScriptedQueue::new([]);
        let report = run(json!({}), &mut queue).expect("report");
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["messagesSent"], 10);
        assert_eq!(value["sendAttempts"], 1);
        assert_eq!(value["unsentMessages"], 0);
        assert_eq!(value["totalFailedMessageAttempts"], 0);
        assert_eq!(value["configParams"]["numMessages"], 10);
    }

    #[derive(Debug, Clone, Copy)]
    enum Fault {
        Reject,
        EmptyResponse,
        DropEntry,
    }

    /// Accepts everything except on call number `fault_on_call`.
    struct FaultyQueue {
        calls: usize,
        fault_on_call: usize,
        fault: Fault,
    }

    impl FaultyQueue {
        fn new(fault_on_call: usize, fault: Fault) -> Self {
            Self {
                calls: 0,
                fault_on_call,
                fault,
            }
        }
    }

    impl MessageQueue for FaultyQueue {
        fn send_batch(
            &mut self,
            entries: &[BatchEntry],
            destination: &str,
        ) -> Result<BatchResponse, QueueError> {
            self.calls += 1;
            let ids: Vec<String> = entries.iter().map(|entry| entry.id.clone()).collect();
            if self.calls != self.fault_on_call {
                return Ok(BatchResponse {
                    successful: Some(ids),
                    failed: None,
                });
            }
            match self.fault {
                Fault::Reject => Err(QueueError::Rejected {
                    destination: destination.to_string(),
                    reason: "down".to_string(),
                }),
                Fault::EmptyResponse => Ok(BatchResponse::default()),
                Fault::DropEntry => Ok(BatchResponse {
                    successful: Some(ids[1..].to_vec()),
                    failed: Some(Vec::new()),
                }),
            }
        }
    }

    fn run_against(
        overrides: Value,
        queue: &mut FaultyQueue,
    ) -> Result<GenerationReport, GenerationError> {
        let mut rng = StdRng::seed_from_u64(13);
        run_generation(Some(&overrides), Environment::Development, queue, "q", &mut rng)
    }

    #[test]
    fn queue_error_mid_run_aborts() {
        let mut queue = FaultyQueue::new(2, Fault::Reject);
        let err = run_against(json!({ "numMessages": 15 }), &mut queue).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Batch(BatchError::Queue(QueueError::Rejected { ref reason, .. }))
                if reason == "down"
        ));
        assert_eq!(queue.calls, 2);
    }

    #[test]
    fn invalid_queue_response_aborts() {
        let mut queue = FaultyQueue::new(1, Fault::EmptyResponse);
        let err = run_against(json!({ "numMessages": 3 }), &mut queue).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Batch(BatchError::InvalidResponse)
        ));
    }

    #[test]
    fn lost_message_aborts() {
        let mut queue = FaultyQueue::new(1, Fault::DropEntry);
        let err = run_against(json!({ "numMessages": 5 }), &mut queue).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Batch(BatchError::LostMessage { sent: 5, reported: 4 })
        ));
    }

    struct StaticTokens {
        fail: bool,
    }

    impl TokenProvider for StaticTokens {
        fn acquire_token(&mut self) -> Result<String, AuthError> {
            if self.fail {
                return Err(AuthError::Request("expired client secret".to_string()));
            }
            Ok("bearer-1".to_string())
        }
    }

    /// Answers every check with `status`, or success when it is `None`.
    struct StatusCheck {
        status: Option<u16>,
        seen: Vec<(String, String)>,
    }

    impl StatusCheck {
        fn answering(status: Option<u16>) -> Self {
            Self {
                status,
                seen: Vec::new(),
            }
        }
    }

    impl EndpointCheck for StatusCheck {
        fn check(&mut self, url: &str, bearer_token: &str) -> Result<(), DeliveryError> {
            self.seen.push((url.to_string(), bearer_token.to_string()));
            match self.status {
                Some(status) => Err(DeliveryError::Status {
                    url: url.to_string(),
                    status,
                }),
                None => Ok(()),
            }
        }
    }

    fn run_checked(
        overrides: Value,
        queue: &mut ScriptedQueue,
        tokens: &mut StaticTokens,
        endpoint: &mut StatusCheck,
    ) -> Result<GenerationReport, GenerationError> {
        let mut rng = StdRng::seed_from_u64(17);
        run_checked_generation(
            Some(&overrides),
            Environment::Development,
            queue,
            "transmitter",
            &mut rng,
            tokens,
            endpoint,
        )
    }

    #[test]
    fn health_check_hits_resolved_endpoint_before_queueing() {
        let mut queue = ScriptedQueue::new([]);
        let mut tokens = StaticTokens { fail: false };
        let mut endpoint = StatusCheck::answering(None);
        let report = run_checked(
            json!({ "numMessages": 3, "inboundEndpointURL": "https://receiver.test" }),
            &mut queue,
            &mut tokens,
            &mut endpoint,
        )
        .expect("report");
        assert_eq!(report.messages_sent, 3);
        assert_eq!(
            endpoint.seen,
            vec![("https://receiver.test".to_string(), "bearer-1".to_string())]
        );
    }

    #[test]
    fn failed_health_check_never_reaches_the_queue() {
        let mut queue = ScriptedQueue::new([]);
        let mut tokens = StaticTokens { fail: false };
        let mut endpoint = StatusCheck::answering(Some(503));
        let err = run_checked(json!({}), &mut queue, &mut tokens, &mut endpoint).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::HealthCheck(HealthCheckError::Endpoint(DeliveryError::Status {
                status: 503,
                ..
            }))
        ));
        assert!(queue.batch_sizes.is_empty());
    }

    #[test]
    fn health_check_without_token_never_calls_endpoint() {
        let mut queue = ScriptedQueue::new([]);
        let mut tokens = StaticTokens { fail: true };
        let mut endpoint = StatusCheck::answering(None);
        let err = run_checked(json!({}), &mut queue, &mut tokens, &mut endpoint).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::HealthCheck(HealthCheckError::Auth(_))
        ));
        assert!(endpoint.seen.is_empty());
        assert!(queue.batch_sizes.is_empty());
    }
}
