use crate::core::traits::{BatchEntry, BatchResponse, MessageQueue, QueueError};
use rand::distributions::{Bernoulli, BernoulliError, Distribution};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

/// Queue wrapper that drops each entry independently with a fixed probability.
///
/// Dropped entries are reported as failed; the rest are forwarded to the
/// inner queue in one request.
pub struct FlakyQueue<Q> {
    inner: Q,
    drop: Bernoulli,
    rng: StdRng,
}

impl<Q: MessageQueue> FlakyQueue<Q> {
    pub fn new(inner: Q, failure_rate: f64, seed: Option<u64>) -> Result<Self, BernoulliError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            inner,
            drop: Bernoulli::new(failure_rate)?,
            rng,
        })
    }

    pub fn into_inner(self) -> Q {
        self.inner
    }
}

impl<Q: MessageQueue> MessageQueue for FlakyQueue<Q> {
    fn send_batch(
        &mut self,
        entries: &[BatchEntry],
        destination: &str,
    ) -> Result<BatchResponse, QueueError> {
        let (dropped, kept): (Vec<BatchEntry>, Vec<BatchEntry>) = entries
            .iter()
            .cloned()
            .partition(|_| self.drop.sample(&mut self.rng));
        debug!(
            destination,
            dropped = dropped.len(),
            kept = kept.len(),
            "flaky queue filtered batch"
        );

        let mut failed: Vec<String> = dropped.into_iter().map(|entry| entry.id).collect();
        let mut successful = Vec::new();
        if !kept.is_empty() {
            let response = self.inner.send_batch(&kept, destination)?;
            successful.extend(response.successful.unwrap_or_default());
            failed.extend(response.failed.unwrap_or_default());
        }

        Ok(BatchResponse {
            successful: Some(successful),
            failed: Some(failed),
        })
    }
}
