use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::FetchConfig;
use crate::error::ImportError;

/// Result of fetching one item from a rate-limited source.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    Found(T),
    /// The upstream has no usable record for this identifier.
    Missing,
    /// The upstream refused the request in a way that looks like rate limiting.
    Throttled,
}

/// Fetches items in fixed-size concurrent batches with a pause between
/// batches. Throttled items are retried with exponential backoff.
pub struct BatchFetcher {
    config: FetchConfig,
}

impl BatchFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self { config }
    }

    /// Runs `fetch` for every id. Items that fail or come back missing are
    /// logged and left out. Results within a batch are collected in
    /// completion order.
    pub async fn fetch_all<T, F, Fut>(&self, ids: &[String], fetch: F) -> Result<Vec<T>, ImportError>
    where
        T: Send,
        F: Fn(String) -> Fut + Sync,
        Fut: Future<Output = Result<FetchOutcome<T>, ImportError>> + Send,
    {
        let batch_size = self.config.batch_size.max(1);
        let total_batches = ids.len().div_ceil(batch_size);
        let mut items = Vec::with_capacity(ids.len());

        for (index, batch) in ids.chunks(batch_size).enumerate() {
            let current = index + 1;
            info!(
                batch = current,
                total = total_batches,
                size = batch.len(),
                "Processing batch"
            );

            let mut pending: FuturesUnordered<_> = batch
                .iter()
                .map(|id| self.fetch_with_retry(id, &fetch))
                .collect();

            let mut found = 0;
            while let Some(result) = pending.next().await {
                if let Some(item) = result? {
                    items.push(item);
                    found += 1;
                }
            }

            info!(
                batch = current,
                found,
                size = batch.len(),
                "Batch completed"
            );

            if current < total_batches {
                debug!(
                    delay_ms = self.config.inter_batch_delay.as_millis() as u64,
                    "Waiting before next batch"
                );
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
        }

        Ok(items)
    }

    async fn fetch_with_retry<T, F, Fut>(&self, id: &str, fetch: &F) -> Result<Option<T>, ImportError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<FetchOutcome<T>, ImportError>>,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match fetch(id.to_string()).await {
                Ok(FetchOutcome::Found(item)) => return Ok(Some(item)),
                Ok(FetchOutcome::Missing) => {
                    warn!(id, "No record found");
                    return Ok(None);
                }
                Ok(FetchOutcome::Throttled) => {
                    let limit = self.config.max_throttle_retries;
                    if limit > 0 && attempts > limit {
                        error!(id, attempts, "Giving up after repeated throttling");
                        return Err(ImportError::Throttled {
                            id: id.to_string(),
                            attempts,
                        });
                    }
                    let delay = self.backoff(attempts);
                    warn!(
                        id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(id, error = %e, "Failed to fetch item");
                    return Ok(None);
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.config
            .inter_batch_delay
            .saturating_mul(1u32 << exponent)
            .min(self.config.max_backoff)
    }
}
