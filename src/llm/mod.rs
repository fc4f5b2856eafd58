//! External-model contract: `generate(prompt, params) -> text`, retryable
//! with exponential backoff (§1 Out of scope, §5 suspension points).

mod client;

pub use client::{ModelClient, ModelConfig, ModelError, ModelParams, OllamaModelClient};

use std::time::Duration;

use tracing::warn;

/// Call `client.generate` up to `retry_limit + 1` times with exponential
/// backoff starting at 200ms, doubling each attempt. Returns `Ok(None)` once
/// the retry budget is exhausted rather than propagating the error — per
/// §7's `TransientModel` row the caller (a batch) contributes zero/originals
/// and the pipeline continues; it never aborts the task.
pub async fn generate_with_retry(
    client: &dyn ModelClient,
    prompt: &str,
    params: &ModelParams,
    retry_limit: u32,
) -> Option<String> {
    let mut delay = Duration::from_millis(200);
    for attempt in 0..=retry_limit {
        match client.generate(prompt, params).await {
            Ok(text) => return Some(text),
            Err(err) => {
                if attempt == retry_limit {
                    warn!(%err, attempt, "model call exhausted retry budget");
                    return None;
                }
                warn!(%err, attempt, "model call failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyClient {
        fail_times: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelClient for FlakyClient {
        async fn generate(&self, _prompt: &str, _params: &ModelParams) -> Result<String, ModelError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(ModelError::Connection("down".into()))
            } else {
                Ok("ok".into())
            }
        }
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let client = FlakyClient {
            fail_times: 2,
            calls: AtomicUsize::new(0),
        };
        let result = generate_with_retry(&client, "p", &ModelParams::default(), 3).await;
        assert_eq!(result, Some("ok".to_string()));
    }

    #[tokio::test]
    async fn gives_up_after_retry_limit_exhausted() {
        let client = FlakyClient {
            fail_times: 100,
            calls: AtomicUsize::new(0),
        };
        let result = generate_with_retry(&client, "p", &ModelParams::default(), 1).await;
        assert_eq!(result, None);
    }
}
