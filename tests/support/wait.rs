use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};

/// Polls `probe` until it yields a value. Stub servers come up in milliseconds, so the backoff
/// starts small and caps at half a second.
pub async fn wait_for<T, F, Fut>(description: &str, timeout: Duration, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    let mut backoff = Duration::from_millis(20);

    while Instant::now() < deadline {
        if let Some(value) = probe().await.with_context(|| format!("poll {description}"))? {
            return Ok(value);
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(Duration::from_millis(500));
    }
    anyhow::bail!("timeout waiting for {description}")
}
