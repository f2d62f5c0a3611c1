//! Bounded-concurrency asset retrieval
//!
//! Fans discovered asset references out to a small worker pool. Every
//! worker passes the policy cache and the per-host rate limiter before
//! touching the network; a failing asset never cancels its siblings.
//! Results come back in discovery order regardless of completion order, so
//! downstream rewriting is reproducible independent of network timing.

use crate::capture::extractor::AssetReference;
use crate::capture::fetcher::fetch_static;
use crate::config::CaptureConfig;
use crate::limiter::HostRateLimiter;
use crate::policy::PolicyChecker;
use crate::FetchError;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// Per-asset retrieval outcome
#[derive(Debug)]
pub enum AssetOutcome {
    /// Body bytes, ready for materialization
    Fetched(Vec<u8>),
    /// Fetch failed; the reference stays pointed at its original URL
    Failed(FetchError),
    /// Beyond the max-assets cap; never fetched
    Skipped,
}

/// Retrieves all references, returning outcomes in discovery order
///
/// References beyond `max_assets` are recorded as skipped without any
/// network activity. Work still in flight at `deadline` is abandoned and
/// recorded as a timeout failure for those references.
pub async fn retrieve_all(
    refs: &[AssetReference],
    client: &Client,
    policy: &Arc<PolicyChecker>,
    limiter: &Arc<HostRateLimiter>,
    config: &CaptureConfig,
    deadline: tokio::time::Instant,
) -> Vec<AssetOutcome> {
    let cap = config.max_assets.unwrap_or(usize::MAX);
    let semaphore = Arc::new(Semaphore::new(config.asset_concurrency));

    let mut outcomes: Vec<Option<AssetOutcome>> = Vec::with_capacity(refs.len());
    outcomes.resize_with(refs.len(), || None);

    let mut set = JoinSet::new();
    for (index, reference) in refs.iter().enumerate() {
        if index >= cap {
            tracing::debug!("Asset {} beyond max-assets cap, skipping", reference.url);
            outcomes[index] = Some(AssetOutcome::Skipped);
            continue;
        }

        let url = reference.url.clone();
        let client = client.clone();
        let policy = policy.clone();
        let limiter = limiter.clone();
        let semaphore = semaphore.clone();

        set.spawn(async move {
            let work = fetch_one(url, client, policy, limiter, semaphore);
            let outcome = match tokio::time::timeout_at(deadline, work).await {
                Ok(outcome) => outcome,
                Err(_) => AssetOutcome::Failed(FetchError::Timeout),
            };
            (index, outcome)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(e) => tracing::warn!("Asset worker panicked: {}", e),
        }
    }

    outcomes
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                AssetOutcome::Failed(FetchError::Other("asset worker failed".to_string()))
            })
        })
        .collect()
}

async fn fetch_one(
    url: Url,
    client: Client,
    policy: Arc<PolicyChecker>,
    limiter: Arc<HostRateLimiter>,
    semaphore: Arc<Semaphore>,
) -> AssetOutcome {
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return AssetOutcome::Failed(FetchError::Other("worker pool closed".to_string())),
    };

    // Cross-origin assets gate on their own host's policy and rate limit
    let decision = policy.check(&url).await;
    if !decision.allowed {
        tracing::debug!("Asset {} denied by site policy ({})", url, decision.reason);
        return AssetOutcome::Failed(FetchError::Other(format!(
            "denied by site policy ({})",
            decision.reason
        )));
    }

    let host = url.host_str().unwrap_or_default().to_string();
    limiter.await_turn(&host).await;

    match fetch_static(&client, &url).await {
        Ok(result) => {
            tracing::debug!("Fetched asset {} ({} bytes)", url, result.body.len());
            AssetOutcome::Fetched(result.body)
        }
        Err(e) => {
            tracing::debug!("Asset fetch failed for {}: {}", url, e);
            AssetOutcome::Failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::extractor::extract_assets;
    use std::time::Duration;

    fn test_refs(count: usize) -> Vec<AssetReference> {
        let html: String = (0..count)
            .map(|i| format!(r#"<img src="/asset-{}.png">"#, i))
            .collect();
        let base = Url::parse("http://127.0.0.1:1/").unwrap();
        extract_assets(&html, &base)
    }

    fn harness(config: &CaptureConfig) -> (Client, Arc<PolicyChecker>, Arc<HostRateLimiter>) {
        let client = Client::new();
        let limiter = Arc::new(HostRateLimiter::new(Duration::ZERO));
        // Policy checking disabled: these tests exercise cap/ordering logic
        let policy = Arc::new(PolicyChecker::new(
            client.clone(),
            config.user_agent.clone(),
            false,
            limiter.clone(),
        ));
        (client, policy, limiter)
    }

    #[tokio::test]
    async fn test_cap_of_zero_skips_everything() {
        let config = CaptureConfig {
            max_assets: Some(0),
            ..CaptureConfig::default()
        };
        let (client, policy, limiter) = harness(&config);
        let refs = test_refs(3);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

        let outcomes = retrieve_all(&refs, &client, &policy, &limiter, &config, deadline).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, AssetOutcome::Skipped)));
    }

    #[tokio::test]
    async fn test_cap_splits_fetched_from_skipped() {
        let config = CaptureConfig {
            max_assets: Some(2),
            request_timeout_secs: 2,
            ..CaptureConfig::default()
        };
        let (client, policy, limiter) = harness(&config);
        let refs = test_refs(5);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);

        let outcomes = retrieve_all(&refs, &client, &policy, &limiter, &config, deadline).await;

        assert_eq!(outcomes.len(), 5);
        // First two were attempted (the host refuses connections, so they
        // fail); the remaining three were never attempted.
        assert!(matches!(outcomes[0], AssetOutcome::Failed(_)));
        assert!(matches!(outcomes[1], AssetOutcome::Failed(_)));
        for outcome in &outcomes[2..] {
            assert!(matches!(outcome, AssetOutcome::Skipped));
        }
    }
}
