//! Crawl-policy (robots.txt) checking
//!
//! The checker fetches a host's robots.txt at most once per capture and
//! caches the outcome in memory; page and asset fetches against the same
//! host reuse the cached rules. When policy respect is enabled and the
//! robots.txt cannot be retrieved (other than a plain 404), the checker
//! fails closed and denies the host.

mod parser;

pub use parser::ParsedRobots;

use crate::limiter::HostRateLimiter;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// Why a policy decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyReason {
    /// Site publishes no robots.txt (404)
    NoPolicyFound,
    /// Published rules allow this URL for our user agent
    ExplicitAllow,
    /// Published rules deny this URL for our user agent
    ExplicitDeny,
    /// robots.txt could not be retrieved; fail closed
    PolicyFetchFailed,
}

impl fmt::Display for PolicyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PolicyReason::NoPolicyFound => "no policy found",
            PolicyReason::ExplicitAllow => "explicit allow",
            PolicyReason::ExplicitDeny => "explicit deny",
            PolicyReason::PolicyFetchFailed => "policy fetch failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a policy check for one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: PolicyReason,
}

/// Per-host cached policy state
#[derive(Debug, Clone)]
enum HostPolicy {
    /// 404: no policy published, everything allowed
    NoPolicy,
    /// Fetched rules; decisions computed per URL
    Rules(ParsedRobots),
    /// Network error or non-404 failure status
    FetchFailed,
}

/// Checks URLs against each host's published crawl policy
pub struct PolicyChecker {
    client: reqwest::Client,
    user_agent: String,
    respect_policy: bool,
    limiter: Arc<HostRateLimiter>,
    cache: Mutex<HashMap<String, Arc<Mutex<Option<HostPolicy>>>>>,
}

impl PolicyChecker {
    /// Creates a checker sharing the capture's HTTP client and rate limiter
    pub fn new(
        client: reqwest::Client,
        user_agent: String,
        respect_policy: bool,
        limiter: Arc<HostRateLimiter>,
    ) -> Self {
        Self {
            client,
            user_agent,
            respect_policy,
            limiter,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Decides whether `url` may be fetched under the host's policy
    ///
    /// With policy respect disabled the checker is bypassed entirely and no
    /// robots.txt request is made.
    pub async fn check(&self, url: &Url) -> PolicyDecision {
        if !self.respect_policy {
            return PolicyDecision {
                allowed: true,
                reason: PolicyReason::ExplicitAllow,
            };
        }

        let Some(host) = url.host_str() else {
            return PolicyDecision {
                allowed: false,
                reason: PolicyReason::PolicyFetchFailed,
            };
        };
        let origin = origin_of(url, host);

        // The map lock is only held long enough to clone the origin's slot;
        // the slot's own lock is held across the fetch, so concurrent checks
        // against one host share a single robots.txt request while other
        // hosts proceed independently.
        let slot = {
            let mut cache = self.cache.lock().await;
            cache
                .entry(origin.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone()
        };

        let policy = {
            let mut entry = slot.lock().await;
            match entry.as_ref() {
                Some(policy) => policy.clone(),
                None => {
                    let policy = self.fetch_policy(&origin, host).await;
                    *entry = Some(policy.clone());
                    policy
                }
            }
        };

        match policy {
            HostPolicy::NoPolicy => PolicyDecision {
                allowed: true,
                reason: PolicyReason::NoPolicyFound,
            },
            HostPolicy::FetchFailed => PolicyDecision {
                allowed: false,
                reason: PolicyReason::PolicyFetchFailed,
            },
            HostPolicy::Rules(robots) => {
                if robots.is_allowed(url.as_str(), &self.user_agent) {
                    PolicyDecision {
                        allowed: true,
                        reason: PolicyReason::ExplicitAllow,
                    }
                } else {
                    PolicyDecision {
                        allowed: false,
                        reason: PolicyReason::ExplicitDeny,
                    }
                }
            }
        }
    }

    async fn fetch_policy(&self, origin: &str, host: &str) -> HostPolicy {
        let robots_url = format!("{}/robots.txt", origin);
        tracing::debug!("Fetching crawl policy from {}", robots_url);

        self.limiter.await_turn(host).await;

        match self.client.get(&robots_url).send().await {
            Ok(response) => {
                let status = response.status();
                if status == reqwest::StatusCode::NOT_FOUND
                    || status == reqwest::StatusCode::GONE
                {
                    tracing::debug!("No policy published for {}", origin);
                    return HostPolicy::NoPolicy;
                }
                if !status.is_success() {
                    tracing::warn!(
                        "Policy fetch for {} returned HTTP {}, failing closed",
                        origin,
                        status.as_u16()
                    );
                    return HostPolicy::FetchFailed;
                }
                match response.text().await {
                    Ok(content) => HostPolicy::Rules(ParsedRobots::from_content(&content)),
                    Err(e) => {
                        tracing::warn!("Policy body read failed for {}: {}", origin, e);
                        HostPolicy::FetchFailed
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Policy fetch failed for {}: {}", origin, e);
                HostPolicy::FetchFailed
            }
        }
    }
}

fn origin_of(url: &Url, host: &str) -> String {
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn checker(respect_policy: bool) -> PolicyChecker {
        PolicyChecker::new(
            reqwest::Client::new(),
            "TestBot/1.0".to_string(),
            respect_policy,
            Arc::new(HostRateLimiter::new(Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn test_bypassed_checker_always_allows() {
        let checker = checker(false);
        // An unreachable host: no robots fetch happens when bypassed
        let url = Url::parse("http://127.0.0.1:1/anything").unwrap();
        let decision = checker.check(&url).await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_closed() {
        let checker = checker(true);
        let url = Url::parse("http://127.0.0.1:1/anything").unwrap();
        let decision = checker.check(&url).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, PolicyReason::PolicyFetchFailed);
    }

    #[test]
    fn test_origin_includes_port() {
        let url = Url::parse("http://example.com:8080/page").unwrap();
        assert_eq!(origin_of(&url, "example.com"), "http://example.com:8080");
    }

    #[tokio::test]
    async fn test_concurrent_same_host_checks_share_one_fetch() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let checker = Arc::new(checker(true));
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let checker = checker.clone();
            let url = url.clone();
            handles.push(tokio::spawn(async move { checker.check(&url).await }));
        }
        for handle in handles {
            let decision = handle.await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.reason, PolicyReason::NoPolicyFound);
        }
    }

    #[tokio::test]
    async fn test_slow_host_does_not_block_other_hosts() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let slow = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(1500)))
            .mount(&slow)
            .await;
        let fast = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&fast)
            .await;

        let checker = Arc::new(checker(true));
        let slow_url = Url::parse(&format!("{}/page", slow.uri())).unwrap();
        let fast_url = Url::parse(&format!("{}/page", fast.uri())).unwrap();

        let slow_check = {
            let checker = checker.clone();
            tokio::spawn(async move { checker.check(&slow_url).await })
        };
        // Give the slow fetch time to take its origin's slot
        tokio::time::sleep(Duration::from_millis(100)).await;

        let start = std::time::Instant::now();
        let decision = checker.check(&fast_url).await;
        assert!(decision.allowed);
        assert!(
            start.elapsed() < Duration::from_millis(700),
            "an unrelated host waited behind a slow policy fetch"
        );

        assert!(slow_check.await.unwrap().allowed);
    }
}
