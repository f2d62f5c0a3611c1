//! Capture orchestration
//!
//! Owns the stage machine and the shared infrastructure (HTTP client,
//! rate limiter, policy checker) for one capture. A policy denial or page
//! fetch failure aborts the run before anything is written; asset failures
//! only degrade the result to partial.

use crate::capture::fetcher::{build_http_client, classify_error, fetch_static};
use crate::capture::renderer::render_page;
use crate::capture::retriever::retrieve_all;
use crate::capture::{extract_assets, CaptureEvent, CaptureRequest, CaptureResult, CaptureStage};
use crate::config::validate;
use crate::limiter::HostRateLimiter;
use crate::output;
use crate::policy::PolicyChecker;
use crate::{CaptureError, FetchError};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub struct Orchestrator {
    request: CaptureRequest,
    client: Client,
    limiter: Arc<HostRateLimiter>,
    policy: Arc<PolicyChecker>,
    stage: CaptureStage,
    events: Option<tokio::sync::mpsc::UnboundedSender<CaptureEvent>>,
}

impl Orchestrator {
    /// Validates the config and builds the capture's shared infrastructure
    pub fn new(request: CaptureRequest) -> crate::Result<Self> {
        validate(&request.config)?;

        let client = build_http_client(&request.config).map_err(|e| CaptureError::PageFetch {
            url: request.url.clone(),
            source: classify_error(e),
        })?;
        let limiter = Arc::new(HostRateLimiter::new(Duration::from_millis(
            request.config.rate_limit_ms,
        )));
        let policy = Arc::new(PolicyChecker::new(
            client.clone(),
            request.config.user_agent.clone(),
            request.config.respect_policy,
            limiter.clone(),
        ));

        Ok(Self {
            request,
            client,
            limiter,
            policy,
            stage: CaptureStage::Idle,
            events: None,
        })
    }

    /// Attaches a progress channel; delivery is best-effort
    pub fn with_events(
        mut self,
        events: tokio::sync::mpsc::UnboundedSender<CaptureEvent>,
    ) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: CaptureEvent) {
        if let Some(events) = &self.events {
            // A closed receiver is not our problem
            let _ = events.send(event);
        }
    }

    fn enter(&mut self, stage: CaptureStage) {
        tracing::debug!("Stage {} -> {}", self.stage.as_str(), stage.as_str());
        self.stage = stage;
        self.emit(CaptureEvent::StageChanged(stage));
    }

    /// Runs the pipeline to completion
    pub async fn run(mut self) -> crate::Result<CaptureResult> {
        let config = self.request.config.clone();
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(config.overall_timeout_secs);

        let url = normalize_url(&self.request.url)?;

        self.enter(CaptureStage::PolicyCheck);
        let decision = self.policy.check(&url).await;
        if !decision.allowed {
            self.enter(CaptureStage::Failed);
            return Err(CaptureError::PolicyDenied {
                url: url.to_string(),
                reason: decision.reason,
            });
        }
        tracing::info!("Policy check passed for {} ({})", url, decision.reason);

        self.enter(CaptureStage::FetchingPage);
        let host = url.host_str().unwrap_or_default().to_string();
        self.limiter.await_turn(&host).await;

        let fetched = if config.render {
            tracing::info!("Fetching {} in rendered mode", url);
            tokio::time::timeout_at(deadline, render_page(&config, &url)).await
        } else {
            tracing::info!("Fetching {} in static mode", url);
            tokio::time::timeout_at(deadline, fetch_static(&self.client, &url)).await
        };
        let page = match fetched {
            Ok(Ok(page)) => page,
            Ok(Err(source)) => {
                self.enter(CaptureStage::Failed);
                return Err(CaptureError::PageFetch {
                    url: url.to_string(),
                    source,
                });
            }
            Err(_) => {
                self.enter(CaptureStage::Failed);
                return Err(CaptureError::PageFetch {
                    url: url.to_string(),
                    source: FetchError::Timeout,
                });
            }
        };
        let html = String::from_utf8_lossy(&page.body).into_owned();

        self.enter(CaptureStage::Extracting);
        let refs = if config.save_assets {
            let refs = extract_assets(&html, &page.final_url);
            tracing::info!("Discovered {} asset reference(s)", refs.len());
            self.emit(CaptureEvent::AssetsDiscovered(refs.len()));
            refs
        } else {
            Vec::new()
        };

        self.enter(CaptureStage::FetchingAssets);
        let outcomes = if refs.is_empty() {
            Vec::new()
        } else {
            retrieve_all(
                &refs,
                &self.client,
                &self.policy,
                &self.limiter,
                &config,
                deadline,
            )
            .await
        };

        self.enter(CaptureStage::Materializing);
        let result = output::materialize(
            &html,
            &page.final_url,
            refs,
            outcomes,
            &self.request.output_dir,
        )?;

        self.enter(CaptureStage::Done);
        tracing::info!(
            "Capture finished: {} saved, {} failed, {} skipped",
            result.saved_count(),
            result.failed_count(),
            result.skipped_count()
        );
        Ok(result)
    }
}

/// Parses the requested URL, assuming https when no scheme is given
fn normalize_url(raw: &str) -> crate::Result<Url> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    Ok(Url::parse(&candidate)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use std::path::PathBuf;

    #[test]
    fn test_normalize_url_adds_scheme() {
        let url = normalize_url("example.com/page").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_normalize_url_keeps_explicit_scheme() {
        let url = normalize_url("http://example.com/").unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let request = CaptureRequest {
            url: "https://example.com/".to_string(),
            output_dir: PathBuf::from("/tmp/out"),
            config: CaptureConfig {
                render: true,
                proxy: Some("http://127.0.0.1:8080".to_string()),
                ..CaptureConfig::default()
            },
        };
        assert!(Orchestrator::new(request).is_err());
    }
}
