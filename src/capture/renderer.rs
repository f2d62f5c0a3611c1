//! Rendered-mode fetching via the WebDriver wire protocol
//!
//! Drives a WebDriver-compatible endpoint (chromedriver, geckodriver, a
//! Selenium grid) over its plain HTTP protocol: create a headless session,
//! navigate, wait for the page to settle, snapshot the materialized DOM,
//! delete the session. The pipeline assumes nothing about the engine beyond
//! "returns a materialized document or fails".

use crate::capture::fetcher::FetchResult;
use crate::config::{CaptureConfig, RenderSettle};
use crate::FetchError;
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

const SNAPSHOT_SCRIPT: &str = r#"
    return {
        url: window.location.href || "",
        html: document.documentElement ? document.documentElement.outerHTML : ""
    };
"#;

const READY_STATE_SCRIPT: &str = "return document.readyState;";

/// Grace period applied after the document reports itself complete, giving
/// late script-driven DOM mutations a chance to land
const NETWORK_IDLE_GRACE: Duration = Duration::from_millis(250);

/// Loads `url` in the rendering engine and returns the post-script document
///
/// The session is always torn down, including on failure.
pub async fn render_page(config: &CaptureConfig, url: &Url) -> Result<FetchResult, FetchError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs.max(30)))
        .build()
        .map_err(|e| FetchError::Driver(format!("driver client build failed: {}", e)))?;
    let endpoint = config.render_endpoint.trim_end_matches('/').to_string();

    let session_id = create_session(&client, &endpoint, &config.user_agent).await?;

    let outcome = drive_session(&client, &endpoint, &session_id, config, url).await;

    // Best-effort teardown; the render outcome takes precedence.
    if let Err(e) = delete_session(&client, &endpoint, &session_id).await {
        tracing::debug!("WebDriver session teardown failed: {}", e);
    }

    outcome
}

async fn drive_session(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: &str,
    config: &CaptureConfig,
    url: &Url,
) -> Result<FetchResult, FetchError> {
    navigate(client, endpoint, session_id, url).await?;
    settle(client, endpoint, session_id, config).await?;

    let (final_url, html) = snapshot(client, endpoint, session_id).await?;
    let final_url = Url::parse(&final_url)
        .map_err(|e| FetchError::Driver(format!("rendered URL unparseable: {}", e)))?;

    Ok(FetchResult {
        final_url,
        status: 200,
        content_type: Some("text/html".to_string()),
        body: html.into_bytes(),
        headers: HeaderMap::new(),
    })
}

fn capabilities(user_agent: &str) -> Value {
    let args = vec![
        "--headless=new".to_string(),
        "--disable-gpu".to_string(),
        "--no-first-run".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-background-networking".to_string(),
        "--window-size=1280,720".to_string(),
        format!("--user-agent={}", user_agent),
    ];
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "acceptInsecureCerts": false,
                "goog:chromeOptions": { "args": args }
            }
        }
    })
}

async fn create_session(
    client: &reqwest::Client,
    endpoint: &str,
    user_agent: &str,
) -> Result<String, FetchError> {
    let value = wire_post(
        client,
        &format!("{}/session", endpoint),
        capabilities(user_agent),
    )
    .await?;

    value
        .pointer("/value/sessionId")
        .and_then(|v| v.as_str())
        .or_else(|| value.pointer("/sessionId").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
        .ok_or_else(|| FetchError::Driver("session id missing in response".to_string()))
}

async fn navigate(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: &str,
    url: &Url,
) -> Result<(), FetchError> {
    wire_post(
        client,
        &format!("{}/session/{}/url", endpoint, session_id),
        json!({ "url": url.as_str() }),
    )
    .await
    .map(|_| ())
}

/// Waits for the configured quiescence signal
async fn settle(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: &str,
    config: &CaptureConfig,
) -> Result<(), FetchError> {
    match config.render_settle {
        RenderSettle::Fixed { ms } => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(())
        }
        RenderSettle::NetworkIdle => {
            let deadline = tokio::time::Instant::now()
                + Duration::from_secs(config.request_timeout_secs);
            loop {
                let value = execute_script(client, endpoint, session_id, READY_STATE_SCRIPT).await?;
                if value.pointer("/value").and_then(|v| v.as_str()) == Some("complete") {
                    tokio::time::sleep(NETWORK_IDLE_GRACE).await;
                    return Ok(());
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(FetchError::Timeout);
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }
}

async fn snapshot(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: &str,
) -> Result<(String, String), FetchError> {
    let value = execute_script(client, endpoint, session_id, SNAPSHOT_SCRIPT).await?;

    let url = value
        .pointer("/value/url")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let html = value
        .pointer("/value/html")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    if url.is_empty() || html.is_empty() {
        return Err(FetchError::Driver("empty rendered snapshot".to_string()));
    }
    Ok((url, html))
}

async fn execute_script(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: &str,
    script: &str,
) -> Result<Value, FetchError> {
    wire_post(
        client,
        &format!("{}/session/{}/execute/sync", endpoint, session_id),
        json!({ "script": script, "args": [] }),
    )
    .await
}

async fn delete_session(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: &str,
) -> Result<(), FetchError> {
    client
        .delete(format!("{}/session/{}", endpoint, session_id))
        .send()
        .await
        .map_err(|e| FetchError::Driver(format!("delete session failed: {}", e)))?;
    Ok(())
}

/// Posts a WebDriver command and surfaces wire-level errors
async fn wire_post(
    client: &reqwest::Client,
    url: &str,
    body: Value,
) -> Result<Value, FetchError> {
    let response = client.post(url).json(&body).send().await.map_err(|e| {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Driver(format!("driver request failed: {}", e))
        }
    })?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| FetchError::Driver(format!("driver response read failed: {}", e)))?;

    if !status.is_success() {
        return Err(FetchError::Driver(format!(
            "driver HTTP {}: {}",
            status.as_u16(),
            truncate(&text, 220)
        )));
    }

    let value: Value = serde_json::from_str(&text)
        .map_err(|e| FetchError::Driver(format!("driver response parse failed: {}", e)))?;

    if let Some(err) = value.pointer("/value/error").and_then(|v| v.as_str()) {
        let message = value
            .pointer("/value/message")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown webdriver error");
        return Err(FetchError::Driver(format!("{}: {}", err, message)));
    }

    Ok(value)
}

fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "..."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_include_headless_and_user_agent() {
        let caps = capabilities("TestBot/1.0");
        let args = caps
            .pointer("/capabilities/alwaysMatch/goog:chromeOptions/args")
            .and_then(|v| v.as_array())
            .unwrap();
        let args: Vec<&str> = args.iter().filter_map(|v| v.as_str()).collect();
        assert!(args.contains(&"--headless=new"));
        assert!(args.contains(&"--user-agent=TestBot/1.0"));
    }

    #[test]
    fn test_truncate_short_string_untouched() {
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn test_truncate_long_string() {
        let out = truncate(&"x".repeat(50), 10);
        assert_eq!(out, format!("{}...", "x".repeat(10)));
    }
}
