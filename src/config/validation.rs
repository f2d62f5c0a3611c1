use crate::config::types::CaptureConfig;
use crate::ConfigError;
use url::Url;

/// Validates the entire capture configuration
pub fn validate(config: &CaptureConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    if config.overall_timeout_secs < config.request_timeout_secs {
        return Err(ConfigError::Validation(format!(
            "overall-timeout-secs ({}) must be >= request-timeout-secs ({})",
            config.overall_timeout_secs, config.request_timeout_secs
        )));
    }

    if config.asset_concurrency < 1 || config.asset_concurrency > 32 {
        return Err(ConfigError::Validation(format!(
            "asset-concurrency must be between 1 and 32, got {}",
            config.asset_concurrency
        )));
    }

    if let Some(proxy) = &config.proxy {
        let url = Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" && url.scheme() != "socks5" {
            return Err(ConfigError::Validation(format!(
                "proxy scheme must be http, https, or socks5, got '{}'",
                url.scheme()
            )));
        }

        // Explicit contract: rendered traffic egresses through the browser,
        // which does not inherit the HTTP client proxy. Configure the
        // browser's own proxy instead of passing --proxy with --render.
        if config.render {
            return Err(ConfigError::Validation(
                "proxy cannot be combined with render: rendered fetches use the \
                 browser's network path; configure the proxy on the WebDriver browser"
                    .to_string(),
            ));
        }
    }

    if config.render {
        Url::parse(&config.render_endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid render-endpoint '{}': {}",
                config.render_endpoint, e
            ))
        })?;
    }

    Ok(())
}
