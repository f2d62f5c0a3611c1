//! PagePress main entry point
//!
//! This is the command-line interface for the PagePress page capturer.

use clap::{Parser, Subcommand};
use pagepress::capture::{run_capture, AssetStatus, CaptureRequest};
use pagepress::config::{load_config_with_hash, CaptureConfig};
use pagepress::CaptureStatus;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PagePress: a polite single-page web capturer
///
/// PagePress fetches one web page, optionally retrieves its images,
/// stylesheets, and scripts, rewrites references to local paths, and
/// writes a self-contained offline copy. It respects robots.txt and
/// rate-limits its requests per host.
#[derive(Parser, Debug)]
#[command(name = "pagepress")]
#[command(version = "1.0.0")]
#[command(about = "A polite single-page web capturer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a single page to a local directory
    Fetch {
        /// Page to capture (scheme optional, https assumed)
        url: String,

        /// Directory to write the capture into
        #[arg(short, long, default_value = "capture")]
        output: PathBuf,

        /// Path to TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Fetch through a scripting-capable rendering engine
        #[arg(long)]
        render: bool,

        /// Skip asset retrieval, save the document only
        #[arg(long)]
        no_assets: bool,

        /// Ignore robots.txt (use only on sites you control)
        #[arg(long)]
        no_robots: bool,

        /// Proxy URL for outbound requests (http, https, or socks5)
        #[arg(long)]
        proxy: Option<String>,

        /// Override the User-Agent header
        #[arg(long)]
        user_agent: Option<String>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Minimum delay between requests to one host, in milliseconds
        #[arg(long)]
        rate_limit_ms: Option<u64>,

        /// Retrieve at most this many assets
        #[arg(long)]
        max_assets: Option<usize>,
    },

    /// Run the HTTP capture service
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Fetch {
            url,
            output,
            config,
            render,
            no_assets,
            no_robots,
            proxy,
            user_agent,
            timeout,
            rate_limit_ms,
            max_assets,
        } => {
            let mut capture_config = match config {
                Some(path) => {
                    tracing::info!("Loading configuration from: {}", path.display());
                    match load_config_with_hash(&path) {
                        Ok((cfg, hash)) => {
                            tracing::info!("Configuration loaded successfully (hash: {})", hash);
                            cfg
                        }
                        Err(e) => {
                            tracing::error!("Failed to load configuration: {}", e);
                            return Err(e.into());
                        }
                    }
                }
                None => CaptureConfig::default(),
            };

            // Command-line flags take precedence over file settings
            if render {
                capture_config.render = true;
            }
            if no_assets {
                capture_config.save_assets = false;
            }
            if no_robots {
                capture_config.respect_policy = false;
            }
            if let Some(proxy) = proxy {
                capture_config.proxy = Some(proxy);
            }
            if let Some(user_agent) = user_agent {
                capture_config.user_agent = user_agent;
            }
            if let Some(timeout) = timeout {
                capture_config.request_timeout_secs = timeout;
            }
            if let Some(rate_limit_ms) = rate_limit_ms {
                capture_config.rate_limit_ms = rate_limit_ms;
            }
            if let Some(max_assets) = max_assets {
                capture_config.max_assets = Some(max_assets);
            }

            handle_fetch(url, output, capture_config).await?;
        }
        Command::Serve { addr } => {
            pagepress::server::serve(addr).await?;
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pagepress=info,warn"),
            1 => EnvFilter::new("pagepress=debug,info"),
            2 => EnvFilter::new("pagepress=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the fetch subcommand: runs one capture and prints a summary
async fn handle_fetch(url: String, output: PathBuf, config: CaptureConfig) -> anyhow::Result<()> {
    let request = CaptureRequest {
        url,
        output_dir: output,
        config,
    };

    match run_capture(request).await {
        Ok(result) => {
            println!("Saved document: {}", result.document_path.display());
            for (reference, status) in &result.assets {
                match status {
                    AssetStatus::Saved(path) => {
                        println!("  ✓ {} -> {}", reference.url, path.display());
                    }
                    AssetStatus::Failed(e) => {
                        println!("  ✗ {} ({})", reference.url, e);
                    }
                    AssetStatus::Skipped => {
                        println!("  - {} (skipped)", reference.url);
                    }
                }
            }
            match result.status {
                CaptureStatus::Complete => println!("✓ Capture complete"),
                CaptureStatus::Partial => {
                    println!(
                        "⚠ Capture partial: {} of {} asset(s) failed",
                        result.failed_count(),
                        result.assets.len()
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Capture failed during {}: {}", e.stage().as_str(), e);
            Err(e.into())
        }
    }
}
