//! Single-page capture pipeline
//!
//! The pipeline runs a fixed sequence of stages: policy check, page fetch
//! (static or rendered), asset discovery, bounded-concurrency asset
//! retrieval, and materialization. Nothing touches the output directory
//! until materialization, so a failed capture leaves no partial files.

mod extractor;
mod fetcher;
mod orchestrator;
mod renderer;
mod retriever;

pub use extractor::{extract_assets, AssetKind, AssetReference};
pub use fetcher::{build_http_client, fetch_static, FetchResult, MAX_REDIRECTS};
pub use orchestrator::Orchestrator;
pub use renderer::render_page;
pub use retriever::{retrieve_all, AssetOutcome};

use crate::config::CaptureConfig;
use crate::FetchError;
use std::path::PathBuf;

/// Everything needed to run one capture
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Target page, with or without a scheme (`https://` is assumed)
    pub url: String,
    /// Directory the captured page is written into
    pub output_dir: PathBuf,
    pub config: CaptureConfig,
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Idle,
    PolicyCheck,
    FetchingPage,
    Extracting,
    FetchingAssets,
    Materializing,
    Done,
    Failed,
}

impl CaptureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStage::Idle => "idle",
            CaptureStage::PolicyCheck => "policy-check",
            CaptureStage::FetchingPage => "fetching-page",
            CaptureStage::Extracting => "extracting",
            CaptureStage::FetchingAssets => "fetching-assets",
            CaptureStage::Materializing => "materializing",
            CaptureStage::Done => "done",
            CaptureStage::Failed => "failed",
        }
    }
}

/// Overall capture outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Document saved, every attempted asset succeeded
    Complete,
    /// Document saved, but one or more assets failed
    Partial,
}

/// Final disposition of one discovered asset
#[derive(Debug)]
pub enum AssetStatus {
    /// Written to disk at this path (relative to the output directory)
    Saved(PathBuf),
    /// Retrieval failed; the document keeps the original URL
    Failed(FetchError),
    /// Never attempted (beyond the max-assets cap)
    Skipped,
}

/// What a finished capture produced
#[derive(Debug)]
pub struct CaptureResult {
    /// Path of the saved document
    pub document_path: PathBuf,
    /// Every discovered asset paired with its final disposition
    pub assets: Vec<(AssetReference, AssetStatus)>,
    pub status: CaptureStatus,
}

impl CaptureResult {
    pub fn saved_count(&self) -> usize {
        self.assets
            .iter()
            .filter(|(_, s)| matches!(s, AssetStatus::Saved(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.assets
            .iter()
            .filter(|(_, s)| matches!(s, AssetStatus::Failed(_)))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.assets
            .iter()
            .filter(|(_, s)| matches!(s, AssetStatus::Skipped))
            .count()
    }
}

/// Progress notification emitted as the pipeline advances
///
/// Delivery is best-effort: a dropped receiver never stalls the capture.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    StageChanged(CaptureStage),
    AssetsDiscovered(usize),
}

/// Runs a capture end to end
pub async fn run_capture(request: CaptureRequest) -> crate::Result<CaptureResult> {
    let orchestrator = Orchestrator::new(request)?;
    orchestrator.run().await
}

/// Runs a capture, reporting progress through `events`
pub async fn run_capture_with_events(
    request: CaptureRequest,
    events: tokio::sync::mpsc::UnboundedSender<CaptureEvent>,
) -> crate::Result<CaptureResult> {
    let orchestrator = Orchestrator::new(request)?.with_events(events);
    orchestrator.run().await
}
