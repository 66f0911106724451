use crate::config::AppConfig;
use crate::services::indexing::{IndexingClient, TwelveLabsClient};
use crate::services::media_probe::{DurationProbe, FfprobeDurationProbe};
use std::sync::Arc;
use tracing::info;

/// `None` when credentials are missing; the worker then reports every
/// candidate file as failed instead of stopping the server.
pub fn setup_indexing_client(config: &AppConfig) -> Option<Arc<dyn IndexingClient>> {
    match TwelveLabsClient::new(&config.indexing) {
        Ok(client) => {
            info!("☁️  Indexing service: {}", config.indexing.base_url);
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!("⚠️  {}. Staged files will not be indexed.", e);
            None
        }
    }
}

pub fn setup_duration_probe(config: &AppConfig) -> Arc<dyn DurationProbe> {
    let probe = FfprobeDurationProbe::new(config.ffprobe_path.clone());

    if probe.is_available() {
        info!("🎞️  Duration probe: {}", config.ffprobe_path);
    } else {
        tracing::warn!(
            "⚠️  {} not found on PATH! Every staged file will be skipped.",
            config.ffprobe_path
        );
    }

    Arc::new(probe)
}
