use crate::config::AppConfig;
use crate::services::staging::{StagingError, StagingStore};
use tracing::info;

pub async fn setup_staging(config: &AppConfig) -> Result<StagingStore, StagingError> {
    let store = StagingStore::new(&config.staging_dir);
    store.ensure_dir().await?;

    info!("📁 Staging directory: {}", store.dir().display());
    Ok(store)
}
