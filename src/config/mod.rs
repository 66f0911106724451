use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TWELVELABS_BASE_URL: &str = "https://api.twelvelabs.io/v1.3";

/// Credentials and polling behaviour for the remote indexing service
#[derive(Debug, Clone)]
pub struct IndexingConfig {
    /// TwelveLabs API key (`TWELVELABS_API_KEY`)
    pub api_key: Option<String>,

    /// Target index (`TWELVELABS_INDEX_ID`)
    pub index_id: Option<String>,

    /// API base URL (default: TwelveLabs v1.3)
    pub base_url: String,

    /// Delay between two task status polls (default: 5s)
    pub poll_interval: Duration,

    /// Upper bound on the whole polling loop (default: 2h)
    pub poll_timeout: Duration,
}

impl IndexingConfig {
    pub fn is_configured(&self) -> bool {
        matches!(
            (&self.api_key, &self.index_id),
            (Some(key), Some(index)) if !key.is_empty() && !index.is_empty()
        )
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            index_id: None,
            base_url: DEFAULT_TWELVELABS_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(7200),
        }
    }
}

/// Service configuration, loaded once at startup and passed to constructors
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address (default: 127.0.0.1)
    pub host: String,

    /// HTTP listen port (default: 5000)
    pub port: u16,

    /// Where uploads are staged before indexing (default: "uploads")
    pub staging_dir: PathBuf,

    /// Maximum upload size in bytes (default: 2 GiB)
    pub max_file_size: usize,

    /// Shortest accepted media duration in seconds (default: 4)
    pub min_duration_secs: f64,

    /// Longest accepted media duration in seconds (default: 7200)
    pub max_duration_secs: f64,

    /// Remove staged files once the remote task is ready (default: false)
    pub delete_after_index: bool,

    /// Capacity of the scan request queue (default: 16)
    pub worker_queue_capacity: usize,

    /// ffprobe binary used for duration probing (default: "ffprobe")
    pub ffprobe_path: String,

    pub indexing: IndexingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            staging_dir: PathBuf::from("uploads"),
            max_file_size: 2 * 1024 * 1024 * 1024, // 2 GiB
            min_duration_secs: 4.0,
            max_duration_secs: 7200.0,
            delete_after_index: false,
            worker_queue_capacity: 16,
            ffprobe_path: "ffprobe".to_string(),
            indexing: IndexingConfig::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();
        let default_indexing = default.indexing.clone();

        Self {
            host: env::var("HOST").unwrap_or(default.host),

            port: parse_var("PORT").unwrap_or(default.port),

            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            max_file_size: parse_var("MAX_FILE_SIZE").unwrap_or(default.max_file_size),

            min_duration_secs: parse_var("MIN_DURATION_SECS")
                .unwrap_or(default.min_duration_secs),

            max_duration_secs: parse_var("MAX_DURATION_SECS")
                .unwrap_or(default.max_duration_secs),

            delete_after_index: env::var("DELETE_AFTER_INDEX")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.delete_after_index),

            worker_queue_capacity: parse_var::<usize>("WORKER_QUEUE_CAPACITY")
                .filter(|c| *c > 0)
                .unwrap_or(default.worker_queue_capacity),

            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or(default.ffprobe_path),

            indexing: IndexingConfig {
                api_key: non_empty_var("TWELVELABS_API_KEY"),
                index_id: non_empty_var("TWELVELABS_INDEX_ID"),
                base_url: env::var("TWELVELABS_BASE_URL")
                    .unwrap_or(default_indexing.base_url),
                poll_interval: parse_var("POLL_INTERVAL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(default_indexing.poll_interval),
                poll_timeout: parse_var("POLL_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(default_indexing.poll_timeout),
            },
        }
    }

    /// Config for local runs and tests: given staging dir, fast polling
    pub fn development(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            max_file_size: 64 * 1024 * 1024,
            indexing: IndexingConfig {
                poll_interval: Duration::from_millis(10),
                poll_timeout: Duration::from_secs(5),
                ..IndexingConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn accepts_duration(&self, duration_secs: f64) -> bool {
        duration_secs.is_finite()
            && duration_secs >= self.min_duration_secs
            && duration_secs <= self.max_duration_secs
    }
}
