use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub mod api;
pub mod backend;
pub mod category;
pub mod classifier;
pub mod config_file;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod orchestrator;
pub mod retry;
pub mod sanitize;
pub mod store;

// Re-export for convenience
pub use api::{ApiResponse, GeminiClient, GenerativeApi, TransportError};
pub use backend::{BackendError, PdfBackend, extract_excerpt};
pub use category::{Category, CategorySet, UNCATEGORIZED};
pub use classifier::{Classification, ClassifyError, Classifier};
pub use orchestrator::{
    PreviewEntry, annotate_directory, list_pdfs, preview_directory, title_from_path,
};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use sanitize::sanitize;
pub use store::{AnnotationRecord, OutputStore, StoreError};

/// Default Gemini `generateContent` endpoint.
pub const DEFAULT_ENDPOINT_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

/// Default output spreadsheet, relative to the working directory.
pub const DEFAULT_OUTPUT_PATH: &str = "annotated_papers.xlsx";

/// Characters of extracted text kept per document.
pub const DEFAULT_MAX_CHARS: usize = 3000;

/// Default closed category set.
pub const DEFAULT_CATEGORIES: [&str; 5] = [
    "Deep Learning",
    "Computer Vision",
    "Reinforcement Learning",
    "NLP",
    "Optimization",
];

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("cannot read input directory {}: {source}", .path.display())]
    InputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("output store error: {0}")]
    Store(#[from] StoreError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Progress events emitted while annotating a directory.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Directory listing finished; `total` PDFs will be processed.
    Started { total: usize },
    Classifying {
        index: usize,
        total: usize,
        title: String,
    },
    ExtractionFailed {
        index: usize,
        total: usize,
        title: String,
        path: PathBuf,
        error: String,
    },
    /// The PDF opened but yielded no text.
    NoText {
        index: usize,
        total: usize,
        title: String,
    },
    Classified {
        index: usize,
        total: usize,
        title: String,
        category: Category,
        attempts: u32,
    },
    /// The store refused the row (illegal characters, oversized cell).
    RowSkipped {
        index: usize,
        total: usize,
        title: String,
        reason: String,
    },
    Complete {
        output_path: PathBuf,
        summary: RunSummary,
    },
}

/// Counters for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pdfs_found: usize,
    pub classified: usize,
    pub uncategorized: usize,
    pub extraction_failures: usize,
    pub empty_documents: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
}

/// Resolved runtime configuration for the annotator.
#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub endpoint_url: String,
    pub categories: Vec<String>,
    pub input_dir: Option<PathBuf>,
    pub output_path: PathBuf,
    pub max_chars: usize,
    pub max_attempts: u32,
    pub initial_delay_secs: u64,
    pub backoff_multiplier: u32,
    /// Per-request timeout. `None` leaves the HTTP client default in place.
    pub request_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("endpoint_url", &self.endpoint_url)
            .field("categories", &self.categories)
            .field("input_dir", &self.input_dir)
            .field("output_path", &self.output_path)
            .field("max_chars", &self.max_chars)
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay_secs", &self.initial_delay_secs)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            input_dir: None,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            max_chars: DEFAULT_MAX_CHARS,
            max_attempts: 5,
            initial_delay_secs: 5,
            backoff_multiplier: 2,
            request_timeout_secs: None,
        }
    }
}

impl Config {
    /// Check the settings every run depends on.
    ///
    /// The API key is only required when `needs_api` is set, so dry runs
    /// work without credentials.
    pub fn validate(&self, needs_api: bool) -> Result<(), CoreError> {
        CategorySet::new(self.categories.clone())?;
        if self.max_attempts == 0 {
            return Err(CoreError::Config("max_attempts must be at least 1".into()));
        }
        if self.max_chars == 0 {
            return Err(CoreError::Config("max_chars must be at least 1".into()));
        }
        if self.backoff_multiplier == 0 {
            return Err(CoreError::Config(
                "backoff_multiplier must be at least 1".into(),
            ));
        }
        if needs_api {
            match self.api_key.as_deref() {
                Some(key) if !key.trim().is_empty() => {}
                _ => {
                    return Err(CoreError::Config(
                        "no API key configured (set GEMINI_API_KEY or api.api_key)".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn category_set(&self) -> Result<CategorySet, CoreError> {
        CategorySet::new(self.categories.clone())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            multiplier: self.backoff_multiplier,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Annotate `input_dir` against the Gemini endpoint described by `config`.
///
/// Builds the HTTP client, classifier and output store, then runs
/// [`annotate_directory`].
pub async fn annotate(
    config: &Config,
    input_dir: &Path,
    backend: &dyn PdfBackend,
    progress: impl Fn(ProgressEvent),
) -> Result<RunSummary, CoreError> {
    config.validate(true)?;
    let api_key = config.api_key.clone().unwrap_or_default();

    let client = reqwest::Client::builder()
        .user_agent(concat!("paper-annotator/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let api = GeminiClient::with_client(client, config.endpoint_url.clone(), api_key)
        .with_timeout(config.request_timeout());
    let classifier = Classifier::new(Arc::new(api), config.category_set()?, config.retry_policy());

    let mut store = OutputStore::open_or_create(&config.output_path)?;
    annotate_directory(
        input_dir,
        backend,
        &classifier,
        &mut store,
        config.max_chars,
        progress,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let config = Config::default();
        assert_eq!(config.max_chars, 3000);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay_secs, 5);
        assert_eq!(config.output_path, PathBuf::from("annotated_papers.xlsx"));
        assert_eq!(config.categories.len(), 5);
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = Config {
            api_key: Some("secret-key".into()),
            ..Config::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn validate_requires_key_only_for_api_runs() {
        let config = Config::default();
        assert!(config.validate(false).is_ok());
        assert!(matches!(config.validate(true), Err(CoreError::Config(_))));

        let blank = Config {
            api_key: Some("   ".into()),
            ..Config::default()
        };
        assert!(blank.validate(true).is_err());

        let keyed = Config {
            api_key: Some("k".into()),
            ..Config::default()
        };
        assert!(keyed.validate(true).is_ok());
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let no_attempts = Config {
            max_attempts: 0,
            ..Config::default()
        };
        assert!(no_attempts.validate(false).is_err());

        let no_chars = Config {
            max_chars: 0,
            ..Config::default()
        };
        assert!(no_chars.validate(false).is_err());
    }

    #[test]
    fn retry_policy_from_config() {
        let config = Config {
            max_attempts: 3,
            initial_delay_secs: 2,
            backoff_multiplier: 3,
            ..Config::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(2));
        assert_eq!(policy.multiplier, 3);
    }
}
