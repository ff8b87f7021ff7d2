use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Config, CoreError};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api: Option<ApiConfig>,
    pub classification: Option<ClassificationConfig>,
    pub retry: Option<RetryConfig>,
    pub paths: Option<PathsConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    pub api_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationConfig {
    pub categories: Option<Vec<String>>,
    pub max_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_delay_secs: Option<u64>,
    pub backoff_multiplier: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    pub input_dir: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
}

/// Name of the per-project config file looked up in the working directory.
pub const CWD_CONFIG_FILE: &str = ".annotator.toml";

/// Platform config directory path: `<config_dir>/paper-annotator/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("paper-annotator").join("config.toml"))
}

/// Load config by cascading CWD `.annotator.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(CWD_CONFIG_FILE));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed; a parse failure is logged.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Load a config the user named explicitly. Missing or malformed files are
/// errors here rather than silently skipped.
pub fn load_required(path: &Path) -> Result<ConfigFile, CoreError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CoreError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| CoreError::Config(format!("cannot parse {}: {}", path.display(), e)))
}

fn pick<S, T>(overlay: &Option<S>, base: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        api: Some(ApiConfig {
            api_key: pick(&overlay.api, &base.api, |a| a.api_key.clone()),
            endpoint_url: pick(&overlay.api, &base.api, |a| a.endpoint_url.clone()),
            request_timeout_secs: pick(&overlay.api, &base.api, |a| a.request_timeout_secs),
        }),
        classification: Some(ClassificationConfig {
            categories: pick(&overlay.classification, &base.classification, |c| {
                c.categories.clone()
            }),
            max_chars: pick(&overlay.classification, &base.classification, |c| {
                c.max_chars
            }),
        }),
        retry: Some(RetryConfig {
            max_attempts: pick(&overlay.retry, &base.retry, |r| r.max_attempts),
            initial_delay_secs: pick(&overlay.retry, &base.retry, |r| r.initial_delay_secs),
            backoff_multiplier: pick(&overlay.retry, &base.retry, |r| r.backoff_multiplier),
        }),
        paths: Some(PathsConfig {
            input_dir: pick(&overlay.paths, &base.paths, |p| p.input_dir.clone()),
            output_path: pick(&overlay.paths, &base.paths, |p| p.output_path.clone()),
        }),
    }
}

impl ConfigFile {
    /// Overlay every value present in this file onto `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(api) = &self.api {
            if let Some(key) = &api.api_key {
                config.api_key = Some(key.clone());
            }
            if let Some(url) = &api.endpoint_url {
                config.endpoint_url = url.clone();
            }
            if api.request_timeout_secs.is_some() {
                config.request_timeout_secs = api.request_timeout_secs;
            }
        }
        if let Some(classification) = &self.classification {
            if let Some(categories) = &classification.categories {
                config.categories = categories.clone();
            }
            if let Some(max_chars) = classification.max_chars {
                config.max_chars = max_chars;
            }
        }
        if let Some(retry) = &self.retry {
            if let Some(n) = retry.max_attempts {
                config.max_attempts = n;
            }
            if let Some(secs) = retry.initial_delay_secs {
                config.initial_delay_secs = secs;
            }
            if let Some(m) = retry.backoff_multiplier {
                config.backoff_multiplier = m;
            }
        }
        if let Some(paths) = &self.paths {
            if let Some(dir) = &paths.input_dir {
                config.input_dir = Some(dir.clone());
            }
            if let Some(out) = &paths.output_path {
                config.output_path = out.clone();
            }
        }
    }

    /// Snapshot a resolved config in file form, API key redacted.
    pub fn from_config_redacted(config: &Config) -> Self {
        ConfigFile {
            api: Some(ApiConfig {
                api_key: config.api_key.as_ref().map(|_| "***".to_string()),
                endpoint_url: Some(config.endpoint_url.clone()),
                request_timeout_secs: config.request_timeout_secs,
            }),
            classification: Some(ClassificationConfig {
                categories: Some(config.categories.clone()),
                max_chars: Some(config.max_chars),
            }),
            retry: Some(RetryConfig {
                max_attempts: Some(config.max_attempts),
                initial_delay_secs: Some(config.initial_delay_secs),
                backoff_multiplier: Some(config.backoff_multiplier),
            }),
            paths: Some(PathsConfig {
                input_dir: config.input_dir.clone(),
                output_path: Some(config.output_path.clone()),
            }),
        }
    }

    pub fn to_toml(&self) -> Result<String, CoreError> {
        toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("failed to serialize config: {}", e)))
    }
}
