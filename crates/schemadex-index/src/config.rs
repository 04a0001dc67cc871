use anyhow::{Context, Result};
use schemadex_core::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`IndexerConfig::max_wait_ms`].
pub const INDEX_TTL_ENV: &str = "SCHEMADEX_INDEX_TTL";

/// Settings for one indexing run, read from `.schemadex/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Index root. Relative paths are resolved against the build root;
    /// unset means `<buildRoot>/build/index`.
    #[serde(default)]
    pub index_dir: Option<PathBuf>,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Free-form build properties, e.g. `live_<project>_<platform:module>`.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            index_dir: None,
            max_wait_ms: default_max_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            properties: BTreeMap::new(),
        }
    }
}

impl IndexerConfig {
    /// Absolute index root for a build rooted at `build_root`.
    #[must_use]
    pub fn index_dir(&self, build_root: &Path) -> PathBuf {
        match &self.index_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => build_root.join(dir),
            None => build_root.join("build").join("index"),
        }
    }

    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Whether the `live_<mangledProject>_<platform:module>` property is `"true"`.
    #[must_use]
    pub fn is_forced_live(&self, mangled_project: &str, platform_module: &str) -> bool {
        self.property(&format!("live_{mangled_project}_{platform_module}")) == Some("true")
    }
}

/// Load `<build_root>/.schemadex/config.toml`, falling back to defaults when
/// the file is absent, then apply environment overrides.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed, or when
/// `SCHEMADEX_INDEX_TTL` is not a whole number of milliseconds. Parse
/// failures lead with [`ErrorCode::ConfigParseError`] and its hint.
pub fn load_config(build_root: &Path) -> Result<IndexerConfig> {
    let path = build_root.join(".schemadex/config.toml");
    let config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<IndexerConfig>(&content)
            .with_context(|| parse_failure(&path.display().to_string()))?
    } else {
        IndexerConfig::default()
    };

    apply_env_overrides(config, env::var(INDEX_TTL_ENV).ok())
}

fn apply_env_overrides(mut config: IndexerConfig, ttl: Option<String>) -> Result<IndexerConfig> {
    if let Some(raw) = ttl {
        config.max_wait_ms = raw
            .trim()
            .parse()
            .with_context(|| {
                parse_failure(&format!("{INDEX_TTL_ENV} (must be milliseconds, got {raw:?})"))
            })?;
    }
    Ok(config)
}

/// `[E1002] Config file parse error: <what>` plus the remediation hint.
fn parse_failure(what: &str) -> String {
    let code = ErrorCode::ConfigParseError;
    let mut message = format!("[{code}] {}: {what}", code.message());
    if let Some(hint) = code.hint() {
        message.push_str("\n  hint: ");
        message.push_str(hint);
    }
    message
}

const fn default_max_wait_ms() -> u64 {
    60_000
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}
