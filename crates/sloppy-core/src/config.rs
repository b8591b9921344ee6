//! Runtime configuration and the reloadable provider that hands it out.
//!
//! [`Config`] is an immutable snapshot. [`ConfigProvider`] owns the current
//! snapshot and rebuilds it from the process environment overlaid with an
//! optional dotenv-format file. The process environment itself is never
//! written to.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{debug, info};

/// A secret value whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Runtime configuration for the pipeline and its server.
///
/// Every field has a default so the service starts without any environment
/// variables set; provider calls then fail with a missing-credential error.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://sloppy.db"`).
    pub database_url: String,
    pub database_max_connections: u32,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated list of allowed CORS origins.
    pub cors_origins: String,

    pub enable_openapi: bool,

    /// Bearer token guarding `/admin`. Unset leaves the routes open.
    pub admin_token: Option<ApiKey>,

    /// Result handlers allowed to run at once.
    pub handler_concurrency: usize,
    pub queue_workers: usize,
    pub queue_capacity: usize,

    /// Ceiling on waiting for a script-generation task.
    pub generation_timeout: Duration,
    pub min_dialogue_lines: usize,

    /// Clear the active-task marker when generation fails. Off by default
    /// so a failed record stays claimed until an operator releases it with
    /// `POST /admin/scripts/{id}/release`.
    pub release_guard_on_generation_failure: bool,

    /// Retention of finished task statuses before they read as `pending`.
    pub result_ttl: Duration,

    /// Buffered notifications per realtime subscriber.
    pub notify_capacity: usize,

    pub env_file: PathBuf,
    pub config_reload_interval: Duration,

    pub script_agent_url: Option<String>,
    pub tts_url: Option<String>,
    pub video_url: Option<String>,

    pub openai_api_key: Option<ApiKey>,
    pub tavily_api_key: Option<ApiKey>,
    pub hf_token: Option<ApiKey>,
    pub fal_key: Option<ApiKey>,
}

impl Config {
    /// Build from the process environment only.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Lookup(&lookup);
        Self {
            bind_address: env.or("SLOPPY_BIND", "0.0.0.0:8000"),
            database_url: env.or("SLOPPY_DATABASE_URL", "sqlite://sloppy.db"),
            database_max_connections: env.parse("SLOPPY_DATABASE_MAX_CONNECTIONS", 5),
            log_level: env.or("SLOPPY_LOG", "info"),
            log_json: env.flag("SLOPPY_LOG_JSON", false),
            cors_origins: env.or("SLOPPY_CORS_ORIGINS", "http://localhost:3000"),
            enable_openapi: env.flag("SLOPPY_ENABLE_OPENAPI", true),
            admin_token: env.secret("SLOPPY_ADMIN_TOKEN"),
            handler_concurrency: env.parse("SLOPPY_HANDLER_CONCURRENCY", 5).max(1),
            queue_workers: env.parse("SLOPPY_QUEUE_WORKERS", 4).max(1),
            queue_capacity: env.parse("SLOPPY_QUEUE_CAPACITY", 64).max(1),
            generation_timeout: Duration::from_secs(env.parse("SLOPPY_GENERATION_TIMEOUT_SECS", 300)),
            min_dialogue_lines: env.parse("SLOPPY_MIN_DIALOGUE_LINES", 10),
            release_guard_on_generation_failure: env
                .flag("SLOPPY_RELEASE_GUARD_ON_GENERATION_FAILURE", false),
            result_ttl: Duration::from_secs(env.parse("SLOPPY_RESULT_TTL_SECS", 86_400)),
            notify_capacity: env.parse("SLOPPY_NOTIFY_CAPACITY", 256).max(1),
            env_file: PathBuf::from(env.or("SLOPPY_ENV_FILE", ".env")),
            config_reload_interval: Duration::from_secs(env.parse("SLOPPY_CONFIG_RELOAD_SECS", 30)),
            script_agent_url: env.optional("SLOPPY_SCRIPT_AGENT_URL"),
            tts_url: env.optional("SLOPPY_TTS_URL"),
            video_url: env.optional("SLOPPY_VIDEO_URL"),
            openai_api_key: env.secret("OPENAI_API_KEY"),
            tavily_api_key: env.secret("TAVILY_API_KEY"),
            hf_token: env.secret("HF_TOKEN"),
            fal_key: env.secret("FAL_KEY"),
        }
    }

    /// Provider credential names and whether each is set.
    pub fn credentials(&self) -> Vec<(&'static str, bool)> {
        vec![
            (CREDENTIAL_KEYS[0], self.openai_api_key.is_some()),
            (CREDENTIAL_KEYS[1], self.tavily_api_key.is_some()),
            (CREDENTIAL_KEYS[2], self.hf_token.is_some()),
            (CREDENTIAL_KEYS[3], self.fal_key.is_some()),
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Provider keys an operator may write through [`ConfigProvider::set_credential`].
pub const CREDENTIAL_KEYS: [&str; 4] = ["OPENAI_API_KEY", "TAVILY_API_KEY", "HF_TOKEN", "FAL_KEY"];

// ── private helpers ──────────────────────────────────────────────────────────

struct Lookup<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Lookup<'_, F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_owned())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.optional(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.optional(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    fn secret(&self, key: &str) -> Option<ApiKey> {
        self.optional(key).map(ApiKey)
    }
}

// ── Provider ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenv::Error,
    },

    #[error("failed to write env file {path}: {source}")]
    WriteEnvFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not a provider credential")]
    UnknownCredential(String),

    #[error("credential value must be non-empty, single-line and free of single quotes")]
    InvalidValue,

    #[error("configuration has no env file to write to")]
    ReadOnly,
}

/// Owner of the current [`Config`] snapshot.
///
/// Lifecycle: [`ConfigProvider::load`] once at startup, [`ConfigProvider::current`]
/// wherever a value is needed, and [`ConfigProvider::refresh`] (or
/// [`ConfigProvider::reload`]) to pick up edits to the env file.
pub struct ConfigProvider {
    env_file: PathBuf,
    process_env: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
    current: RwLock<Arc<Config>>,
    file_modified: Mutex<Option<SystemTime>>,
    writer: Mutex<()>,
}

impl fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigProvider")
            .field("env_file", &self.env_file)
            .finish_non_exhaustive()
    }
}

impl ConfigProvider {
    /// Initial load from the process environment and the env file named by
    /// `SLOPPY_ENV_FILE` (default `.env`). A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let env_file = Config::from_env().env_file;
        Self::with_source(env_file, |key| std::env::var(key).ok())
    }

    /// Load with an explicit env file and base lookup; used by tests.
    pub fn with_source(
        env_file: impl Into<PathBuf>,
        process_env: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Result<Self, ConfigError> {
        let env_file = env_file.into();
        let modified = modified_time(&env_file);
        let config = build(&env_file, &process_env)?;
        Ok(Self {
            env_file,
            process_env: Box::new(process_env),
            current: RwLock::new(Arc::new(config)),
            file_modified: Mutex::new(modified),
            writer: Mutex::new(()),
        })
    }

    /// A fixed snapshot that never changes on refresh.
    pub fn fixed(config: Config) -> Self {
        let env_file = PathBuf::new();
        Self {
            env_file,
            process_env: Box::new(|_| None),
            current: RwLock::new(Arc::new(config)),
            file_modified: Mutex::new(None),
            writer: Mutex::new(()),
        }
    }

    pub fn current(&self) -> Arc<Config> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Rebuild the snapshot if the env file's modification time changed.
    /// Returns whether a new snapshot was installed.
    pub fn refresh(&self) -> Result<bool, ConfigError> {
        if self.env_file.as_os_str().is_empty() {
            return Ok(false);
        }
        let modified = modified_time(&self.env_file);
        {
            let seen = self
                .file_modified
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if *seen == modified {
                return Ok(false);
            }
        }
        debug!(path = %self.env_file.display(), "env file changed; reloading");
        self.reload()?;
        Ok(true)
    }

    /// Unconditionally rebuild the snapshot.
    pub fn reload(&self) -> Result<(), ConfigError> {
        if self.env_file.as_os_str().is_empty() {
            return Ok(());
        }
        let modified = modified_time(&self.env_file);
        let config = build(&self.env_file, &self.process_env)?;
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(config);
        *self
            .file_modified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = modified;
        info!(path = %self.env_file.display(), "configuration reloaded");
        Ok(())
    }

    /// Write one provider key into the env file, replacing an existing
    /// assignment or appending a new one, then reload.
    ///
    /// Only [`CREDENTIAL_KEYS`] are accepted. The value is written
    /// single-quoted and is never logged.
    pub fn set_credential(&self, name: &str, value: &str) -> Result<(), ConfigError> {
        if !CREDENTIAL_KEYS.contains(&name) {
            return Err(ConfigError::UnknownCredential(name.to_owned()));
        }
        let value = value.trim();
        if value.is_empty() || value.contains(['\n', '\r', '\'']) {
            return Err(ConfigError::InvalidValue);
        }
        if self.env_file.as_os_str().is_empty() {
            return Err(ConfigError::ReadOnly);
        }

        {
            let _writer = self
                .writer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let existing = match std::fs::read_to_string(&self.env_file) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(source) => {
                    return Err(ConfigError::WriteEnvFile {
                        path: self.env_file.clone(),
                        source,
                    });
                }
            };
            let updated = upsert_assignment(&existing, name, value);
            std::fs::write(&self.env_file, updated).map_err(|source| ConfigError::WriteEnvFile {
                path: self.env_file.clone(),
                source,
            })?;
        }
        info!(path = %self.env_file.display(), key = name, "credential written");
        self.reload()
    }
}

/// Replace every `KEY=` (or `export KEY=`) line for `key`, or append one.
fn upsert_assignment(text: &str, key: &str, value: &str) -> String {
    let line = format!("{key}='{value}'");
    let mut replaced = false;
    let mut out: Vec<String> = text
        .lines()
        .map(|current| {
            let body = current.trim_start();
            let body = body.strip_prefix("export ").unwrap_or(body).trim_start();
            let assigns = body
                .strip_prefix(key)
                .is_some_and(|rest| rest.trim_start().starts_with('='));
            if assigns {
                replaced = true;
                line.clone()
            } else {
                current.to_owned()
            }
        })
        .collect();
    if !replaced {
        out.push(line);
    }
    let mut joined = out.join("\n");
    joined.push('\n');
    joined
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// File values take precedence so rotated keys win over stale process values.
fn build(
    env_file: &Path,
    process_env: &(impl Fn(&str) -> Option<String> + ?Sized),
) -> Result<Config, ConfigError> {
    let file = read_env_file(env_file)?;
    Ok(Config::from_lookup(|key| {
        file.get(key).cloned().or_else(|| process_env(key))
    }))
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let to_error = |source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    };
    let mut values = HashMap::new();
    for item in dotenv::from_path_iter(path).map_err(to_error)? {
        let (key, value) = item.map_err(to_error)?;
        values.insert(key, value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_environment() {
        let config = Config::default();
        assert_eq!(config.bind_address, "0.0.0.0:8000");
        assert_eq!(config.handler_concurrency, 5);
        assert_eq!(config.generation_timeout, Duration::from_secs(300));
        assert_eq!(config.min_dialogue_lines, 10);
        assert_eq!(config.result_ttl, Duration::from_secs(86_400));
        assert!(!config.release_guard_on_generation_failure);
        assert!(config.hf_token.is_none());
        assert!(config.credentials().iter().all(|(_, set)| !set));
    }

    #[test]
    fn lookup_values_are_parsed_and_blank_is_unset() {
        let config = Config::from_lookup(|key| match key {
            "SLOPPY_HANDLER_CONCURRENCY" => Some("9".into()),
            "SLOPPY_LOG_JSON" => Some("TRUE".into()),
            "SLOPPY_QUEUE_WORKERS" => Some("not-a-number".into()),
            "HF_TOKEN" => Some("   ".into()),
            "FAL_KEY" => Some("fal-123".into()),
            _ => None,
        });
        assert_eq!(config.handler_concurrency, 9);
        assert!(config.log_json);
        assert_eq!(config.queue_workers, 4);
        assert!(config.hf_token.is_none());
        assert_eq!(config.fal_key.as_ref().map(ApiKey::expose), Some("fal-123"));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let config = Config::from_lookup(|key| (key == "OPENAI_API_KEY").then(|| "sk-live".into()));
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-live"));
        assert!(printed.contains("ApiKey(***)"));
    }

    #[test]
    fn refresh_picks_up_rotated_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "HF_TOKEN=first\n").unwrap();

        let provider = ConfigProvider::with_source(&path, |key| {
            (key == "HF_TOKEN").then(|| "from-process".into())
        })
        .unwrap();
        let before = provider.current();
        assert_eq!(before.hf_token.as_ref().map(ApiKey::expose), Some("first"));

        // Unchanged file: nothing to do.
        assert!(!provider.refresh().unwrap());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "FAL_KEY=second").unwrap();
        drop(file);
        // Force a distinct mtime on filesystems with coarse timestamps.
        let bumped = SystemTime::now() + Duration::from_secs(5);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(bumped)
            .unwrap();

        assert!(provider.refresh().unwrap());
        let after = provider.current();
        assert_eq!(after.fal_key.as_ref().map(ApiKey::expose), Some("second"));
        // Snapshots already handed out are not mutated.
        assert!(before.fal_key.is_none());
    }

    #[test]
    fn set_credential_updates_file_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# keys\nHF_TOKEN=old\nSLOPPY_LOG=debug\n").unwrap();
        let provider = ConfigProvider::with_source(&path, |_| None).unwrap();

        provider.set_credential("HF_TOKEN", "hf-new").unwrap();
        provider.set_credential("FAL_KEY", "fal-1").unwrap();

        let config = provider.current();
        assert_eq!(config.hf_token.as_ref().map(ApiKey::expose), Some("hf-new"));
        assert_eq!(config.fal_key.as_ref().map(ApiKey::expose), Some("fal-1"));
        assert_eq!(config.log_level, "debug");
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "# keys\nHF_TOKEN='hf-new'\nSLOPPY_LOG=debug\nFAL_KEY='fal-1'\n");
    }

    #[test]
    fn set_credential_rejects_other_names_and_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ConfigProvider::with_source(dir.path().join(".env"), |_| None).unwrap();
        assert!(matches!(
            provider.set_credential("SLOPPY_ADMIN_TOKEN", "x"),
            Err(ConfigError::UnknownCredential(_))
        ));
        assert!(matches!(
            provider.set_credential("HF_TOKEN", "a\nFAL_KEY=b"),
            Err(ConfigError::InvalidValue)
        ));
        // A missing file is created on first write.
        provider.set_credential("TAVILY_API_KEY", "tv").unwrap();
        assert!(provider.current().tavily_api_key.is_some());

        assert!(matches!(
            ConfigProvider::fixed(Config::default()).set_credential("HF_TOKEN", "x"),
            Err(ConfigError::ReadOnly)
        ));
    }

    #[test]
    fn missing_env_file_falls_back_to_process_values() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ConfigProvider::with_source(dir.path().join("absent.env"), |key| {
            (key == "TAVILY_API_KEY").then(|| "tv".into())
        })
        .unwrap();
        assert!(provider.current().tavily_api_key.is_some());
        assert!(!provider.refresh().unwrap());
    }

    #[test]
    fn fixed_provider_never_reloads() {
        let provider = ConfigProvider::fixed(Config::default());
        assert!(!provider.refresh().unwrap());
        provider.reload().unwrap();
        assert_eq!(provider.current().database_url, "sqlite://sloppy.db");
    }
}
