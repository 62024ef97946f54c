//! Shared configuration for Buildmart tools.
//!
//! TOML profiles, environment overlay, token resolution (env + keyring +
//! plaintext), and translation to `buildmart_core::ClientConfig`. The CLI
//! adds `GlobalOpts`-aware overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use buildmart_core::{ClientConfig, FileRule, TlsVerification};

/// Service name under which tokens are kept in the OS keyring.
pub const KEYRING_SERVICE: &str = "buildmart";

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "BUILDMART_CONFIG";

const ENV_PREFIX: &str = "BUILDMART_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: Vec<String> },

    #[error("keyring unavailable: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.profile_names(),
            })
    }

    /// Profile names, sorted.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named backend profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// API root (e.g., "https://api.buildmart.example/api/v1").
    pub api_url: String,

    /// Bearer token (plaintext; prefer the keyring or `token_env`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Sent as `Accept-Language` (e.g., "en", "ar").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Override the default timeout, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Page size for list requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,

    /// Path to a custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid TLS certificates (staging backends).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Client-side upload checks, applied to every file field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadRules>,
}

/// `[profiles.<name>.upload]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadRules {
    /// Per-file limit in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,

    /// Extensions (".png"), MIME types, or wildcards ("image/*").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
}

impl From<&UploadRules> for FileRule {
    fn from(rules: &UploadRules) -> Self {
        Self {
            max_size: rules.max_size,
            allowed_types: rules.allowed_types.clone(),
            max_files: rules.max_files,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `BUILDMART_CONFIG`, then the platform
/// config dir.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "buildmart", "buildmart").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("buildmart");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file, then `BUILDMART_*` variables
/// (`__` separates nested keys: `BUILDMART_PROFILES__PROD__LOCALE`).
fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the full config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let config: Config = figment_for(path).extract()?;
    Ok(config)
}

/// Load config, returning a default if it is missing or unreadable.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution (without CLI flags) ────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
}

/// Resolve a token from the chain: `token_env` variable, keyring,
/// plaintext. `None` means anonymous access.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    profile.token.clone().map(SecretString::from)
}

/// Store a token in the OS keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

/// Build a `ClientConfig` from a profile, without CLI overrides.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let api_url = parse_api_url(&profile.api_url)?;

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    Ok(ClientConfig {
        api_url,
        token: resolve_token(profile, profile_name),
        locale: profile.locale.clone(),
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        per_page: profile.per_page,
        upload: profile.upload.as_ref().map(FileRule::from),
    })
}

/// Parse and validate an API root URL.
pub fn parse_api_url(raw: &str) -> Result<url::Url, ConfigError> {
    let url: url::Url = raw.parse().map_err(|e| ConfigError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL {raw:?}: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "api_url".into(),
            reason: format!("expected http or https, got {}", url.scheme()),
        });
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
default_profile = "staging"

[defaults]
timeout = 12

[profiles.staging]
api_url = "https://staging.buildmart.test/api/v1"
token = "plain-token"
locale = "ar"
per_page = 20

[profiles.staging.upload]
max_size = 5242880
allowed_types = ["image/*", ".pdf"]
max_files = 10
"#;

    // Loading reads `BUILDMART_*` from the process environment, so every
    // loading test runs inside a jail to serialize against `set_env`.

    #[test]
    fn loads_profiles_from_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;

            let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.default_profile.as_deref(), Some("staging"));
            assert_eq!(cfg.defaults.timeout, 12);
            assert_eq!(cfg.defaults.output, "table");

            let staging = cfg.profile("staging").map_err(|e| e.to_string())?;
            assert_eq!(staging.per_page, Some(20));
            assert_eq!(staging.upload.as_ref().unwrap().max_files, Some(10));
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        figment::Jail::expect_with(|_| {
            let cfg = load_config_from(Path::new("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg, Config::default());
            Ok(())
        });
    }

    #[test]
    fn unknown_profile_lists_available() {
        let mut cfg = Config::default();
        cfg.profiles.insert("b".into(), Profile::default());
        cfg.profiles.insert("a".into(), Profile::default());

        match cfg.profile("prod") {
            Err(ConfigError::ProfileNotFound { name, available }) => {
                assert_eq!(name, "prod");
                assert_eq!(available, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn env_overlays_the_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("BUILDMART_PROFILES__STAGING__LOCALE", "en");
            jail.set_env("BUILDMART_DEFAULTS__TIMEOUT", "45");

            let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.defaults.timeout, 45);
            assert_eq!(cfg.profiles["staging"].locale.as_deref(), Some("en"));
            Ok(())
        });
    }

    #[test]
    fn save_then_load_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                api_url: "http://localhost:8000/api".into(),
                token_env: Some("MY_TOKEN".into()),
                ..Profile::default()
            },
        );
        save_config_to(&cfg, &path).unwrap();

        figment::Jail::expect_with(|_| {
            let loaded = load_config_from(&path).map_err(|e| e.to_string())?;
            assert_eq!(loaded.profiles, cfg.profiles);
            Ok(())
        });
    }

    #[test]
    fn client_config_translation() {
        let profile = Profile {
            api_url: "https://staging.buildmart.test/api/v1".into(),
            token: Some("plain-token".into()),
            timeout: Some(7),
            per_page: Some(20),
            insecure: Some(true),
            upload: Some(UploadRules {
                max_size: Some(1024),
                allowed_types: vec![".png".into()],
                max_files: None,
            }),
            ..Profile::default()
        };

        let client = profile_to_client_config(&profile, "translation-test", &Defaults::default())
            .unwrap();
        assert_eq!(client.timeout, Duration::from_secs(7));
        assert_eq!(client.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(client.per_page, Some(20));
        assert_eq!(client.upload.unwrap().max_size, Some(1024));
        // Plaintext is the last link of the chain; a keyring entry for this
        // throwaway profile name is not expected to exist.
        assert_eq!(client.token.unwrap().expose_secret(), "plain-token");
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(parse_api_url("ftp://files.buildmart.test").is_err());
        assert!(parse_api_url("not a url").is_err());
        assert!(parse_api_url("http://localhost:8000/api").is_ok());
    }
}
