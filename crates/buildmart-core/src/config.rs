// ── Runtime connection configuration ──
//
// These types describe *how* to reach the marketplace backend and how a
// store should behave. They carry credentials and tuning, but never touch
// disk. The CLI builds a `ClientConfig` from its profile and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use buildmart_api::{
    EncoderConfig, FileRule, FileRules, Gateway, GatewayConfig, TlsMode, TransportConfig,
};
use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed staging backends).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => Self::System,
            TlsVerification::CustomCa(path) => Self::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => Self::DangerAcceptInvalid,
        }
    }
}

/// Connection settings for one backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root (e.g., `https://api.buildmart.example/api/v1/`).
    pub api_url: Url,
    /// Bearer token; `None` for anonymous catalog reads.
    pub token: Option<SecretString>,
    /// Sent as `Accept-Language`.
    pub locale: Option<String>,
    pub tls: TlsVerification,
    pub timeout: Duration,
    /// Page size put into the initial store filters.
    pub per_page: Option<u32>,
    /// Upload constraints applied to every file field.
    pub upload: Option<FileRule>,
}

impl ClientConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            token: None,
            locale: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            per_page: None,
            upload: None,
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.api_url.clone(),
            token: self.token.clone(),
            locale: self.locale.clone(),
            transport: TransportConfig {
                tls: TlsMode::from(&self.tls),
                timeout: self.timeout,
            },
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        let encoding = match self.upload {
            Some(ref rule) => EncoderConfig::default().validating(FileRules {
                global: Some(rule.clone()),
                ..FileRules::default()
            }),
            None => EncoderConfig::default(),
        };
        StoreConfig {
            per_page: self.per_page,
            encoding,
            ..StoreConfig::default()
        }
    }

    /// Build a gateway for this backend.
    pub fn connect(&self) -> Result<Gateway, CoreError> {
        Gateway::new(&self.gateway_config()).map_err(|e| CoreError::Config {
            message: e.to_string(),
        })
    }
}

/// Behaviour of an [`EntityStore`](crate::EntityStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Added to the initial filters as `per_page` when set.
    pub per_page: Option<u32>,
    /// Encoding used for multipart bodies (uploads, file-bearing creates).
    pub encoding: EncoderConfig,
    /// Media list that uploads land in when the caller names none.
    pub default_media_collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            per_page: None,
            encoding: EncoderConfig::default(),
            default_media_collection: "images".into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new("https://api.buildmart.test/api/v1".parse().unwrap())
    }

    #[test]
    fn store_config_without_upload_rules_skips_validation() {
        let store = config().store_config();
        assert!(!store.encoding.validate_files);
        assert_eq!(store.default_media_collection, "images");
        assert_eq!(store.per_page, None);
    }

    #[test]
    fn upload_rule_becomes_the_global_file_rule() {
        let mut cfg = config();
        cfg.per_page = Some(25);
        cfg.upload = Some(FileRule {
            max_size: Some(2048),
            allowed_types: vec!["image/*".into()],
            max_files: Some(4),
        });

        let store = cfg.store_config();
        assert!(store.encoding.validate_files);
        assert_eq!(store.per_page, Some(25));
        assert_eq!(
            store.encoding.file_rules.for_field("images").unwrap().max_files,
            Some(4)
        );
    }

    #[test]
    fn gateway_config_carries_tls_and_timeout() {
        let mut cfg = config();
        cfg.tls = TlsVerification::DangerAcceptInvalid;
        cfg.timeout = Duration::from_secs(5);

        let gw = cfg.gateway_config();
        assert!(matches!(gw.transport.tls, TlsMode::DangerAcceptInvalid));
        assert_eq!(gw.transport.timeout_secs(), 5);
    }
}
