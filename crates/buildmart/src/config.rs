//! CLI configuration: shared profile loading plus `GlobalOpts` overrides
//! (--api-url, --token, --timeout, --insecure).

use std::time::Duration;

use secrecy::SecretString;

use buildmart_core::{ClientConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use buildmart_config::{
    Config, ConfigError, Profile, config_path, load_config_or_default, save_config,
};

/// Active profile: `--profile`, then the config's default, then "default".
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the client config from the active profile and flag overrides.
///
/// Without a matching profile, `--api-url` alone is enough. An explicit
/// `--profile` that does not exist is always an error.
pub fn build_client_config(global: &GlobalOpts) -> Result<ClientConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut client = match cfg.profiles.get(&profile_name) {
        Some(profile) => {
            buildmart_config::profile_to_client_config(profile, &profile_name, &cfg.defaults)?
        }
        None if global.profile.is_some() => {
            return Err(CliError::from(ConfigError::ProfileNotFound {
                available: cfg.profile_names(),
                name: profile_name,
            }));
        }
        None => {
            let raw = global.api_url.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            let mut client = ClientConfig::new(buildmart_config::parse_api_url(raw)?);
            client.timeout = Duration::from_secs(cfg.defaults.timeout);
            client
        }
    };

    apply_overrides(&mut client, global)?;
    Ok(client)
}

fn apply_overrides(client: &mut ClientConfig, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(ref raw) = global.api_url {
        client.api_url = buildmart_config::parse_api_url(raw)?;
    }
    if let Some(ref token) = global.token {
        client.token = Some(SecretString::from(token.clone()));
    }
    if let Some(secs) = global.timeout {
        client.timeout = Duration::from_secs(secs);
    }
    if global.insecure {
        client.tls = TlsVerification::DangerAcceptInvalid;
    }
    Ok(())
}
