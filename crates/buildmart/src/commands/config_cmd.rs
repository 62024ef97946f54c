//! Config subcommand handlers.

use dialoguer::{Input, Password, Select};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of the config with plaintext tokens masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(MASK.into());
        }
    }
    cfg
}

/// TOML-like view for table output. Expects an already redacted config.
fn format_config(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    for name in cfg.profile_names() {
        let p = &cfg.profiles[&name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "api_url = \"{}\"", p.api_url);
        if let Some(ref token) = p.token {
            let _ = writeln!(out, "token = \"{token}\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ref locale) = p.locale {
            let _ = writeln!(out, "locale = \"{locale}\"");
        }
        if let Some(per_page) = p.per_page {
            let _ = writeln!(out, "per_page = {per_page}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(ref upload) = p.upload {
            let _ = writeln!(out, "upload = {upload:?}");
        }
    }

    out
}

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn prompt_token() -> Result<String, CliError> {
    Password::new()
        .with_prompt("API token (leave empty for anonymous access)")
        .allow_empty_password(true)
        .interact()
        .map_err(prompt_err)
}

/// Keep a token in the keyring, or hand it back for the config file.
fn store_token_interactively(profile_name: &str, token: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the token?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        buildmart_config::store_token(profile_name, token)?;
        eprintln!("   ✓ Token stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(token.to_owned()))
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config_or_default());
            let out = output::render_single(&global.output, &cfg, format_config, |_| {
                "config".into()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: buildmart config init");
            }
            for name in cfg.profile_names() {
                let marker = if name == default { " *" } else { "" };
                println!("{name}{marker}");
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            cfg.profile(&name)?;
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            output::success(
                &format!("Default profile set to '{name}'"),
                &global.color,
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::SetToken { profile } => {
            let cfg = config::load_config_or_default();
            let name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            cfg.profile(&name)?;

            let token = prompt_token()?;
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }
            buildmart_config::store_token(&name, &token)?;
            output::success(
                &format!("Token for '{name}' stored in system keyring"),
                &global.color,
                global.quiet,
            );
            Ok(())
        }
    }
}

/// Guided setup. Adds (or replaces) one profile and keeps the others.
fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let config_path = config::config_path();
    eprintln!("Buildmart CLI configuration");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut cfg = config::load_config_or_default();

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default(config::active_profile_name(global, &cfg))
        .interact_text()
        .map_err(prompt_err)?;

    let api_url: String = Input::new()
        .with_prompt("API URL")
        .default("https://api.buildmart.example/api".into())
        .validate_with(|input: &String| {
            buildmart_config::parse_api_url(input)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()
        .map_err(prompt_err)?;

    let locale: String = Input::new()
        .with_prompt("Locale (Accept-Language)")
        .default("en".into())
        .interact_text()
        .map_err(prompt_err)?;

    let token = prompt_token()?;
    let token = if token.is_empty() {
        None
    } else {
        store_token_interactively(&profile_name, &token)?
    };

    let previous = cfg.profiles.remove(&profile_name).unwrap_or_default();
    cfg.profiles.insert(
        profile_name.clone(),
        Profile {
            api_url,
            token,
            locale: Some(locale).filter(|l| !l.is_empty()),
            ..previous
        },
    );
    cfg.default_profile = Some(profile_name.clone());

    let path = config::save_config(&cfg)?;
    eprintln!("\n✓ Configuration written to {}", path.display());
    eprintln!("  Active profile: {profile_name}");
    eprintln!("\n  Test it: buildmart products list");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_never_prints_plaintext_tokens() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                api_url: "http://localhost:8000/api".into(),
                token: Some("super-secret".into()),
                token_env: Some("BM_TOKEN".into()),
                ..Profile::default()
            },
        );

        let out = format_config(&redacted(&cfg));
        assert!(!out.contains("super-secret"));
        assert!(out.contains("token = \"****\""));
        assert!(out.contains("token_env = \"BM_TOKEN\""));
    }
}
