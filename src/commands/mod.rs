use crate::{
    Config,
    auth::AuthError,
    auth::oauth::{
        ProviderKind, ProviderRegistry,
        apple::mint_client_secret,
        providers::{ClientCredentials, ProviderConfig},
    },
    error::AppError,
};
use chrono::Utc;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate provider configuration without starting the server
    Check,
}

pub async fn handle_command(command: Commands, config: &Config) -> Result<(), AppError> {
    match command {
        Commands::Check => {
            let report = check_providers(config);
            for line in &report.lines {
                println!("{line}");
            }
            if report.usable == 0 {
                return Err(AppError::Config(::config::ConfigError::Message(
                    "no sign-in provider is usable".to_string(),
                )));
            }
            Ok(())
        }
    }
}

#[derive(Debug)]
pub struct CheckReport {
    pub lines: Vec<String>,
    pub usable: usize,
}

/// Resolve every provider kind and, for Apple, mint a throwaway client secret
/// so an unusable signing key shows up before the first sign-in does.
pub fn check_providers(config: &Config) -> CheckReport {
    let registry = ProviderRegistry::new(&config.oauth);
    let mut lines = Vec::new();
    let mut usable = 0;

    for kind in ProviderKind::ALL {
        match registry.resolve(kind.as_str()).and_then(verify_credentials) {
            Ok(provider) => {
                usable += 1;
                lines.push(format!("{kind}: ok (callback {})", provider.redirect_uri));
            }
            Err(e) => lines.push(format!("{kind}: unavailable ({e})")),
        }
    }

    CheckReport { lines, usable }
}

fn verify_credentials(provider: ProviderConfig) -> Result<ProviderConfig, AuthError> {
    if let ClientCredentials::AppleKey(key) = &provider.credentials {
        mint_client_secret(key, &provider.client_id, Utc::now())?;
    }
    Ok(provider)
}
