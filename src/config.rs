use crate::{
    auth::config::{OAuthConfig, SessionConfig},
    cache::config::CacheConfig,
};
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

const ENV_PREFIX: &str = "SOCIAL_SSO";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Log one line per `/auth` request and response
    #[serde(default = "default_log_request")]
    pub log_request: bool,
}

fn default_log_request() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_request: default_log_request(),
        }
    }
}

impl Config {
    /// Defaults, then `config.yaml` in the working directory if present, then
    /// `SOCIAL_SSO_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(env_source());

        builder.build()?.try_deserialize()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder = builder.add_source(env_source());

        builder.build()?.try_deserialize()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oauth::ProviderKind;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.oauth.state_ttl, 600);
        assert_eq!(config.oauth.http_timeout, 30);
        assert_eq!(config.cache.backend, "memory");
        assert_eq!(config.session.cookie_name, "social_sso_session");
        assert!(config.oauth.providers.is_empty());
    }

    #[test]
    fn test_config_load_from_yaml_file() {
        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 4000
logging:
  level: "debug"
oauth:
  base_url: "https://shop.example.com"
  login_url: "/login"
  providers:
    google:
      enabled: true
      client_id: "google-client"
      client_secret: "google-secret"
    apple:
      enabled: true
      client_id: "com.example.web"
      team_id: "TEAM123456"
      key_id: "KEYID12345"
      private_key_path: "/etc/social-sso/AuthKey.p8"
session:
  secret: "session-secret"
  secure: false
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = Config::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.oauth.base_url, "https://shop.example.com");
        assert_eq!(config.oauth.login_url, "/login");
        assert_eq!(config.oauth.account_url, "/account");

        let google = &config.oauth.providers["google"];
        assert!(google.enabled);
        assert_eq!(
            google.client_secret.as_ref().unwrap().expose_secret(),
            "google-secret"
        );

        let apple = &config.oauth.providers["apple"];
        assert_eq!(apple.team_id.as_deref(), Some("TEAM123456"));
        assert!(apple.private_key_path.is_some());

        assert_eq!(
            config.session.secret.as_ref().unwrap().expose_secret(),
            "session-secret"
        );
        assert!(!config.session.secure);
    }

    #[test]
    fn test_providers_resolve_from_loaded_config() {
        let yaml_content = r#"
oauth:
  providers:
    facebook:
      enabled: true
      client_id: "fb-app"
      client_secret: "fb-secret"
"#;
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = Config::load_from_file(temp_file.path()).unwrap();
        let registry = crate::auth::oauth::ProviderRegistry::new(&config.oauth);
        let facebook = registry.resolve("facebook").unwrap();

        assert_eq!(facebook.kind, ProviderKind::Facebook);
        assert_eq!(
            facebook.redirect_uri,
            "http://localhost:3000/auth/facebook/callback"
        );
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let config = Config::load_from_file("nonexistent.yaml").unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
    }
}
