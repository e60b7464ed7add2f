use thiserror::Error;

use crate::auth::oauth::providers::ProviderKind;

/// Every way a social sign-in can fail.
///
/// `Display` is for server-side logs only. What the browser sees comes from
/// [`AuthError::user_notice`], which never includes provider payloads or secrets.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("provider '{provider}' is not available: {reason}")]
    Configuration { provider: String, reason: String },

    #[error("provider returned error '{error}'")]
    ProviderDenied {
        error: String,
        description: Option<String>,
    },

    #[error("state verification failed")]
    Csrf,

    #[error("transport failure talking to {provider}: {detail}")]
    Transport { provider: ProviderKind, detail: String },

    #[error("token endpoint of {provider} failed: {detail}")]
    Token { provider: ProviderKind, detail: String },

    #[error("unusable profile from {provider}: {reason}")]
    Profile {
        provider: ProviderKind,
        reason: String,
    },

    #[error("identity resolution failed: {0}")]
    Identity(String),

    #[error("session could not be established: {0}")]
    Session(String),

    #[error("state store unavailable: {0}")]
    StateStore(String),
}

impl AuthError {
    pub fn configuration(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        AuthError::Configuration {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Configuration { .. } => "configuration_error",
            AuthError::ProviderDenied { .. } => "provider_denied",
            AuthError::Csrf => "csrf_error",
            AuthError::Transport { .. } => "transport_error",
            AuthError::Token { .. } => "token_error",
            AuthError::Profile { .. } => "profile_error",
            AuthError::Identity(_) => "identity_error",
            AuthError::Session(_) => "session_error",
            AuthError::StateStore(_) => "state_store_error",
        }
    }

    /// The one notice shown to the user for this failure
    pub fn user_notice(&self) -> String {
        match self {
            AuthError::Configuration { .. } => {
                "This login method is not available.".to_string()
            }
            AuthError::ProviderDenied { description, .. } => description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| "The sign-in was cancelled or could not be completed.".to_string()),
            AuthError::Csrf => "Security check failed, please try again.".to_string(),
            AuthError::Transport { .. } | AuthError::Token { .. } => {
                "We could not complete the sign-in with the provider, please try again.".to_string()
            }
            AuthError::Profile { provider, .. } => match provider {
                ProviderKind::Google => "Your Google account did not share an email address. \
                     Please allow access to your email address and try again."
                    .to_string(),
                ProviderKind::Facebook => "Facebook did not share your email address. \
                     Please grant the email permission and try again."
                    .to_string(),
                ProviderKind::Apple => "Apple did not share your email address. \
                     Please try again and allow sharing your email."
                    .to_string(),
            },
            AuthError::Identity(_) => {
                "We could not create your account, please try registering manually.".to_string()
            }
            AuthError::Session(_) => "We could not sign you in, please try again.".to_string(),
            AuthError::StateStore(_) => {
                "Sign-in is temporarily unavailable, please try again later.".to_string()
            }
        }
    }
}
