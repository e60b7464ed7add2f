//! Social sign-in over OAuth 2.0 / OpenID Connect
//!
//! Supports Google, Facebook and Sign in with Apple. Apple authenticates the
//! client with a per-request ES256 assertion instead of a static secret.

pub mod apple;
pub mod der;
pub mod flows;
pub mod identity;
pub mod profile;
pub mod providers;
pub mod state;
pub mod token;

pub use flows::{
    CallbackParams, FlowRedirect, LoginEvent, OAuthFlows, ProviderInfo, ProvidersResponse,
};
pub use identity::{Identity, IdentityResolver, MemoryUserStore, UserStore, UserStoreError};
pub use profile::{ProfileNormalizer, UserProfile};
pub use providers::{ProviderConfig, ProviderKind, ProviderRegistry};
pub use state::{OAUTH_STATE_TTL_SECONDS, StateData, StateStore};
pub use token::{TokenExchangeClient, TokenResponse};
