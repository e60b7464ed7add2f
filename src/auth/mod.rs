pub mod config;
pub mod error;
pub mod oauth;
pub mod session;

pub use error::AuthError;
pub use oauth::*;
pub use session::{JwtSessionManager, SessionClaims, SessionManager, SessionTicket};
