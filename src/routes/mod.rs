pub mod auth;

pub use auth::create_auth_routes;
