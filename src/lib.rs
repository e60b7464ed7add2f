pub mod auth;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod routes;
pub mod server;
#[cfg(test)]
pub mod test_utils;

pub use config::Config;
pub use server::Server;
