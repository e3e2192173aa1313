pub mod api;
pub mod auth;
pub mod client;

pub use auth::TokenInfo;
pub use client::TraktClient;
