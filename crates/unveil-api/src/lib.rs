// HTTP client for the Unveil backend: auth, profiles, matches, staged
// reveals, and the vibe check.

pub mod client;
pub mod config;
pub mod error;

pub use client::{ApiClient, AuthRequest, AuthResponse, ProfileUpdate};
pub use config::ApiConfig;
pub use error::ApiError;
