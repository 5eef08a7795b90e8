// x8000-api: Async Rust client for the Legrand Smarther v2 cloud API

pub mod auth;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod models;
pub mod push;
pub mod transport;

pub use auth::{AccessToken, OAuthClient, TokenGrant};
pub use client::{ApiClient, ApiResponse};
pub use endpoint::Endpoint;
pub use error::Error;
pub use metrics::{ApiMetrics, MetricsSnapshot};
pub use transport::{RetryPolicy, TransportConfig};
