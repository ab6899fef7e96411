// Request authentication and bearer token verification
pub mod auth;

// HTTP API surface
pub mod api;

// Startup configuration
pub mod config;

// Encrypted credential storage
pub mod credentials;

// Thin provider API clients
pub mod providers;

// Integration sessions and OAuth flows
pub mod session;
