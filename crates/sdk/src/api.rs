//! Rember API endpoints.

pub mod rembs;

pub use rembs::RembsApi;
