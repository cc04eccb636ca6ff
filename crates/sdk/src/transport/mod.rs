//! Transport layer for the Rember SDK.

pub mod http;

pub use http::HttpTransport;
