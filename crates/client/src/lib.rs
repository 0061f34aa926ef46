//! HTTP client for the localization management API.

pub mod http;

pub use http::HttpStore;
