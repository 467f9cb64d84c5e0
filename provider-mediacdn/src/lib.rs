//! Media CDN provider
//!
//! Implements the `RemoteMediaStore` trait against a media CDN's
//! upload/admin HTTP API.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::MediaCdnConnector;
pub use error::MediaCdnError;
