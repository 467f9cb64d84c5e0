//! # Host Bridge Traits
//!
//! Capability traits the offload engine consumes from its host.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync engine and the
//! environment it runs in. Each trait represents a capability the engine
//! requires but does not own: the asset catalog, local file storage, the
//! remote object/CDN store, HTTP transport, background dispatch, and
//! scheduling.
//!
//! ## Traits
//!
//! ### Storage & Assets
//! - [`AssetCatalog`](catalog::AssetCatalog) - Query-by-predicate over host media assets
//! - [`FileSystemAccess`](fs::FileSystemAccess) - Local media byte storage
//! - [`RemoteMediaStore`](remote::RemoteMediaStore) - Remote object/CDN operations
//!
//! ### Execution
//! - [`BackgroundDispatcher`](background::BackgroundDispatcher) - Fire-and-forget "run this soon, out of band"
//! - [`Scheduler`](background::Scheduler) - "Run this callback again every N seconds"
//!
//! ### Utilities
//! - [`HttpClient`](http::HttpClient) - Async HTTP transport for connectors
//! - [`Clock`](time::Clock) - Injectable time source for deterministic tests
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert their native errors into it and keep messages actionable. Remote
//! store responses that the engine must distinguish ("already exists",
//! "restricted file type", unreachable) have dedicated variants so handlers
//! can match on them instead of parsing strings.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`; implementations are shared across async
//! tasks behind `Arc`.

pub mod background;
pub mod catalog;
pub mod error;
pub mod fs;
pub mod http;
pub mod remote;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use background::{BackgroundDispatcher, DispatchHandler, DispatchRequest, Scheduler};
pub use catalog::{AssetCatalog, AssetRecord, MediaKind};
pub use fs::{FileMetadata, FileSystemAccess};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use remote::{RemoteMediaStore, RemoteResource, TransformResult, UploadRequest, UploadResult};
pub use time::{Clock, ManualClock, SystemClock};
