//! # Local Host Bridges
//!
//! Native single-host implementations of the `offload-bridge` traits:
//! tokio-backed file access, a reqwest HTTP client, task-spawn background
//! dispatch, an interval scheduler, and an in-memory asset catalog for
//! embedding hosts and tests.

pub mod background;
pub mod catalog;
pub mod filesystem;
pub mod http;

pub use background::{IntervalScheduler, TaskDispatcher};
pub use catalog::MemoryCatalog;
pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
