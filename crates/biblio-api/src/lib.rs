#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! HTTP surface for the Biblio system settings.
//!
//! Layout: `http/router.rs` (router + server host), `http/settings.rs` and
//! `http/health.rs` (handlers), `http/errors.rs` (problem responses),
//! `http/telemetry.rs` (request metrics middleware), `state.rs` (shared
//! handler state), `models.rs` (problem documents).

pub mod error;
pub mod http;
pub mod models;
pub(crate) mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
