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

//! Biblio application bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (environment configuration and service wiring),
//! `error.rs` (`AppError`).

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Application-level error types.
pub mod error;

pub use bootstrap::{AppConfig, StoreBackend, run_app};
pub use error::{AppError, AppResult};
