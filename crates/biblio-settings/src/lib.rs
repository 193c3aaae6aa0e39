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

//! System settings singleton: storage abstraction, validation and service.
//!
//! Layout: `model.rs` (settings record, patches and typed updates),
//! `validate.rs` (patch parsing and field constraints), `store/` (the
//! `SettingsStore` trait with `PostgreSQL` and in-memory backends),
//! `service.rs` (`SettingsService` + `SettingsFacade`).

pub mod defaults;
pub mod error;
pub mod model;
pub mod service;
pub mod store;
pub mod validate;

pub use defaults::SETTINGS_ID;
pub use error::{FieldViolation, SettingsError, SettingsErrorKind, SettingsResult};
pub use model::{
    PasswordPolicy, PasswordPolicyPreset, PasswordRule, SettingsDefaults, SettingsPatch,
    SettingsUpdate, SystemSettings, TwoFactorAuthMode,
};
pub use service::{SettingsFacade, SettingsService};
pub use store::{MemorySettingsStore, PgSettingsStore, SettingsStore};
