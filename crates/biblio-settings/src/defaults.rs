//! Default identifiers and field values for the settings record.
//!
//! # Design
//! - Centralize the singleton key so the schema check and the service agree.
//! - Every field has a default here; a freshly created record is never partial.

use uuid::Uuid;

/// Static ID for the singleton system settings row.
pub const SETTINGS_ID: Uuid = Uuid::from_u128(1);
/// Display name used until an operator renames the library.
pub const DEFAULT_LIBRARY_NAME: &str = "Library";
/// Default cap on concurrent loans per user.
pub const DEFAULT_MAX_BOOKS_PER_USER: i32 = 5;
/// Default loan period in days.
pub const DEFAULT_LOAN_PERIOD_DAYS: i32 = 14;
/// Default idle session timeout in minutes.
pub const DEFAULT_SESSION_TIMEOUT_MINUTES: i32 = 30;
/// Longest accepted library name, counted in characters.
pub const LIBRARY_NAME_MAX_CHARS: usize = 200;
/// Inclusive bounds for the password `minLength` rule.
pub const PASSWORD_MIN_LENGTH_RANGE: std::ops::RangeInclusive<u32> = 6..=128;
