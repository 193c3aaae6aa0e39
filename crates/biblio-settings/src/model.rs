//! Typed settings models and change payloads.
//!
//! # Design
//! - Pure data carriers shared by the service, the stores and the HTTP layer.
//! - `SettingsPatch` is what arrives on the wire; `SettingsUpdate` is what the
//!   stores merge once validation has run.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::defaults::{
    DEFAULT_LIBRARY_NAME, DEFAULT_LOAN_PERIOD_DAYS, DEFAULT_MAX_BOOKS_PER_USER,
    DEFAULT_SESSION_TIMEOUT_MINUTES, SETTINGS_ID,
};

/// The singleton system settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    /// Fixed primary key of the record.
    pub id: Uuid,
    /// Display name of the library.
    pub library_name: String,
    /// Maximum concurrent loans per user.
    pub max_books_per_user: i32,
    /// Loan period in days.
    pub loan_period_days: i32,
    /// Idle session timeout in minutes.
    pub session_timeout_minutes: i32,
    /// Password rules enforced for user accounts.
    pub password_policy: PasswordPolicy,
    /// Two-factor enrolment mode.
    pub two_factor_auth_mode: TwoFactorAuthMode,
    /// Monotonic version bumped by every applied update.
    pub version: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl SystemSettings {
    /// Build a freshly created record (version 1) from `defaults`.
    #[must_use]
    pub fn from_defaults(defaults: &SettingsDefaults, at: DateTime<Utc>) -> Self {
        Self {
            id: SETTINGS_ID,
            library_name: defaults.library_name.clone(),
            max_books_per_user: defaults.max_books_per_user,
            loan_period_days: defaults.loan_period_days,
            session_timeout_minutes: defaults.session_timeout_minutes,
            password_policy: defaults.password_policy,
            two_factor_auth_mode: defaults.two_factor_auth_mode,
            version: 1,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Fully populated field values used when the record has to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDefaults {
    /// Display name of the library.
    pub library_name: String,
    /// Maximum concurrent loans per user.
    pub max_books_per_user: i32,
    /// Loan period in days.
    pub loan_period_days: i32,
    /// Idle session timeout in minutes.
    pub session_timeout_minutes: i32,
    /// Password rules.
    pub password_policy: PasswordPolicy,
    /// Two-factor enrolment mode.
    pub two_factor_auth_mode: TwoFactorAuthMode,
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self {
            library_name: DEFAULT_LIBRARY_NAME.to_string(),
            max_books_per_user: DEFAULT_MAX_BOOKS_PER_USER,
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
            session_timeout_minutes: DEFAULT_SESSION_TIMEOUT_MINUTES,
            password_policy: PasswordPolicy::default(),
            two_factor_auth_mode: TwoFactorAuthMode::default(),
        }
    }
}

/// Two-factor enrolment mode recorded in `system_settings.two_factor_auth_mode`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactorAuthMode {
    /// Two-factor authentication is not offered.
    #[default]
    Disabled,
    /// Users may enrol a second factor.
    Optional,
    /// Every user must enrol a second factor.
    Required,
}

impl FromStr for TwoFactorAuthMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "optional" => Ok(Self::Optional),
            "required" => Ok(Self::Required),
            other => Err(anyhow!("invalid two-factor mode '{other}'")),
        }
    }
}

impl TwoFactorAuthMode {
    #[must_use]
    /// Render the mode as its lowercase string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Optional => "optional",
            Self::Required => "required",
        }
    }
}

impl fmt::Display for TwoFactorAuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named password policy shorthands accepted in patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordPolicyPreset {
    /// Length only.
    Basic,
    /// Mixed case and digits.
    Standard,
    /// Mixed case, digits and symbols with a longer minimum.
    Strict,
}

impl FromStr for PasswordPolicyPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "standard" => Ok(Self::Standard),
            "strict" => Ok(Self::Strict),
            other => Err(anyhow!("invalid password policy preset '{other}'")),
        }
    }
}

impl PasswordPolicyPreset {
    #[must_use]
    /// Render the preset as its identifier.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Strict => "strict",
        }
    }

    /// Expand the preset into concrete rules.
    #[must_use]
    pub const fn rules(self) -> PasswordPolicy {
        match self {
            Self::Basic => PasswordPolicy {
                min_length: 6,
                require_uppercase: false,
                require_lowercase: false,
                require_digit: false,
                require_symbol: false,
            },
            Self::Standard => PasswordPolicy {
                min_length: 8,
                require_uppercase: true,
                require_lowercase: true,
                require_digit: true,
                require_symbol: false,
            },
            Self::Strict => PasswordPolicy {
                min_length: 12,
                require_uppercase: true,
                require_lowercase: true,
                require_digit: true,
                require_symbol: true,
            },
        }
    }
}

/// Password rules applied to user account credentials.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PasswordPolicy {
    /// Minimum length in characters.
    pub min_length: u32,
    /// At least one uppercase letter.
    pub require_uppercase: bool,
    /// At least one lowercase letter.
    pub require_lowercase: bool,
    /// At least one decimal digit.
    pub require_digit: bool,
    /// At least one character that is neither alphanumeric nor whitespace.
    pub require_symbol: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        PasswordPolicyPreset::Standard.rules()
    }
}

/// Individual rule a candidate password can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PasswordRule {
    /// Shorter than `minLength`.
    MinLength,
    /// No uppercase letter.
    Uppercase,
    /// No lowercase letter.
    Lowercase,
    /// No digit.
    Digit,
    /// No symbol.
    Symbol,
}

impl PasswordPolicy {
    /// Rules that `candidate` does not satisfy; empty when it is acceptable.
    #[must_use]
    pub fn check(&self, candidate: &str) -> Vec<PasswordRule> {
        let mut unmet = Vec::new();
        let length = candidate.chars().count();
        if usize::try_from(self.min_length).is_ok_and(|min| length < min) {
            unmet.push(PasswordRule::MinLength);
        }
        let lacks = |required: bool, matches: fn(char) -> bool| {
            required && !candidate.chars().any(matches)
        };
        if lacks(self.require_uppercase, char::is_uppercase) {
            unmet.push(PasswordRule::Uppercase);
        }
        if lacks(self.require_lowercase, char::is_lowercase) {
            unmet.push(PasswordRule::Lowercase);
        }
        if lacks(self.require_digit, |ch| ch.is_ascii_digit()) {
            unmet.push(PasswordRule::Digit);
        }
        if lacks(self.require_symbol, |ch| {
            !ch.is_alphanumeric() && !ch.is_whitespace()
        }) {
            unmet.push(PasswordRule::Symbol);
        }
        unmet
    }

    /// JSON document stored in the `password_policy` column.
    #[must_use]
    pub fn to_document(&self) -> Value {
        json!({
            "minLength": self.min_length,
            "requireUppercase": self.require_uppercase,
            "requireLowercase": self.require_lowercase,
            "requireDigit": self.require_digit,
            "requireSymbol": self.require_symbol,
        })
    }
}

/// Wire form of a partial update: recognized keys carry raw JSON values.
///
/// Unrecognized keys are dropped during deserialization and `null` values
/// deserialize to `None`, so both behave as if the key was absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    /// Raw `libraryName` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_name: Option<Value>,
    /// Raw `maxBooksPerUser` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_books_per_user: Option<Value>,
    /// Raw `loanPeriodDays` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_period_days: Option<Value>,
    /// Raw `sessionTimeoutMinutes` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout_minutes: Option<Value>,
    /// Raw `passwordPolicy` value (preset identifier or rules object).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_policy: Option<Value>,
    /// Raw `twoFactorAuthMode` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub two_factor_auth_mode: Option<Value>,
}

impl SettingsPatch {
    /// Interpret an arbitrary JSON document as a patch.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(anyhow!("settings patch must be a JSON object"));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Validated partial update; `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    /// Replacement library name (already trimmed).
    pub library_name: Option<String>,
    /// Replacement loan limit.
    pub max_books_per_user: Option<i32>,
    /// Replacement loan period.
    pub loan_period_days: Option<i32>,
    /// Replacement session timeout.
    pub session_timeout_minutes: Option<i32>,
    /// Replacement password rules.
    pub password_policy: Option<PasswordPolicy>,
    /// Replacement two-factor mode.
    pub two_factor_auth_mode: Option<TwoFactorAuthMode>,
}

impl SettingsUpdate {
    /// Whether the update carries no field at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Wire names of the fields present in the update.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        [
            ("libraryName", self.library_name.is_some()),
            ("maxBooksPerUser", self.max_books_per_user.is_some()),
            ("loanPeriodDays", self.loan_period_days.is_some()),
            ("sessionTimeoutMinutes", self.session_timeout_minutes.is_some()),
            ("passwordPolicy", self.password_policy.is_some()),
            ("twoFactorAuthMode", self.two_factor_auth_mode.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
    }

    /// Merge the present fields over `base`. Metadata is carried over unchanged.
    #[must_use]
    pub fn apply_to(&self, base: &SystemSettings) -> SystemSettings {
        SystemSettings {
            library_name: self
                .library_name
                .clone()
                .unwrap_or_else(|| base.library_name.clone()),
            max_books_per_user: self.max_books_per_user.unwrap_or(base.max_books_per_user),
            loan_period_days: self.loan_period_days.unwrap_or(base.loan_period_days),
            session_timeout_minutes: self
                .session_timeout_minutes
                .unwrap_or(base.session_timeout_minutes),
            password_policy: self.password_policy.unwrap_or(base.password_policy),
            two_factor_auth_mode: self.two_factor_auth_mode.unwrap_or(base.two_factor_auth_mode),
            ..base.clone()
        }
    }
}

impl From<SettingsDefaults> for SettingsUpdate {
    fn from(defaults: SettingsDefaults) -> Self {
        Self {
            library_name: Some(defaults.library_name),
            max_books_per_user: Some(defaults.max_books_per_user),
            loan_period_days: Some(defaults.loan_period_days),
            session_timeout_minutes: Some(defaults.session_timeout_minutes),
            password_policy: Some(defaults.password_policy),
            two_factor_auth_mode: Some(defaults.two_factor_auth_mode),
        }
    }
}
