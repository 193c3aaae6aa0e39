//! Validation and parsing of settings patches.
//!
//! Every field present in a patch is checked; all violations are collected so
//! a caller sees every problem in one round-trip.

use std::str::FromStr;

use serde_json::{Map, Value};

use crate::defaults::{LIBRARY_NAME_MAX_CHARS, PASSWORD_MIN_LENGTH_RANGE};
use crate::error::{FieldViolation, SettingsError, SettingsResult};
use crate::model::{
    PasswordPolicy, PasswordPolicyPreset, SettingsDefaults, SettingsPatch, SettingsUpdate,
    TwoFactorAuthMode,
};

const PRINTABLE_VALUE_MAX_CHARS: usize = 200;
const PASSWORD_RULE_KEYS: [&str; 5] = [
    "minLength",
    "requireUppercase",
    "requireLowercase",
    "requireDigit",
    "requireSymbol",
];

/// Integer field with a lower bound.
struct CountField {
    name: &'static str,
    min: i32,
    below_min: &'static str,
}

const MAX_BOOKS_PER_USER: CountField = CountField {
    name: "maxBooksPerUser",
    min: 0,
    below_min: "must not be negative",
};
const LOAN_PERIOD_DAYS: CountField = CountField {
    name: "loanPeriodDays",
    min: 1,
    below_min: "must be at least 1",
};
const SESSION_TIMEOUT_MINUTES: CountField = CountField {
    name: "sessionTimeoutMinutes",
    min: 1,
    below_min: "must be at least 1",
};

/// Validate a wire patch into a typed update.
///
/// # Errors
///
/// Returns [`SettingsError::Validation`] listing every offending field.
pub fn validate_patch(patch: &SettingsPatch) -> SettingsResult<SettingsUpdate> {
    let mut violations = Vec::new();
    let update = SettingsUpdate {
        library_name: collect(
            &mut violations,
            patch.library_name.as_ref().map(parse_library_name),
        ),
        max_books_per_user: collect(
            &mut violations,
            patch
                .max_books_per_user
                .as_ref()
                .map(|value| parse_count(value, &MAX_BOOKS_PER_USER)),
        ),
        loan_period_days: collect(
            &mut violations,
            patch
                .loan_period_days
                .as_ref()
                .map(|value| parse_count(value, &LOAN_PERIOD_DAYS)),
        ),
        session_timeout_minutes: collect(
            &mut violations,
            patch
                .session_timeout_minutes
                .as_ref()
                .map(|value| parse_count(value, &SESSION_TIMEOUT_MINUTES)),
        ),
        password_policy: collect(
            &mut violations,
            patch.password_policy.as_ref().map(parse_password_policy),
        ),
        two_factor_auth_mode: collect(
            &mut violations,
            patch.two_factor_auth_mode.as_ref().map(parse_two_factor_mode),
        ),
    };
    finish(update, violations)
}

/// Re-check the constraints of an already typed update and normalize it.
///
/// # Errors
///
/// Returns [`SettingsError::Validation`] listing every offending field.
pub fn normalize_update(update: SettingsUpdate) -> SettingsResult<SettingsUpdate> {
    let mut violations = Vec::new();
    let normalized = SettingsUpdate {
        library_name: collect(
            &mut violations,
            update.library_name.as_deref().map(check_library_name),
        ),
        max_books_per_user: collect(
            &mut violations,
            update
                .max_books_per_user
                .map(|value| check_count(value, &MAX_BOOKS_PER_USER)),
        ),
        loan_period_days: collect(
            &mut violations,
            update
                .loan_period_days
                .map(|value| check_count(value, &LOAN_PERIOD_DAYS)),
        ),
        session_timeout_minutes: collect(
            &mut violations,
            update
                .session_timeout_minutes
                .map(|value| check_count(value, &SESSION_TIMEOUT_MINUTES)),
        ),
        password_policy: collect(
            &mut violations,
            update.password_policy.map(check_password_policy),
        ),
        two_factor_auth_mode: update.two_factor_auth_mode,
    };
    finish(normalized, violations)
}

/// Check that a full set of defaults satisfies every field constraint.
///
/// # Errors
///
/// Returns [`SettingsError::Validation`] listing every offending field.
pub fn normalize_defaults(defaults: SettingsDefaults) -> SettingsResult<SettingsDefaults> {
    let fallback = defaults.clone();
    let normalized = normalize_update(SettingsUpdate::from(defaults))?;
    Ok(SettingsDefaults {
        library_name: normalized
            .library_name
            .unwrap_or(fallback.library_name),
        ..fallback
    })
}

fn collect<T>(
    violations: &mut Vec<FieldViolation>,
    outcome: Option<Result<T, FieldViolation>>,
) -> Option<T> {
    match outcome? {
        Ok(value) => Some(value),
        Err(violation) => {
            violations.push(violation);
            None
        }
    }
}

fn finish(
    update: SettingsUpdate,
    violations: Vec<FieldViolation>,
) -> SettingsResult<SettingsUpdate> {
    if violations.is_empty() {
        Ok(update)
    } else {
        Err(SettingsError::Validation { violations })
    }
}

fn violation(field: &'static str, value: &Value, reason: &'static str) -> FieldViolation {
    FieldViolation {
        field,
        value: printable(value),
        reason,
    }
}

fn printable(value: &Value) -> Option<String> {
    let rendered = match value {
        Value::Null => return None,
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    (rendered.chars().count() <= PRINTABLE_VALUE_MAX_CHARS).then_some(rendered)
}

fn parse_count(value: &Value, field: &CountField) -> Result<i32, FieldViolation> {
    let not_integer = || violation(field.name, value, "must be an integer");
    let out_of_range = || {
        violation(
            field.name,
            value,
            "must fit within 32-bit signed integer range",
        )
    };
    let raw = match value {
        Value::Number(number) => match number.as_i64() {
            Some(raw) => raw,
            None if number.is_u64() => return Err(out_of_range()),
            None => return Err(not_integer()),
        },
        Value::String(text) => text.trim().parse::<i64>().map_err(|_| not_integer())?,
        _ => return Err(not_integer()),
    };
    let parsed = i32::try_from(raw).map_err(|_| out_of_range())?;
    if parsed < field.min {
        return Err(violation(field.name, value, field.below_min));
    }
    Ok(parsed)
}

fn check_count(value: i32, field: &CountField) -> Result<i32, FieldViolation> {
    if value < field.min {
        return Err(FieldViolation {
            field: field.name,
            value: Some(value.to_string()),
            reason: field.below_min,
        });
    }
    Ok(value)
}

fn parse_library_name(value: &Value) -> Result<String, FieldViolation> {
    let Value::String(text) = value else {
        return Err(violation("libraryName", value, "must be a string"));
    };
    check_library_name(text)
}

fn check_library_name(raw: &str) -> Result<String, FieldViolation> {
    let trimmed = raw.trim();
    let reject = |reason| FieldViolation {
        field: "libraryName",
        value: Some(raw.to_string()),
        reason,
    };
    if trimmed.is_empty() {
        return Err(reject("must not be empty"));
    }
    if trimmed.chars().count() > LIBRARY_NAME_MAX_CHARS {
        return Err(FieldViolation {
            value: None,
            ..reject("must be at most 200 characters")
        });
    }
    Ok(trimmed.to_string())
}

fn parse_password_policy(value: &Value) -> Result<PasswordPolicy, FieldViolation> {
    match value {
        Value::String(name) => PasswordPolicyPreset::from_str(name)
            .map(PasswordPolicyPreset::rules)
            .map_err(|_| violation("passwordPolicy", value, "unknown password policy preset")),
        Value::Object(rules) => parse_password_rules(value, rules),
        _ => Err(violation(
            "passwordPolicy",
            value,
            "must be a preset name or a rules object",
        )),
    }
}

fn parse_password_rules(
    value: &Value,
    rules: &Map<String, Value>,
) -> Result<PasswordPolicy, FieldViolation> {
    let reject = |reason| violation("passwordPolicy", value, reason);
    if rules
        .keys()
        .any(|key| !PASSWORD_RULE_KEYS.contains(&key.as_str()))
    {
        return Err(reject("unknown password policy rule"));
    }
    if PASSWORD_RULE_KEYS.iter().any(|key| !rules.contains_key(*key)) {
        return Err(reject("missing password policy rule"));
    }

    let min_length = rules
        .get("minLength")
        .and_then(Value::as_u64)
        .and_then(|raw| u32::try_from(raw).ok())
        .filter(|length| PASSWORD_MIN_LENGTH_RANGE.contains(length))
        .ok_or_else(|| reject("minLength must be between 6 and 128"))?;
    let flag = |key: &str| {
        rules
            .get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| reject("password policy flags must be booleans"))
    };

    Ok(PasswordPolicy {
        min_length,
        require_uppercase: flag("requireUppercase")?,
        require_lowercase: flag("requireLowercase")?,
        require_digit: flag("requireDigit")?,
        require_symbol: flag("requireSymbol")?,
    })
}

/// Bounds check shared by typed updates and rows read back from storage.
pub(crate) fn check_password_policy(
    policy: PasswordPolicy,
) -> Result<PasswordPolicy, FieldViolation> {
    if PASSWORD_MIN_LENGTH_RANGE.contains(&policy.min_length) {
        Ok(policy)
    } else {
        Err(FieldViolation {
            field: "passwordPolicy",
            value: Some(policy.to_document().to_string()),
            reason: "minLength must be between 6 and 128",
        })
    }
}

fn parse_two_factor_mode(value: &Value) -> Result<TwoFactorAuthMode, FieldViolation> {
    value
        .as_str()
        .and_then(|mode| TwoFactorAuthMode::from_str(mode).ok())
        .ok_or_else(|| {
            violation(
                "twoFactorAuthMode",
                value,
                "must be one of disabled, optional, required",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: Value) -> SettingsPatch {
        SettingsPatch::from_value(value).expect("patch should be an object")
    }

    fn violations_of(result: SettingsResult<SettingsUpdate>) -> Vec<FieldViolation> {
        match result {
            Err(SettingsError::Validation { violations }) => violations,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn accepts_integers_and_numeric_strings() {
        let update = validate_patch(&patch(json!({
            "maxBooksPerUser": 0,
            "loanPeriodDays": " 21 ",
            "sessionTimeoutMinutes": "45"
        })))
        .expect("valid patch");
        assert_eq!(update.max_books_per_user, Some(0));
        assert_eq!(update.loan_period_days, Some(21));
        assert_eq!(update.session_timeout_minutes, Some(45));
        assert!(update.library_name.is_none());
    }

    #[test]
    fn rejects_negative_loan_limit() {
        let violations = violations_of(validate_patch(&patch(json!({ "maxBooksPerUser": -1 }))));
        assert_eq!(
            violations,
            vec![FieldViolation {
                field: "maxBooksPerUser",
                value: Some("-1".to_string()),
                reason: "must not be negative",
            }]
        );
    }

    #[test]
    fn rejects_non_integers_and_overflow() {
        let violations = violations_of(validate_patch(&patch(json!({
            "maxBooksPerUser": 2.5,
            "loanPeriodDays": "two weeks",
            "sessionTimeoutMinutes": 4_294_967_296_u64
        }))));
        let reasons: Vec<_> = violations.iter().map(|v| (v.field, v.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                ("maxBooksPerUser", "must be an integer"),
                ("loanPeriodDays", "must be an integer"),
                (
                    "sessionTimeoutMinutes",
                    "must fit within 32-bit signed integer range"
                ),
            ]
        );
    }

    #[test]
    fn reports_every_offending_field() {
        let violations = violations_of(validate_patch(&patch(json!({
            "libraryName": "   ",
            "loanPeriodDays": 0,
            "sessionTimeoutMinutes": 0,
            "twoFactorAuthMode": "bogus",
            "passwordPolicy": "paranoid"
        }))));
        let fields: Vec<_> = violations.iter().map(|v| v.field).collect();
        assert_eq!(
            fields,
            vec![
                "libraryName",
                "loanPeriodDays",
                "sessionTimeoutMinutes",
                "passwordPolicy",
                "twoFactorAuthMode"
            ]
        );
    }

    #[test]
    fn library_name_is_trimmed_and_bounded() {
        let update = validate_patch(&patch(json!({ "libraryName": "  City Library " })))
            .expect("valid name");
        assert_eq!(update.library_name.as_deref(), Some("City Library"));

        let long = "x".repeat(201);
        let violations = violations_of(validate_patch(&patch(json!({ "libraryName": long }))));
        assert_eq!(violations[0].reason, "must be at most 200 characters");
        assert!(violations[0].value.is_none());

        let violations = violations_of(validate_patch(&patch(json!({ "libraryName": 7 }))));
        assert_eq!(violations[0].reason, "must be a string");
    }

    #[test]
    fn two_factor_mode_is_case_sensitive() {
        let update = validate_patch(&patch(json!({ "twoFactorAuthMode": "required" })))
            .expect("valid mode");
        assert_eq!(update.two_factor_auth_mode, Some(TwoFactorAuthMode::Required));
        let violations =
            violations_of(validate_patch(&patch(json!({ "twoFactorAuthMode": "Required" }))));
        assert_eq!(violations[0].field, "twoFactorAuthMode");
    }

    #[test]
    fn password_policy_accepts_presets_and_rules() {
        let preset = validate_patch(&patch(json!({ "passwordPolicy": "strict" })))
            .expect("preset should parse");
        assert_eq!(
            preset.password_policy,
            Some(PasswordPolicyPreset::Strict.rules())
        );

        let rules = validate_patch(&patch(json!({
            "passwordPolicy": {
                "minLength": 10,
                "requireUppercase": false,
                "requireLowercase": true,
                "requireDigit": true,
                "requireSymbol": false
            }
        })))
        .expect("rules should parse");
        let policy = rules.password_policy.expect("policy present");
        assert_eq!(policy.min_length, 10);
        assert!(!policy.require_uppercase);
    }

    #[test]
    fn password_policy_rejects_incomplete_or_out_of_bounds_rules() {
        let cases = [
            (json!({ "minLength": 8 }), "missing password policy rule"),
            (
                json!({
                    "minLength": 8, "requireUppercase": true, "requireLowercase": true,
                    "requireDigit": true, "requireSymbol": true, "maxAgeDays": 90
                }),
                "unknown password policy rule",
            ),
            (
                json!({
                    "minLength": 4, "requireUppercase": true, "requireLowercase": true,
                    "requireDigit": true, "requireSymbol": true
                }),
                "minLength must be between 6 and 128",
            ),
            (
                json!({
                    "minLength": 8, "requireUppercase": "yes", "requireLowercase": true,
                    "requireDigit": true, "requireSymbol": true
                }),
                "password policy flags must be booleans",
            ),
            (json!(12), "must be a preset name or a rules object"),
        ];
        for (value, reason) in cases {
            let violations =
                violations_of(validate_patch(&patch(json!({ "passwordPolicy": value }))));
            assert_eq!(violations[0].reason, reason);
        }
    }

    #[test]
    fn empty_and_null_patches_validate_to_empty_update() {
        let update = validate_patch(&patch(json!({ "libraryName": null, "unknown": 1 })))
            .expect("empty patch");
        assert!(update.is_empty());
    }

    #[test]
    fn typed_updates_are_rechecked() {
        let update = SettingsUpdate {
            library_name: Some("  Annex ".to_string()),
            loan_period_days: Some(0),
            ..SettingsUpdate::default()
        };
        let violations = violations_of(normalize_update(update));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "loanPeriodDays");

        let normalized = normalize_update(SettingsUpdate {
            library_name: Some("  Annex ".to_string()),
            ..SettingsUpdate::default()
        })
        .expect("valid update");
        assert_eq!(normalized.library_name.as_deref(), Some("Annex"));
    }

    #[test]
    fn defaults_are_validated() {
        assert!(normalize_defaults(SettingsDefaults::default()).is_ok());
        let broken = SettingsDefaults {
            session_timeout_minutes: 0,
            ..SettingsDefaults::default()
        };
        assert!(normalize_defaults(broken).is_err());
    }
}
