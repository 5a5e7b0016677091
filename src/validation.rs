// ✅ Field Validation - explicit range rules for parsed values
// Every rule reports the field it checked; the parser turns the first failure
// into a MalformedRecord instead of coercing the value.

use serde::{Deserialize, Serialize};

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub rule_name: String,
    pub field: String,
    pub message: String,
}

impl ValidationResult {
    pub fn pass(rule_name: &str, field: &str) -> Self {
        ValidationResult {
            passed: true,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: String::new(),
        }
    }

    pub fn fail(rule_name: &str, field: &str, message: &str) -> Self {
        ValidationResult {
            passed: false,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// First failed rule in evaluation order, if any
pub fn first_failure(results: Vec<ValidationResult>) -> Option<ValidationResult> {
    results.into_iter().find(|r| !r.passed)
}

// ============================================================================
// RULES
// ============================================================================

/// Join identifiers are exact-match and case-sensitive, so only emptiness is
/// rejected; surrounding whitespace has already been trimmed.
pub fn validate_member_id(member_id: &str) -> ValidationResult {
    if member_id.is_empty() {
        return ValidationResult::fail("member_id_not_empty", "memberID", "memberID is empty");
    }

    ValidationResult::pass("member_id_present", "memberID")
}

pub fn validate_age(age: i64) -> ValidationResult {
    if age < 0 {
        return ValidationResult::fail(
            "age_non_negative",
            "age",
            &format!("age must be >= 0, got {}", age),
        );
    }

    if age > u32::MAX as i64 {
        return ValidationResult::fail("age_in_range", "age", &format!("age out of range: {}", age));
    }

    ValidationResult::pass("age_valid", "age")
}

/// Heights and weights: finite and strictly positive
pub fn validate_positive(field: &str, value: f64) -> ValidationResult {
    if !value.is_finite() {
        return ValidationResult::fail(
            "value_finite",
            field,
            &format!("{} is not a finite number", field),
        );
    }

    if value <= 0.0 {
        return ValidationResult::fail(
            "value_positive",
            field,
            &format!("{} must be > 0, got {}", field, value),
        );
    }

    ValidationResult::pass("value_positive", field)
}

/// Calorie metrics: finite and >= 0
pub fn validate_non_negative(field: &str, value: f64) -> ValidationResult {
    if !value.is_finite() {
        return ValidationResult::fail(
            "value_finite",
            field,
            &format!("{} is not a finite number", field),
        );
    }

    if value < 0.0 {
        return ValidationResult::fail(
            "value_non_negative",
            field,
            &format!("{} must be >= 0, got {}", field, value),
        );
    }

    ValidationResult::pass("value_non_negative", field)
}

pub fn validate_sleep_hours(value: f64) -> ValidationResult {
    if !value.is_finite() || !(0.0..=24.0).contains(&value) {
        return ValidationResult::fail(
            "sleep_in_day",
            "sleepHours",
            &format!("sleepHours must be within [0, 24], got {}", value),
        );
    }

    ValidationResult::pass("sleep_in_day", "sleepHours")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_rules() {
        assert!(validate_age(0).passed);
        assert!(validate_age(30).passed);

        let negative = validate_age(-1);
        assert!(!negative.passed);
        assert_eq!(negative.field, "age");
    }

    #[test]
    fn test_positive_rejects_zero_and_nan() {
        assert!(validate_positive("heightCm", 165.0).passed);
        assert!(!validate_positive("heightCm", 0.0).passed);
        assert!(!validate_positive("weightKg", f64::NAN).passed);
        assert!(!validate_positive("weightKg", f64::INFINITY).passed);
    }

    #[test]
    fn test_non_negative_accepts_zero() {
        assert!(validate_non_negative("caloriesBurned", 0.0).passed);
        assert!(!validate_non_negative("caloriesBurned", -0.5).passed);
    }

    #[test]
    fn test_sleep_bounds_are_inclusive() {
        assert!(validate_sleep_hours(0.0).passed);
        assert!(validate_sleep_hours(24.0).passed);
        assert!(!validate_sleep_hours(24.01).passed);
        assert!(!validate_sleep_hours(-1.0).passed);
    }

    #[test]
    fn test_first_failure_keeps_order() {
        let failure = first_failure(vec![
            validate_member_id("m1"),
            validate_age(-2),
            validate_positive("heightCm", -1.0),
        ])
        .unwrap();

        assert_eq!(failure.field, "age");
        assert!(first_failure(vec![validate_member_id("m1")]).is_none());
    }
}
