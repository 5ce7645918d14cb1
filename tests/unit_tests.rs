//! Unit tests for error and type level behavior.

use std::cmp::Ordering;

use vexec::executor::hash_match::{choose_hashed_side, KeyTypes};
use vexec::executor::{ExecutorConfig, DEFAULT_BATCH_SIZE, DEFAULT_HASH_INNER_THRESHOLD};
use vexec::{DataType, HashedSide, ScalarExpression, Value, VexecError};

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_error_messages() {
    assert_eq!(
        VexecError::query("LIMIT expression must return a single non-negative integer").to_string(),
        "Query error: LIMIT expression must return a single non-negative integer"
    );
    assert_eq!(
        VexecError::invalid_argument("bad arity").to_string(),
        "Invalid argument: bad arity"
    );
    assert_eq!(VexecError::DivisionByZero.to_string(), "Division by zero");
}

#[test]
fn test_only_query_errors_are_user_facing() {
    assert!(VexecError::query("x").is_query_error());
    assert!(!VexecError::invalid_argument("x").is_query_error());
    assert!(!VexecError::NoSuchElement("Filter".into()).is_query_error());
}

// =============================================================================
// Values
// =============================================================================

#[test]
fn test_numeric_promotion() {
    assert_eq!(DataType::Int64.promote(DataType::Float32), DataType::Float64);
    assert_eq!(DataType::Any.promote(DataType::String), DataType::String);
    assert_eq!(DataType::Bool.promote(DataType::String), DataType::Any);
}

#[test]
fn test_null_compares_as_unknown() {
    assert_eq!(Value::Null.compare(&Value::Int64(1)), None);
    assert_eq!(Value::Int64(1).compare(&Value::Null), None);
}

#[test]
fn test_numeric_strings_compare_with_numbers() {
    assert_eq!(Value::from("10").compare(&Value::Int64(9)), Some(Ordering::Greater));
    assert_eq!(Value::Float64(2.0).compare(&Value::Int64(2)), Some(Ordering::Equal));
    assert_eq!(Value::from("abc").compare(&Value::Int64(1)), None);
}

#[test]
fn test_cast_rejects_lossy_conversions() {
    assert_eq!(Value::Float64(3.0).cast(DataType::Int64), Some(Value::Int64(3)));
    assert_eq!(Value::Float64(3.5).cast(DataType::Int64), None);
    assert_eq!(Value::from(" 7 ").cast(DataType::Int64), Some(Value::Int64(7)));
}

// =============================================================================
// Join keys
// =============================================================================

#[test]
fn test_mixed_numeric_keys_hash_alike() {
    let outer = vec![ScalarExpression::column("a", DataType::Int64).into_ref()];
    let inner = vec![ScalarExpression::column("b", DataType::Float64).into_ref()];
    let types = KeyTypes::new(&outer, &inner).unwrap();
    assert_eq!(types.types(), &[DataType::Float64]);
    let int_key = vec![Value::Int64(2).cast(DataType::Float64).unwrap()];
    let float_key = vec![Value::Float64(2.0)];
    assert_eq!(KeyTypes::hash(&int_key), KeyTypes::hash(&float_key));
}

#[test]
fn test_empty_key_lists_are_invalid() {
    let err = KeyTypes::new(&[], &[]).unwrap_err();
    assert!(matches!(err, VexecError::InvalidArgument(_)));
}

#[test]
fn test_default_threshold_side_choice() {
    let t = DEFAULT_HASH_INNER_THRESHOLD;
    assert_eq!(choose_hashed_side(Some(t), None, t), HashedSide::Inner);
    assert_eq!(choose_hashed_side(Some(t - 1), None, t), HashedSide::Outer);
    assert_eq!(choose_hashed_side(None, Some(t), t), HashedSide::Inner);
    assert_eq!(choose_hashed_side(None, Some(t + 1), t), HashedSide::Outer);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_defaults() {
    let config = ExecutorConfig::default();
    assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(config.hash_inner_threshold, 10_000);
    assert!(config.properties.is_empty());
}
