//! Contract tests for the public vector and operator APIs.

#[path = "executor_contracts/mod.rs"]
mod executor_contracts;
