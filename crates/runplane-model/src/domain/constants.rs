//! Common model-level constants.
//!
//! Well-known prefixes for generated identifiers, kept here so that every
//! layer (core, api, logs) agrees on how ids look.

/// Prefix of every generated run identifier.
pub const RUN_ID_PREFIX: &str = "run-";

/// Prefix of every generated runner identifier.
pub const RUNNER_ID_PREFIX: &str = "runner-";
