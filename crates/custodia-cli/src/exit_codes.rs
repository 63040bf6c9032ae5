//! Unified exit codes for the custodia binary.
//! These codes are part of the public contract for scripting and CI use.

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1; // Storage, audit or configuration error
pub const DENIED: i32 = 2; // Ingestion refused or proof rejected
