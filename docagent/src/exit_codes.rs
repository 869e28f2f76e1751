//! Stable exit codes for `docagent` commands.

/// Command succeeded; for `update`, the document was accepted.
pub const OK: i32 = 0;
/// Startup, configuration or transport error.
pub const ERROR: i32 = 1;
/// The task failed: error-like reply or write attempts exhausted.
pub const FAILED: i32 = 2;
/// The user cancelled; the document was restored.
pub const CANCELLED: i32 = 3;
