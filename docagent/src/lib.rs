//! Sandboxed language-model agent that writes a package's documentation.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: pure logic (conversation types, reply classification,
//!   protected-region checks). No I/O.
//! - **[`io`]**: side effects (filesystem sandbox, managed document, model
//!   transport, tool providers, terminal interaction).
//! - **[`tools`]**: the registry the model calls into.
//!
//! [`agent`] runs the tool-calling loop for one prompt and [`task`] drives
//! a whole documentation task on top of it.

pub mod agent;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
