//! Shared error types for Slate crates.
//!
//! Architecture role:
//! - provides the common [`SlateError`] / [`Result`] contracts used by the
//!   analyzer and any downstream planning/execution layers

pub mod error;

pub use error::{Result, SlateError};
