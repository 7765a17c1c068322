use thiserror::Error;

/// Canonical Slate error taxonomy used across crates.
///
/// Classification guidance:
/// - [`SlateError::Planning`]: query shape/name resolution failures discovered before execution
/// - [`SlateError::TypeMismatch`]: strict-typing failures (incompatible or non-primitive operands)
/// - [`SlateError::Execution`]: runtime expression evaluation or data-shape failures
/// - [`SlateError::InvalidConfig`]: catalog/config contract violations
/// - [`SlateError::Unsupported`]: valid query shape that analysis intentionally does not support
/// - [`SlateError::Io`]: raw filesystem/network IO failures from std APIs
#[derive(Debug, Error)]
pub enum SlateError {
    /// Invalid or inconsistent configuration/catalog state.
    ///
    /// Examples:
    /// - zero analysis pass budget
    /// - catalog returning a schema that violates its own contract
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Query planning/analyzer failures other than typing.
    ///
    /// Examples:
    /// - unknown table/column
    /// - ambiguous column reference
    #[error("planning error: {0}")]
    Planning(String),

    /// Strict-typing failures during expression resolution.
    ///
    /// Examples:
    /// - no widest common type between comparison operands
    /// - IN-list element that cannot be narrowed into the test type
    /// - sort key with a non-primitive type
    ///
    /// A type mismatch is terminal for the analysis attempt; the message names
    /// the operator and the operand types so the user can diagnose it.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Runtime evaluation failures after analysis succeeded.
    #[error("execution error: {0}")]
    Execution(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Valid request for a feature/shape not implemented in current version.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Standard Slate result alias.
pub type Result<T> = std::result::Result<T, SlateError>;
