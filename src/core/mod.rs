/// Core Module for DSH
///
/// This module contains the database abstraction shared by every tool:
/// the error type, the value model, and the per-engine adapters.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DshError, ErrorCategory, Result};
