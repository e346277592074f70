//! # Core Module
//!
//! Core types, traits, and errors for the Rustine transaction coordinator.
//!
//! This module provides the foundational building blocks:
//!
//! - **Error types**: Structured error hierarchy for coordinator operations
//! - **Propagation / `IsolationLevel`**: the closed enums the state machine dispatches on
//! - **`TransactionDefinition` / `ManagerOptions`**: per-`begin` and manager-level configuration

mod config;
mod error;

pub use config::*;
pub use error::*;
