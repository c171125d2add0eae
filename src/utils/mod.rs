//! Utility Functions
//!
//! ## Error Formatting
//!
//! The [`errors`] module turns fatal errors into user-friendly messages:
//!
//! ```rust
//! use lamco_clipshare::utils::format_user_error;
//!
//! let error = anyhow::anyhow!("Unknown peer: phone");
//! eprintln!("{}", format_user_error(&error));
//! ```
//!
//! Error categories with context-aware help:
//! - Peer errors → Unknown or misconfigured peers
//! - Network errors → Port conflicts, invalid listen address
//! - Config errors → Syntax, duplicate peers, inconsistent limits
//! - Spool errors → Unwritable receive directory

pub mod errors;

pub use errors::format_user_error;
