//! # hostnet-common
//!
//! Shared utilities and types for the hostnet crates.
//!
//! This crate provides:
//! - The common error type
//! - System paths of the tools and files hostnet reads and edits

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{HostnetError, HostnetResult};
pub use paths::SystemPaths;
