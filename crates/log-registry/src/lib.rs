//! Log source registry
//!
//! Holds the configured [`FileSpec`]s and turns them into a grouped
//! [`Listing`] of [`LogEntry`] values on demand.

#![warn(missing_docs)]

pub mod error;
pub mod filespec;
pub mod models;
pub mod registry;

pub use error::{Error, Result};
pub use filespec::FileSpec;
pub use models::{DEFAULT_GROUP, FileSpecKind, Listing, LogEntry};
pub use registry::Registry;
