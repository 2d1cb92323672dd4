//! Stdio MCP filesystem server whose every operation is confined to a fixed
//! set of allowed root directories.
//!
//! [`sandbox`] is the single choke point for path checks, [`edit`] holds the
//! search/replace engine, [`walk`] the recursive traversals, and [`fs`] the
//! operations built on top of them.

pub mod edit;
pub mod error;
pub mod fs;
pub mod protocol;
pub mod sandbox;
pub mod server;
pub mod tools;
pub mod walk;

pub use error::{FsError, Result};
pub use sandbox::AllowedRoots;
