#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Backup engine: generations, incrementals, index, chain restore
pub mod backup;

/// Content checksums
pub mod checksum;

/// Injected clock port
pub mod clock;

/// Structural diffs between post collections
pub mod diff;

/// Error (common error types)
pub mod error;

/// Commit chain (git-like linked history)
pub mod history;

/// Post and archive data model
pub mod post;

/// Storage port and adapters
pub mod store;
