//! A fixed-width, open-addressing on-disk hash index.
//!
//! Maps opaque fixed-size binary keys (typically truncated
//! cryptographic chunk hashes) to fixed-size binary values (typically
//! reference counts plus size accounting), and persists the full
//! table verbatim as header + raw bucket blob.
//!
//! This crate is a single-threaded in-memory data structure; callers
//! are responsible for serializing concurrent access and for
//! crash-atomic file replacement (write-to-temp + rename).

mod config;
mod error;
mod layout;
mod persistence;
mod probe;
mod sizing;

mod index;

pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use index::{Index, Summary};
