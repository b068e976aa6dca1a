//! # tabula-core
//!
//! Core types, traits, and abstractions for the tabula knowledge-base
//! backend.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other tabula crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;

/// Generate a new UUIDv7 (time-ordered).
///
/// All entity ids in tabula are v7 so primary key order follows insertion
/// order.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_is_version_7() {
        let id = new_v7();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_new_v7_is_time_ordered() {
        let a = new_v7();
        let b = new_v7();
        assert!(a <= b);
    }
}
