//! # ResDB Testkit
//!
//! Test utilities for ResDB.
//!
//! This crate provides:
//! - Registered test schemas and database fixtures
//! - Property-based test generators using proptest
//! - Concurrency stress runners
//!
//! ## Usage
//!
//! ```rust
//! use resdb_testkit::prelude::*;
//! use resdb_core::FieldReader;
//!
//! with_temp_db(|db| {
//!     let rid = make_point(db, 1.0, 2.0);
//!     assert_eq!(db.read(rid).get_float(point::X), Some(1.0));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
