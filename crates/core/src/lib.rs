//! Domain logic for the sumi imageboard submission core.
//!
//! Everything in this crate is storage-agnostic: the abuse-filter engine,
//! content fingerprinting, thread capacity rules, and the page build
//! strategy chain are pure logic plus a set of async ports that the `db`
//! and `pipeline` crates implement.

pub mod build;
pub mod capacity;
pub mod error;
pub mod filters;
pub mod fingerprint;
pub mod hashing;
pub mod models;
pub mod ports;
pub mod types;

pub use error::CoreError;
