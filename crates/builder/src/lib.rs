//! Static page generation: database-backed renderer, filesystem page
//! store, and the deferred-build worker binary.

pub mod config;
pub mod pages;
pub mod render;
