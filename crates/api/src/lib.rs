//! HTTP surface: multipart submission plus page reads.

pub mod boards;
pub mod config;
pub mod error;
pub mod router;
pub mod routes;
pub mod state;
