pub mod ban;
pub mod build_task;
pub mod fingerprint;
pub mod flood;
pub mod post;
