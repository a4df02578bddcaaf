//! Submission orchestration and page build dispatch.
//!
//! [`submit::SubmissionPipeline`] drives a candidate post from intake to
//! durable commit through the `sumi_core::ports` traits; [`dispatch`] and
//! [`worker`] handle page regeneration; [`memory`] provides the
//! single-node in-memory store implementations.

pub mod config;
pub mod dispatch;
pub mod markup;
pub mod media;
pub mod memory;
pub mod remote;
pub mod storage;
pub mod submit;
pub mod worker;
