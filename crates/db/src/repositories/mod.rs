pub mod ban_repo;
pub mod build_task_repo;
pub mod fingerprint_repo;
pub mod flood_repo;
pub mod post_repo;

pub use ban_repo::BanRepo;
pub use build_task_repo::BuildTaskRepo;
pub use fingerprint_repo::FingerprintRepo;
pub use flood_repo::FloodRepo;
pub use post_repo::{PostInsert, PostRepo};
