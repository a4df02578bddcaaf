//! Worker configuration loaded from environment variables.

/// | Env Var              | Default                      |
/// |----------------------|------------------------------|
/// | `DATABASE_URL`       | (required)                   |
/// | `PAGE_ROOT`          | `./pages`                    |
/// | `POLL_INTERVAL_MS`   | `1000`                       |
/// | `RETRY_INTERVAL_SECS`| `60`                         |
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub database_url: String,
    /// Directory the page artifacts are written under.
    pub page_root: String,
    /// Queue polling interval.
    pub poll_interval_ms: u64,
    /// How often failed tasks are returned to the queue.
    pub retry_interval_secs: u64,
}

impl BuilderConfig {
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let page_root = std::env::var("PAGE_ROOT").unwrap_or_else(|_| "./pages".into());
        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("POLL_INTERVAL_MS must be a valid u64");
        let retry_interval_secs: u64 = std::env::var("RETRY_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("RETRY_INTERVAL_SECS must be a valid u64");

        Self { database_url, page_root, poll_interval_ms, retry_interval_secs }
    }
}
