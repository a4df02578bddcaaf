use sumi_core::fingerprint::DedupScope;

/// Server configuration loaded from environment variables.
///
/// All fields have development-friendly defaults; production overrides
/// them via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Boards served by this instance.
    pub boards: Vec<String>,
    /// Minimum seconds between posts from one IP.
    pub flood_time_secs: i64,
    /// Window for an identical post repeated from the same IP.
    pub flood_time_ip_secs: i64,
    /// Board-wide window for an identical post from anyone.
    pub flood_time_same_secs: i64,
    /// Duplicate-upload detection scope, `None` to disable.
    pub dedup: Option<DedupScope>,
    /// Ordered build strategy names, e.g. `sane,defer`.
    pub build_strategies: Vec<String>,
    /// Directory rendered page artifacts live under.
    pub page_root: String,
    /// Directory uploaded media lives under.
    pub media_root: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `3000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `BOARDS`                | `b`                     |
    /// | `FLOOD_TIME_SECS`       | `10`                    |
    /// | `FLOOD_TIME_IP_SECS`    | `120`                   |
    /// | `FLOOD_TIME_SAME_SECS`  | `30`                    |
    /// | `DEDUP`                 | `off` (`global`/`thread`) |
    /// | `BUILD_STRATEGIES`      | `sane,defer`            |
    /// | `PAGE_ROOT`             | `./pages`               |
    /// | `MEDIA_ROOT`            | `./media`               |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let boards: Vec<String> = std::env::var("BOARDS")
            .unwrap_or_else(|_| "b".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let flood_time_secs = env_i64("FLOOD_TIME_SECS", 10);
        let flood_time_ip_secs = env_i64("FLOOD_TIME_IP_SECS", 120);
        let flood_time_same_secs = env_i64("FLOOD_TIME_SAME_SECS", 30);

        let dedup = match std::env::var("DEDUP").as_deref() {
            Ok("global") => Some(DedupScope::Global),
            Ok("thread") => Some(DedupScope::Thread),
            Ok("off") | Err(_) => None,
            Ok(other) => panic!("DEDUP must be off, global, or thread (got {other:?})"),
        };

        let build_strategies: Vec<String> = std::env::var("BUILD_STRATEGIES")
            .unwrap_or_else(|_| "sane,defer".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let page_root = std::env::var("PAGE_ROOT").unwrap_or_else(|_| "./pages".into());
        let media_root = std::env::var("MEDIA_ROOT").unwrap_or_else(|_| "./media".into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            boards,
            flood_time_secs,
            flood_time_ip_secs,
            flood_time_same_secs,
            dedup,
            build_strategies,
            page_root,
            media_root,
        }
    }
}

fn env_i64(var: &str, default: i64) -> i64 {
    std::env::var(var)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{var} must be a valid i64"))
}
