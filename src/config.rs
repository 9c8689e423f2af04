use std::path::PathBuf;

/// Engine-wide configuration, the subset of the site config the engine
/// actually consults. Request handlers construct it once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Member id of the system administrator (`super` authority).
    pub admin_id: String,
    /// Where new-write notifications go. None disables them.
    pub admin_email: Option<String>,
    /// Master switch for the point ledger. When off, `grant` is a no-op.
    pub use_point: bool,
    /// Point lifetime in days. Zero or negative disables expiry entirely.
    pub point_term: i64,
    /// Append a provenance note to moved/copied post bodies.
    pub use_copy_log: bool,
    /// Directory holding rendered fragment cache files.
    pub cache_dir: PathBuf,
}

impl Config {
    /// Reads configuration from the environment, defaulting rather than
    /// panicking since the engine is a library.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self {
            admin_id: std::env::var("BBS_ADMIN_ID").unwrap_or_else(|_| "admin".to_owned()),
            admin_email: std::env::var("BBS_ADMIN_EMAIL")
                .ok()
                .filter(|v| !v.is_empty()),
            use_point: env_flag("BBS_USE_POINT", true),
            point_term: std::env::var("BBS_POINT_TERM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            use_copy_log: env_flag("BBS_USE_COPY_LOG", true),
            cache_dir: std::env::var("BBS_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/cache")),
        }
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => !matches!(v.as_str(), "0" | "false" | "no" | ""),
        Err(_) => default,
    }
}
