use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Read-only SQLite file produced by the ingest job.
    pub data_file: PathBuf,
    /// Upper bound for `limit` on root list queries.
    pub max_page_limit: u32,
    /// `limit` used when a root list query asks for 0 rows.
    pub default_page_limit: u32,
    pub sqlite_cache_kib: i64,
    pub sqlite_mmap_bytes: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("data/pipeline.sqlite"),
            max_page_limit: 100,
            default_page_limit: 25,
            sqlite_cache_kib: 16 * 1024,
            sqlite_mmap_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Defaults overridden by `PIPELINE_*` environment variables. Unparseable values keep the
    /// default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_page_limit = env_u32("PIPELINE_MAX_PAGE_LIMIT", defaults.max_page_limit).max(1);
        Self {
            data_file: env::var("PIPELINE_DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_file),
            max_page_limit,
            default_page_limit: env_u32("PIPELINE_DEFAULT_PAGE_LIMIT", defaults.default_page_limit)
                .clamp(1, max_page_limit),
            sqlite_cache_kib: env_i64("PIPELINE_SQLITE_CACHE_KIB", defaults.sqlite_cache_kib),
            sqlite_mmap_bytes: env_i64("PIPELINE_SQLITE_MMAP_BYTES", defaults.sqlite_mmap_bytes),
        }
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name).ok().and_then(|v| v.parse::<u32>().ok()).unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name).ok().and_then(|v| v.parse::<i64>().ok()).unwrap_or(default)
}
