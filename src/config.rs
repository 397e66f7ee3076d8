//! Runtime configuration read from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: u16,
    /// Where finished downloads are written and served from
    pub download_dir: PathBuf,
    pub ytdlp_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    /// Accepted hosts. Empty means the built-in platform list.
    pub allowed_domains: Vec<String>,
    /// Jobs allowed to fetch or convert at the same time
    pub max_concurrent_jobs: usize,
    /// Upper bound for a metadata lookup
    pub info_timeout: Duration,
    /// How long finished jobs stay pollable. `None` keeps them forever.
    pub job_retention: Option<Duration>,
    pub prune_interval: Duration,
    pub user_agent: String,
}

impl AppConfig {
    /// Load configuration from `.env` and environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unparseable numbers fall
    /// back to their defaults.
    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            addr: string("ADDR", "127.0.0.1"),
            port: lookup("PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(8000),
            download_dir: PathBuf::from(string("DOWNLOAD_DIR", "./downloads")),
            ytdlp_bin: PathBuf::from(string("YTDLP_BIN", "yt-dlp")),
            ffmpeg_bin: PathBuf::from(string("FFMPEG_BIN", "ffmpeg")),
            ffprobe_bin: PathBuf::from(string("FFPROBE_BIN", "ffprobe")),
            allowed_domains: lookup("ALLOWED_DOMAINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            max_concurrent_jobs: number("MAX_CONCURRENT_JOBS")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(4),
            info_timeout: Duration::from_secs(
                number("INFO_TIMEOUT_SECS")
                    .filter(|n| *n > 0)
                    .unwrap_or(60),
            ),
            job_retention: number("JOB_RETENTION_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs),
            prune_interval: Duration::from_secs(
                number("PRUNE_INTERVAL_SECS")
                    .filter(|n| *n > 0)
                    .unwrap_or(300),
            ),
            user_agent: string("USER_AGENT", DEFAULT_USER_AGENT),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
        assert_eq!(config.download_dir, PathBuf::from("./downloads"));
        assert_eq!(config.ytdlp_bin, PathBuf::from("yt-dlp"));
        assert!(config.allowed_domains.is_empty());
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.info_timeout, Duration::from_secs(60));
        assert_eq!(config.job_retention, None);
        assert_eq!(config.prune_interval, Duration::from_secs(300));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("ADDR", "0.0.0.0"),
            ("PORT", "9000"),
            ("DOWNLOAD_DIR", "/srv/media"),
            ("ALLOWED_DOMAINS", "example.com, , videos.example.org"),
            ("MAX_CONCURRENT_JOBS", "2"),
            ("JOB_RETENTION_SECS", "3600"),
        ]);
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
        assert_eq!(config.download_dir, PathBuf::from("/srv/media"));
        assert_eq!(config.allowed_domains, ["example.com", "videos.example.org"]);
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.job_retention, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config(&[
            ("PORT", "http"),
            ("MAX_CONCURRENT_JOBS", "0"),
            ("JOB_RETENTION_SECS", "0"),
            ("PRUNE_INTERVAL_SECS", "-5"),
        ]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.job_retention, None);
        assert_eq!(config.prune_interval, Duration::from_secs(300));
    }
}
