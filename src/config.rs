//! Configuration module for HealthTrail.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Connection settings for the InfluxDB time-series store.
#[derive(Debug, Clone)]
pub struct TsdbConfig {
    /// Base URL of the InfluxDB server (default: "http://localhost:8086")
    pub url: String,
    /// API token, read from `TSDB_TOKEN`
    pub token: String,
    /// Organization owning the bucket (default: "healthtrail")
    pub org: String,
    /// Bucket samples are written to and queried from (default: "healthtrail")
    pub bucket: String,
    /// Deadline for a single write or query (default: 30s)
    pub timeout: Duration,
}

impl Default for TsdbConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            token: String::new(),
            org: "healthtrail".to_string(),
            bucket: "healthtrail".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8081)
    pub http_port: u16,
    /// Path to the SQLite target registry (default: "healthtrail.db")
    pub db_path: String,
    /// Directory served under `/static` (default: "static")
    pub static_dir: String,
    /// Status page served at `/` (default: "templates/index.html")
    pub index_path: String,
    /// Deadline for a single health probe (default: 10s)
    pub probe_timeout: Duration,
    pub tsdb: TsdbConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8081,
            db_path: "healthtrail.db".to_string(),
            static_dir: "static".to_string(),
            index_path: "templates/index.html".to_string(),
            probe_timeout: Duration::from_secs(10),
            tsdb: TsdbConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HEALTHTRAIL_HTTP_PORT`: HTTP port (default: 8081)
    /// - `HEALTHTRAIL_DB_PATH`: Registry database file (default: "healthtrail.db")
    /// - `HEALTHTRAIL_STATIC_DIR`: Static asset directory (default: "static")
    /// - `HEALTHTRAIL_INDEX_PATH`: Status page file (default: "templates/index.html")
    /// - `HEALTHTRAIL_PROBE_TIMEOUT_SECS`: Probe deadline in seconds (default: 10)
    /// - `TSDB_URL`, `TSDB_TOKEN`, `TSDB_ORG`, `TSDB_BUCKET`: InfluxDB settings
    /// - `TSDB_TIMEOUT_SECS`: InfluxDB request deadline in seconds (default: 30)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("HEALTHTRAIL_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(db_path) = env::var("HEALTHTRAIL_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(dir) = env::var("HEALTHTRAIL_STATIC_DIR") {
            cfg.static_dir = dir;
        }

        if let Ok(path) = env::var("HEALTHTRAIL_INDEX_PATH") {
            cfg.index_path = path;
        }

        if let Some(timeout) = env::var("HEALTHTRAIL_PROBE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| parse_secs(&s))
        {
            cfg.probe_timeout = timeout;
        }

        if let Ok(url) = env::var("TSDB_URL") {
            cfg.tsdb.url = url;
        }

        if let Ok(token) = env::var("TSDB_TOKEN") {
            cfg.tsdb.token = token;
        }

        if let Ok(org) = env::var("TSDB_ORG") {
            cfg.tsdb.org = org;
        }

        if let Ok(bucket) = env::var("TSDB_BUCKET") {
            cfg.tsdb.bucket = bucket;
        }

        if let Some(timeout) = env::var("TSDB_TIMEOUT_SECS")
            .ok()
            .and_then(|s| parse_secs(&s))
        {
            cfg.tsdb.timeout = timeout;
        }

        cfg
    }
}

/// Parse a positive whole number of seconds.
fn parse_secs(s: &str) -> Option<Duration> {
    match s.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(secs) => Some(Duration::from_secs(secs)),
    }
}
