//! Configuration management for Prashna
//!
//! All configurable parameters in one place with environment variable
//! overrides. Sensible defaults out of the box, everything operational
//! tunable in production via `PRASHNA_*`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::constants;
use crate::engine::health::BreakerConfig;

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins (empty = allow all)
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache (seconds)
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "X-API-Key".to_string(),
            ],
            max_age_seconds: 86400,
        }
    }
}

impl CorsConfig {
    pub fn from_env(is_production: bool) -> Self {
        let mut config = Self::default();

        if let Ok(origins) = env::var("PRASHNA_CORS_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if is_production && config.allowed_origins.is_empty() {
            tracing::warn!(
                "PRODUCTION WARNING: CORS allows all origins. Set PRASHNA_CORS_ORIGINS."
            );
        }

        config
    }

    /// Convert to a tower-http CorsLayer
    pub fn to_layer(&self) -> tower_http::cors::CorsLayer {
        use tower_http::cors::{AllowOrigin, Any, CorsLayer};

        let mut layer = CorsLayer::new();

        if self.allowed_origins.is_empty() {
            layer = layer.allow_origin(Any);
        } else {
            let valid: Vec<axum::http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            if valid.is_empty() {
                tracing::error!(
                    "CORS: all configured origins failed to parse, rejecting cross-origin requests"
                );
            }
            layer = layer.allow_origin(AllowOrigin::list(valid));
        }

        let methods: Vec<axum::http::Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        layer = if methods.is_empty() {
            layer.allow_methods(Any)
        } else {
            layer.allow_methods(methods)
        };

        let headers: Vec<axum::http::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        layer = if headers.is_empty() {
            layer.allow_headers(Any)
        } else {
            layer.allow_headers(headers)
        };

        layer.max_age(Duration::from_secs(self.max_age_seconds))
    }
}

/// Which backend serves the read-through cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// External cache service over HTTP (`PRASHNA_CACHE_URL`).
    Remote,
    /// In-process map with TTL. Default for single-node and offline deploys.
    Memory,
    /// No cache tier at all.
    Off,
}

/// Cache tier configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub mode: CacheMode,
    pub base_url: Option<String>,
    pub ttl: Duration,
    pub timeout: Duration,
}

/// Object-storage cold fallback configuration
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub bucket: String,
    pub timeout: Duration,
}

/// Local-file cold fallback configuration
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

/// Server configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1). 0.0.0.0 for containers.
    pub host: String,

    /// Server port (default: 3050)
    pub port: u16,

    /// Root data directory (default: ./prashna_data)
    pub data_dir: PathBuf,

    /// Per-call primary store timeout
    pub primary_timeout: Duration,

    /// Circuit breaker tuning
    pub breaker: BreakerConfig,

    /// Cache tier
    pub cache: CacheConfig,

    /// Dataset snapshot rebuild interval
    pub snapshot_interval: Duration,

    /// Cold fallback: object storage
    pub object_store: ObjectStoreConfig,

    /// Cold fallback: local files
    pub file_store: FileStoreConfig,

    /// Rate limit: requests per second
    pub rate_limit_per_second: u64,

    /// Rate limit: burst size
    pub rate_limit_burst: u32,

    /// Maximum concurrent requests
    pub max_concurrent_requests: usize,

    /// Whether running in production mode (PRASHNA_ENV=production)
    pub is_production: bool,

    /// CORS configuration
    pub cors: CorsConfig,
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| {
            let v = v.to_lowercase();
            v == "true" || v == "1" || v == "yes"
        })
        .unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let is_production = env::var("PRASHNA_ENV")
            .map(|v| {
                let v = v.to_lowercase();
                v == "production" || v == "prod"
            })
            .unwrap_or(false);

        let data_dir = env::var("PRASHNA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prashna_data"));

        let cache_mode = match env::var("PRASHNA_CACHE_MODE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "remote" => CacheMode::Remote,
            "off" | "none" => CacheMode::Off,
            _ => CacheMode::Memory,
        };
        let cache_url = env::var("PRASHNA_CACHE_URL").ok();
        if cache_mode == CacheMode::Remote && cache_url.is_none() {
            tracing::warn!(
                "PRASHNA_CACHE_MODE=remote but PRASHNA_CACHE_URL is unset, cache tier disabled"
            );
        }

        let breaker = BreakerConfig {
            window: Duration::from_secs(env_u64(
                "PRASHNA_BREAKER_WINDOW_SECS",
                constants::DEFAULT_BREAKER_WINDOW_SECS,
            )),
            failure_rate_threshold: env::var("PRASHNA_BREAKER_FAILURE_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(constants::DEFAULT_BREAKER_FAILURE_RATE),
            min_samples: env_u64(
                "PRASHNA_BREAKER_MIN_SAMPLES",
                constants::DEFAULT_BREAKER_MIN_SAMPLES as u64,
            ) as usize,
            cooldown: Duration::from_secs(env_u64(
                "PRASHNA_BREAKER_COOLDOWN_SECS",
                constants::DEFAULT_BREAKER_COOLDOWN_SECS,
            )),
        };

        let file_dir = env::var("PRASHNA_FILE_FALLBACK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("fallback"));

        Self {
            host: env::var("PRASHNA_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_u64("PRASHNA_PORT", 3050) as u16,
            data_dir: data_dir.clone(),
            primary_timeout: Duration::from_millis(env_u64(
                "PRASHNA_PRIMARY_TIMEOUT_MS",
                constants::DEFAULT_PRIMARY_TIMEOUT_MS,
            )),
            breaker,
            cache: CacheConfig {
                mode: cache_mode,
                base_url: cache_url,
                ttl: Duration::from_secs(env_u64(
                    "PRASHNA_CACHE_TTL_SECS",
                    constants::DEFAULT_CACHE_TTL_SECS,
                )),
                timeout: Duration::from_millis(env_u64(
                    "PRASHNA_CACHE_TIMEOUT_MS",
                    constants::DEFAULT_CACHE_TIMEOUT_MS,
                )),
            },
            snapshot_interval: Duration::from_secs(env_u64(
                "PRASHNA_SNAPSHOT_INTERVAL_SECS",
                constants::DEFAULT_SNAPSHOT_INTERVAL_SECS,
            )),
            object_store: ObjectStoreConfig {
                enabled: env_bool("PRASHNA_BLOB_ENABLED", false),
                endpoint: env::var("PRASHNA_BLOB_ENDPOINT").unwrap_or_default(),
                bucket: env::var("PRASHNA_BLOB_BUCKET")
                    .unwrap_or_else(|_| "questionnaires".to_string()),
                timeout: Duration::from_millis(env_u64(
                    "PRASHNA_BLOB_TIMEOUT_MS",
                    constants::DEFAULT_BLOB_TIMEOUT_MS,
                )),
            },
            file_store: FileStoreConfig {
                enabled: env_bool("PRASHNA_FILE_FALLBACK_ENABLED", true),
                dir: file_dir,
            },
            rate_limit_per_second: env_u64(
                "PRASHNA_RATE_LIMIT_PER_SECOND",
                constants::DEFAULT_RATE_LIMIT_PER_SECOND,
            ),
            rate_limit_burst: env_u64(
                "PRASHNA_RATE_LIMIT_BURST",
                constants::DEFAULT_RATE_LIMIT_BURST as u64,
            ) as u32,
            max_concurrent_requests: env_u64(
                "PRASHNA_MAX_CONCURRENT",
                constants::DEFAULT_MAX_CONCURRENT_REQUESTS as u64,
            ) as usize,
            is_production,
            cors: CorsConfig::from_env(is_production),
        }
    }

    /// Log the effective configuration at startup.
    pub fn log(&self) {
        info!("Configuration:");
        info!("  bind: {}:{}", self.host, self.port);
        info!("  data dir: {:?}", self.data_dir);
        info!("  primary timeout: {:?}", self.primary_timeout);
        info!(
            "  breaker: window={:?} rate={} min_samples={} cooldown={:?}",
            self.breaker.window,
            self.breaker.failure_rate_threshold,
            self.breaker.min_samples,
            self.breaker.cooldown
        );
        info!(
            "  cache: {:?} (ttl={:?})",
            self.cache.mode, self.cache.ttl
        );
        info!("  snapshot interval: {:?}", self.snapshot_interval);
        info!(
            "  cold fallbacks: object_storage={} local_file={} ({:?})",
            self.object_store.enabled, self.file_store.enabled, self.file_store.dir
        );
        info!(
            "  rate limit: {}/s burst {}",
            self.rate_limit_per_second, self.rate_limit_burst
        );
        if self.is_production {
            info!("  mode: PRODUCTION");
        }
    }
}
