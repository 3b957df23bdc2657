//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Deployment environment the server runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    pub environment: Environment,
    /// Include diagnostic detail in error responses (ignored in production)
    pub show_stack_trace: bool,
    /// Default TTL in seconds for entries without explicit TTL, 0 = never expire
    pub default_ttl: u64,
    /// Location of the cache snapshot file
    pub snapshot_path: PathBuf,
    /// Snapshot flush interval in seconds
    pub flush_interval: u64,
    /// Expired-entry sweep interval in seconds
    pub cleanup_interval: u64,
    /// TTL in seconds for cached resource reads
    pub resource_cache_ttl: u64,
    /// Upper bound in seconds on the final flush at shutdown
    pub shutdown_flush_timeout: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `PORT` - HTTP server port (default: 4000)
    /// - `APP_ENV` - development, production or test (default: development)
    /// - `SHOW_STACK_TRACE` - true to expose error diagnostics (default: false)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CACHE_SNAPSHOT_PATH` - Snapshot file (default: .cache/cache.json)
    /// - `CACHE_FLUSH_INTERVAL` - Flush frequency in seconds (default: 30)
    /// - `CACHE_CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `RESOURCE_CACHE_TTL` - TTL of cached reads in seconds (default: 300)
    /// - `SHUTDOWN_FLUSH_TIMEOUT` - Final flush timeout in seconds (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_port: parse_var("PORT").unwrap_or(defaults.server_port),
            environment: env::var("APP_ENV")
                .map(|v| Environment::parse(&v))
                .unwrap_or(defaults.environment),
            show_stack_trace: env::var("SHOW_STACK_TRACE")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(defaults.show_stack_trace),
            default_ttl: parse_var("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            snapshot_path: env::var("CACHE_SNAPSHOT_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            flush_interval: parse_var::<u64>("CACHE_FLUSH_INTERVAL")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.flush_interval),
            cleanup_interval: parse_var::<u64>("CACHE_CLEANUP_INTERVAL")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.cleanup_interval),
            resource_cache_ttl: parse_var("RESOURCE_CACHE_TTL")
                .unwrap_or(defaults.resource_cache_ttl),
            shutdown_flush_timeout: parse_var("SHUTDOWN_FLUSH_TIMEOUT")
                .unwrap_or(defaults.shutdown_flush_timeout),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Whether error responses carry diagnostic detail.
    pub fn show_stack(&self) -> bool {
        !self.is_production() && self.show_stack_trace
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 4000,
            environment: Environment::Development,
            show_stack_trace: false,
            default_ttl: 300,
            snapshot_path: PathBuf::from(".cache/cache.json"),
            flush_interval: 30,
            cleanup_interval: 60,
            resource_cache_ttl: 300,
            shutdown_flush_timeout: 5,
        }
    }
}
