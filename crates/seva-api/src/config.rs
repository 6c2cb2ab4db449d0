//! # Configuration
//!
//! Every setting comes from the environment (or the equivalent flag).
//! Absent `DATABASE_URL` means in-memory mode; absent `DOCUMENT_ROOT` means
//! document bytes are held in memory; absent `AUTH_TOKEN` disables auth.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application configuration.
///
/// Custom `Debug` redacts the auth token and database URL.
#[derive(Clone, Parser)]
#[command(name = "seva-api", about = "Seva portal API server")]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Shared bearer secret. Unset disables authentication.
    #[arg(long, env = "AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Postgres connection string. Unset runs in memory only.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Directory for document bytes. Unset keeps them in memory.
    #[arg(long, env = "DOCUMENT_ROOT")]
    pub document_root: Option<PathBuf>,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: u64,

    /// Requests per caller per minute.
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value_t = 1000)]
    pub rate_limit_per_minute: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("document_root", &self.document_root)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            document_root: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            rate_limit_per_minute: 1000,
            log_format: LogFormat::Pretty,
        }
    }
}
