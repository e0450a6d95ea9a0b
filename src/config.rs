//! Command-line and environment configuration.

use std::time::Duration;

use clap::Parser;

use crate::http::DEFAULT_HTTP_PORT;
use crate::signaling::DEFAULT_SIGNALING_PORT;
use crate::translation::{TranslationClient, TranslationError};

/// Peer-to-peer call signaling relay
#[derive(Parser, Debug, Clone)]
#[command(name = "tandem")]
#[command(about = "WebSocket signaling relay for peer-to-peer video calls", long_about = None)]
pub struct Config {
    /// Address to bind both listeners to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Signaling WebSocket port
    #[arg(long, env = "PORT", default_value_t = DEFAULT_SIGNALING_PORT)]
    pub port: u16,

    /// Diagnostics HTTP port (/health, /rooms)
    #[arg(long, env = "HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// Translation endpoint (LibreTranslate-compatible POST /translate)
    #[arg(
        long,
        env = "TRANSLATION_API_URL",
        default_value = "http://localhost:5000/translate"
    )]
    pub translation_url: String,

    #[arg(long, env = "TRANSLATION_TIMEOUT_SECS", default_value_t = 5)]
    pub translation_timeout_secs: u64,

    /// Keepalive ping interval; a missing pong drops the connection
    #[arg(long, env = "PING_INTERVAL_SECS", default_value_t = 30)]
    pub ping_interval_secs: u64,

    /// Don't call the translation service
    #[arg(long)]
    pub no_translation: bool,
}

impl Config {
    pub fn signaling_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn translation_client(&self) -> Result<TranslationClient, TranslationError> {
        if self.no_translation {
            return Ok(TranslationClient::disabled());
        }
        TranslationClient::new(
            self.translation_url.clone(),
            Duration::from_secs(self.translation_timeout_secs),
        )
    }
}
