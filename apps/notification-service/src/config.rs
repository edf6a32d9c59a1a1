use std::net::SocketAddr;
use std::time::Duration;

use core_lib::CoreError;
use core_lib::events::EXCHANGE;

use crate::ws::hub::DEFAULT_SEND_BUFFER;

pub const DEFAULT_PREFETCH: u16 = 32;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_PONG_TIMEOUT_SECS: u64 = 60;

/// Runtime configuration, read once from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub http_addr: SocketAddr,
    pub grpc_addr: SocketAddr,
    pub database_url: String,
    pub amqp_uri: String,
    pub exchange: String,
    pub jwt_secret: String,
    pub ws_ping_interval: Duration,
    pub ws_pong_timeout: Duration,
    pub ws_send_buffer: usize,
    pub consumer_prefetch: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, CoreError> {
        Ok(Self {
            http_addr: parse_var("NOTIFICATION_HTTP_ADDR", "0.0.0.0:8081")?,
            grpc_addr: parse_var("NOTIFICATION_GRPC_ADDR", "0.0.0.0:50051")?,
            database_url: require_var("NOTIFICATION_DB_URL")?,
            amqp_uri: require_var("RABBITMQ_URI")?,
            exchange: std::env::var("RABBITMQ_EXCHANGE").unwrap_or_else(|_| EXCHANGE.to_string()),
            jwt_secret: require_var("JWT_SECRET")?,
            ws_ping_interval: Duration::from_secs(parse_var(
                "WS_PING_INTERVAL",
                &DEFAULT_PING_INTERVAL_SECS.to_string(),
            )?),
            ws_pong_timeout: Duration::from_secs(parse_var(
                "WS_PONG_TIMEOUT",
                &DEFAULT_PONG_TIMEOUT_SECS.to_string(),
            )?),
            ws_send_buffer: parse_var("WS_SEND_BUFFER", &DEFAULT_SEND_BUFFER.to_string())?,
            consumer_prefetch: parse_var("CONSUMER_PREFETCH", &DEFAULT_PREFETCH.to_string())?,
        })
    }
}

fn require_var(name: &str) -> Result<String, CoreError> {
    std::env::var(name).map_err(|_| CoreError::Configuration(format!("{} must be set", name)))
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, CoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| CoreError::Configuration(format!("Invalid {}={}: {}", name, raw, e)))
}
