use std::net::SocketAddr;

use core_lib::CoreError;
use core_lib::events::EXCHANGE;

/// Runtime configuration, read once from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub http_addr: SocketAddr,
    pub database_url: String,
    pub amqp_uri: String,
    pub exchange: String,
    pub jwt_secret: String,
    /// gRPC endpoint of the user service, e.g. `http://users:50052`.
    pub user_directory_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, CoreError> {
        Ok(Self {
            http_addr: parse_var("TASK_HTTP_ADDR", "0.0.0.0:8080")?,
            database_url: require_var("TASK_DB_URL")?,
            amqp_uri: require_var("RABBITMQ_URI")?,
            exchange: std::env::var("RABBITMQ_EXCHANGE").unwrap_or_else(|_| EXCHANGE.to_string()),
            jwt_secret: require_var("JWT_SECRET")?,
            user_directory_addr: require_var("USER_DIRECTORY_ADDR")?,
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
