pub mod mentions;
pub mod publisher;
pub mod recipients;
pub mod resolver;

pub use publisher::NotificationPublisher;
