pub mod client;
pub mod config;
pub mod qos;

pub use client::{BusClient, MessageHandler, MqttBusClient};
pub use config::MqttConfig;
pub use qos::Qos;
