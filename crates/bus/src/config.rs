use std::time::Duration;

/// Connection parameters for [`crate::MqttBusClient::connect`].
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub credentials: Option<(String, String)>,
    pub connect_timeout: Duration,
    pub max_reconnect_interval: Duration,
    pub event_channel_capacity: usize,
}

impl MqttConfig {
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            client_id: client_id.into(),
            host: host.into(),
            port,
            keep_alive: Duration::from_secs(30),
            credentials: None,
            connect_timeout: Duration::from_secs(10),
            max_reconnect_interval: Duration::from_secs(30),
            event_channel_capacity: 256,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_reconnect_interval(mut self, interval: Duration) -> Self {
        self.max_reconnect_interval = interval;
        self
    }
}
