//! ASCOM bridge: translates ASCOM Alpaca-style HTTP calls into bus requests
//! and back, correlating each round-trip by `request_id`.

mod awaiter;
mod bridge;
mod device_backend;
mod http;
mod protocol;
mod routing;

pub use awaiter::AwaiterRegistry;
pub use bridge::{AscomBridge, ExecuteRequest};
pub use device_backend::DeviceBackend;
pub use http::{router, BridgeErrorResponse};
pub use protocol::{BridgeRequest, BridgeResponse};
pub use routing::{resolve_topic, response_topic};
