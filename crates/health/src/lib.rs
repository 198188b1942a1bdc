pub mod engine;
pub mod reporter;

pub use engine::{HealthChecker, HealthEngine};
pub use reporter::spawn_reporter;
