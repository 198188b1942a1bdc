pub mod credential;
pub mod envelope;
pub mod error;
pub mod health;
pub mod topic;

pub use credential::CredentialRecord;
pub use envelope::{Envelope, MessageType};
pub use error::CoordinatorError;
pub use health::{HealthResult, HealthStatus};
pub use topic::ROOT;
