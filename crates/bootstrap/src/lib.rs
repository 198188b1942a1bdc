pub mod credential_file;
pub mod migrations;
pub mod publisher;

pub use credential_file::load_local_credential;
pub use migrations::run_migrations;
pub use publisher::{publish_credential, spawn_periodic_resend, spawn_request_responder, DEFAULT_RESEND_INTERVAL};
