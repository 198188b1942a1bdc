pub mod auth_client;
pub mod interceptor;
pub mod metrics;
pub mod pending;
pub mod rule;
pub mod user_context;

pub use auth_client::{AuthorizationClient, BusAuthorizationClient, RBACValidationRequest, RBACValidationResponse};
pub use interceptor::{RbacInterceptor, RejectNotice, RejectReason};
pub use metrics::{RbacMetrics, RbacMetricsSnapshot};
pub use pending::{InsertOutcome, PendingTable, PendingValidation};
pub use rule::{load_enabled_rules, match_rule, ProtectionRule};
pub use user_context::UserContext;
