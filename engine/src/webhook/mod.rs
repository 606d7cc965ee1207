pub mod canonical;
pub mod repository;
pub mod service;
pub mod validate;

pub use canonical::canonicalize_url;
pub use repository::SqlWebhookRepository;
pub use service::{RegistrationError, RegistrationService};
pub use validate::validate_webhook_url;
