pub mod client;
pub mod recaptcha;

pub use client::{classify_status, classify_transport, Deliverer, DeliveryOutcome, FailureKind, WebhookClient};
pub use recaptcha::RecaptchaVerifier;
