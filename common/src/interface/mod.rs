pub mod notice_source;
pub mod verifier;
pub mod webhook_store;

pub use notice_source::NoticeSource;
pub use verifier::HumanVerifier;
pub use webhook_store::WebhookStore;
