pub use common::interface::{HumanVerifier, NoticeSource, WebhookStore};
pub use common::model::{Config, Notice, WebhookPayload, WebhookStats};
pub use common::State;
pub use delivery::{Deliverer, DeliveryOutcome, FailureKind, RecaptchaVerifier, WebhookClient};
pub use engine::{AssemblyNoticeSource, BatchExecutor, BatchOptions, Engine, NoticeCache};
pub use errors::{Error, ErrorKind, Result};
