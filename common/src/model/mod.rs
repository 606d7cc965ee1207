pub mod config;
pub mod embed;
pub mod entity;
pub mod notice;
pub mod stats;

pub use config::Config;
pub use embed::{DiscordEmbed, EmbedField, EmbedFooter, WebhookPayload};
pub use notice::Notice;
pub use stats::{BulkOutcome, WebhookStats};
