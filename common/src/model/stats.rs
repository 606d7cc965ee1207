use serde::{Deserialize, Serialize};

/// Aggregate endpoint counts returned by one repository query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    /// Inactive and untouched for more than 30 days.
    pub old_inactive: u64,
    /// Inactive but touched within the last 7 days.
    pub recent_inactive: u64,
}

impl WebhookStats {
    /// Active ratio in percent; an empty table counts as fully efficient.
    pub fn efficiency(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.active as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub created: u64,
    pub reactivated: u64,
    pub duplicates: u64,
}
