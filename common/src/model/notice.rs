use serde::{Deserialize, Serialize};

/// One scraped legislative announcement. `num` is assigned monotonically
/// upstream (higher = newer) and is the sole identity used for diffing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub num: i64,
    pub subject: String,
    pub proposer_category: String,
    pub committee: String,
    pub link: String,
}

impl Notice {
    pub fn new(
        num: i64,
        subject: impl Into<String>,
        proposer_category: impl Into<String>,
        committee: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            num,
            subject: subject.into(),
            proposer_category: proposer_category.into(),
            committee: committee.into(),
            link: link.into(),
        }
    }
}
