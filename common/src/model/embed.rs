use super::notice::Notice;
use serde::{Deserialize, Serialize};

pub const SENDER_USERNAME: &str = "입법예고 알리미";
const EMBED_COLOR: u32 = 0x2f5fa8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordEmbed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

/// Body POSTed to a Discord-compatible webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub username: String,
    pub embeds: Vec<DiscordEmbed>,
}

impl WebhookPayload {
    pub fn for_notice(notice: &Notice) -> Self {
        let embed = DiscordEmbed {
            title: format!("새 입법예고: {}", notice.subject),
            url: Some(notice.link.clone()),
            color: EMBED_COLOR,
            fields: vec![
                EmbedField {
                    name: "제안구분".to_string(),
                    value: notice.proposer_category.clone(),
                    inline: true,
                },
                EmbedField {
                    name: "소관위원회".to_string(),
                    value: notice.committee.clone(),
                    inline: true,
                },
            ],
            footer: Some(EmbedFooter {
                text: format!("공고 번호 {}", notice.num),
            }),
        };

        Self {
            username: SENDER_USERNAME.to_string(),
            embeds: vec![embed],
        }
    }

    /// Fixed payload used for the live registration test.
    pub fn welcome() -> Self {
        let embed = DiscordEmbed {
            title: "등록이 완료되었습니다".to_string(),
            url: None,
            color: EMBED_COLOR,
            fields: vec![EmbedField {
                name: "안내".to_string(),
                value: "새 입법예고가 올라오면 이 채널로 알림을 보냅니다.".to_string(),
                inline: false,
            }],
            footer: None,
        };

        Self {
            username: SENDER_USERNAME.to_string(),
            embeds: vec![embed],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_payload_carries_link_and_num() {
        let notice = Notice::new(2210345, "개인정보 보호법 일부개정법률안", "정부", "정무위원회", "https://example.org/2210345");
        let payload = WebhookPayload::for_notice(&notice);

        assert_eq!(payload.username, SENDER_USERNAME);
        assert_eq!(payload.embeds.len(), 1);
        let embed = &payload.embeds[0];
        assert_eq!(embed.url.as_deref(), Some("https://example.org/2210345"));
        assert!(embed.footer.as_ref().unwrap().text.contains("2210345"));
    }

    #[test]
    fn welcome_payload_has_no_link() {
        let payload = WebhookPayload::welcome();
        assert!(payload.embeds[0].url.is_none());
    }
}
