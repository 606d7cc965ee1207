use errors::ValidationError;
use url::Url;

pub const MAX_URL_LENGTH: usize = 500;

const SNOWFLAKE_MIN_LEN: usize = 17;
const SNOWFLAKE_MAX_LEN: usize = 20;
const TOKEN_MIN_LEN: usize = 64;
const TOKEN_MAX_LEN: usize = 68;

fn is_allowed_host(host: &str) -> bool {
    host == "discord.com"
        || host == "discordapp.com"
        || host.ends_with(".discord.com")
        || host.ends_with(".discordapp.com")
}

/// Structural validation of a submitted webhook URL, applied before any
/// network traffic: https, a Discord-compatible host, bounded length, and
/// an `/api/webhooks/<snowflake>/<token>` path with plausible id/token
/// shapes.
pub fn validate_webhook_url(raw: &str) -> Result<(), ValidationError> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(ValidationError::TooLong(MAX_URL_LENGTH));
    }

    let url = Url::parse(raw).map_err(|_| ValidationError::Unparseable)?;

    if url.scheme() != "https" {
        return Err(ValidationError::SchemeNotHttps);
    }

    let host = url.host_str().ok_or(ValidationError::Unparseable)?;
    if !is_allowed_host(host) {
        return Err(ValidationError::HostNotAllowed);
    }

    let segments: Vec<&str> = url
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.len() < 4 || segments[0] != "api" || segments[1] != "webhooks" {
        return Err(ValidationError::MalformedPath);
    }

    let id = segments[2];
    if id.len() < SNOWFLAKE_MIN_LEN
        || id.len() > SNOWFLAKE_MAX_LEN
        || !id.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(ValidationError::MalformedId);
    }

    let token = segments[3];
    if token.len() < TOKEN_MIN_LEN
        || token.len() > TOKEN_MAX_LEN
        || !token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ValidationError::MalformedToken);
    }

    Ok(())
}
