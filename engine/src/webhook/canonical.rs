use url::Url;

/// Canonical form used for uniqueness: scheme + host (+ explicit port) +
/// path, with query and fragment dropped and a single trailing slash
/// stripped when the path is more than "/". Unparseable input is returned
/// unchanged; the repository still enforces uniqueness textually.
pub fn canonicalize_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return raw.to_string();
    };

    let scheme = url.scheme();
    let host = match url.host_str() {
        Some(host) => host,
        None => return raw.to_string(),
    };

    let mut path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }

    match url.port() {
        Some(port) => format!("{scheme}://{host}:{port}{path}"),
        None => format!("{scheme}://{host}{path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_query_and_fragment() {
        assert_eq!(
            canonicalize_url("https://discord.com/api/webhooks/1/t?wait=true#frag"),
            "https://discord.com/api/webhooks/1/t"
        );
    }

    #[test]
    fn strips_single_trailing_slash() {
        assert_eq!(
            canonicalize_url("https://discord.com/api/webhooks/1/t/"),
            "https://discord.com/api/webhooks/1/t"
        );
        // A bare root path stays "/".
        assert_eq!(canonicalize_url("https://discord.com/"), "https://discord.com/");
    }

    #[test]
    fn keeps_explicit_port() {
        assert_eq!(
            canonicalize_url("https://discord.com:8443/api/webhooks/1/t"),
            "https://discord.com:8443/api/webhooks/1/t"
        );
    }

    #[test]
    fn unparseable_input_is_returned_unchanged() {
        assert_eq!(canonicalize_url("not a url"), "not a url");
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let inputs = [
            "https://discord.com/api/webhooks/1/t?x=1",
            "https://discord.com/api/webhooks/1/t/",
            "not a url",
            "https://discord.com/",
        ];
        for input in inputs {
            let once = canonicalize_url(input);
            assert_eq!(canonicalize_url(&once), once, "not idempotent for {input}");
        }
    }
}
