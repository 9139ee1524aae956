use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons a feed URL is refused at subscription time.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    /// Loopback, private or link-local target while local targets are not allowed.
    #[error("Local network address not allowed: {0} (use --allow-local to subscribe anyway)")]
    LocalTarget(String),
}

/// Checks that `url_str` is something the poller may fetch.
///
/// Only `http` and `https` are accepted. Unless `allow_local` is set, hosts
/// that resolve syntactically to loopback, private, link-local or unspecified
/// addresses (and the name `localhost`) are refused, so a subscription cannot
/// be used to reach the machine's own network.
///
/// # Examples
///
/// ```
/// use feedpoll::util::validate_url;
///
/// assert!(validate_url("https://example.com/feed.xml", false).is_ok());
/// assert!(validate_url("http://192.168.1.1/feed", false).is_err());
/// assert!(validate_url("http://192.168.1.1/feed", true).is_ok());
/// assert!(validate_url("file:///etc/passwd", true).is_err());
/// ```
pub fn validate_url(url_str: &str, allow_local: bool) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    if allow_local {
        return Ok(url);
    }

    if host.eq_ignore_ascii_case("localhost") {
        return Err(UrlValidationError::LocalTarget(host.to_owned()));
    }

    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if let Ok(ip) = bare.parse::<IpAddr>() {
        if is_local(&ip) {
            return Err(UrlValidationError::LocalTarget(ip.to_string()));
        }
    }

    Ok(url)
}

fn is_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link-local
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls_accepted() {
        assert!(validate_url("https://example.com/feed.xml", false).is_ok());
        assert!(validate_url("http://news.example.org/rss", false).is_ok());
        assert!(validate_url("https://example.com:8443/feed", false).is_ok());
    }

    #[test]
    fn test_non_http_schemes_rejected_even_when_local_allowed() {
        for url in ["file:///etc/passwd", "ftp://example.com/feed"] {
            let err = validate_url(url, true).unwrap_err();
            assert!(matches!(err, UrlValidationError::UnsupportedScheme(_)));
        }
    }

    #[test]
    fn test_local_targets_rejected_by_default() {
        for url in [
            "http://localhost/feed",
            "http://LOCALHOST:8080/feed",
            "http://127.0.0.1/feed",
            "http://10.0.0.1:3000/feed",
            "http://172.16.0.1/feed",
            "http://192.168.1.1/feed",
            "http://169.254.1.1/feed",
            "http://0.0.0.0/feed",
            "http://[::1]/feed",
            "http://[fe80::1]/feed",
            "http://[fd00::1]/feed",
        ] {
            let err = validate_url(url, false).unwrap_err();
            assert!(
                matches!(err, UrlValidationError::LocalTarget(_)),
                "{url} should be refused, got {err:?}"
            );
        }
    }

    #[test]
    fn test_local_targets_accepted_when_allowed() {
        assert!(validate_url("http://127.0.0.1:9000/feed", true).is_ok());
        assert!(validate_url("http://localhost/feed", true).is_ok());
    }

    #[test]
    fn test_unparseable_url() {
        let err = validate_url("not a url", false).unwrap_err();
        assert!(matches!(err, UrlValidationError::InvalidUrl(_)));
    }

    #[test]
    fn test_error_message_mentions_flag() {
        let err = validate_url("http://localhost/feed", false).unwrap_err();
        assert!(err.to_string().contains("--allow-local"));
    }
}
