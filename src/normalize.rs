//! Domain normalization
//!
//! Turns a raw token from a hosts file, adblock-style domain list or the
//! canonical list itself into a lower-case hostname, or rejects it.
//! The function is total: every input yields `Some(domain)` or `None`.

use std::net::IpAddr;

/// Null-route addresses that hosts-format feeds put in front of the hostname.
/// Checked in order; `0.0.0.0example.com` (missing separator) is tolerated.
const NULL_ROUTE_PREFIXES: &[&str] = &["0.0.0.0", "127.0.0.1", "255.255.255.255", "::", "::1"];

/// Normalizes a raw token into a canonical domain.
///
/// Returns `None` for comments, empty tokens and bare IP literals.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let without_comment = raw.split('#').next().unwrap_or_default();
    let decoded = percent_decode(without_comment);
    let mut domain = decoded.trim();
    if domain.is_empty() || is_ip_literal(domain) {
        return None;
    }

    for prefix in NULL_ROUTE_PREFIXES {
        if let Some(rest) = domain.strip_prefix(prefix) {
            domain = rest.trim();
        }
    }

    let domain = domain.strip_prefix("*.").unwrap_or(domain);
    let domain = domain.trim_start_matches('.');
    let domain = domain.trim_end_matches('/');

    if domain.is_empty() || domain.starts_with('#') {
        return None;
    }

    if is_ip_literal(domain) {
        return None;
    }

    let cleaned = domain.to_lowercase();
    let cleaned = cleaned.trim_end_matches('.');
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn is_ip_literal(value: &str) -> bool {
    value.parse::<IpAddr>().is_ok()
}

fn percent_decode(value: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(value.as_bytes())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_domain_is_idempotent() {
        for domain in ["example.com", "ads.tracker.net", "xn--80ak6aa92e.com"] {
            assert_eq!(normalize_domain(domain).as_deref(), Some(domain));
            let once = normalize_domain(domain).unwrap();
            assert_eq!(normalize_domain(&once), Some(once.clone()));
        }
    }

    #[test]
    fn test_hosts_prefixes_are_stripped() {
        assert_eq!(normalize_domain("0.0.0.0 example.com").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain("127.0.0.1 example.com").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain("0.0.0.0example.com").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain(":: example.com").as_deref(), Some("example.com"));
        assert_eq!(
            normalize_domain("255.255.255.255 example.com").as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn test_wildcards_dots_and_slashes() {
        assert_eq!(normalize_domain("*.example.com").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain("..example.com").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain("example.com/").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain("example.com//").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain("Example.COM.").as_deref(), Some("example.com"));
    }

    #[test]
    fn test_comments_and_encoding() {
        assert_eq!(normalize_domain("example.com # tracker").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain("# just a comment"), None);
        assert_eq!(normalize_domain("   "), None);
        assert_eq!(normalize_domain("ads%2Eexample.com").as_deref(), Some("ads.example.com"));
        assert_eq!(normalize_domain("%20example.com%20").as_deref(), Some("example.com"));
    }

    #[test]
    fn test_ip_literals_are_rejected() {
        assert_eq!(normalize_domain("0.0.0.0"), None);
        assert_eq!(normalize_domain("192.168.1.1"), None);
        assert_eq!(normalize_domain("10.0.0.1"), None);
        assert_eq!(normalize_domain("2001:db8::1"), None);
        assert_eq!(normalize_domain("::1"), None);
    }

    #[test]
    fn test_only_prefix_left() {
        assert_eq!(normalize_domain("127.0.0.1"), None);
        assert_eq!(normalize_domain("*."), None);
        assert_eq!(normalize_domain("..."), None);
    }

    #[test]
    fn test_invalid_utf8_escape_does_not_panic() {
        assert!(normalize_domain("bad%FFdomain.com").is_some());
    }
}
