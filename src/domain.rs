//! Registrable-domain resolution for certificate subjects
//!
//! A subject common name is parsed as the host of an `https://` URL, checked
//! label by label, then reduced to its registrable domain (one label under
//! the public suffix) using the public-suffix list.

use thiserror::Error;
use url::{Host, Url};

const MAX_LABEL_LEN: usize = 63;
const MAX_HOST_LEN: usize = 253;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainParseError {
    #[error("empty hostname")]
    Empty,

    #[error("invalid hostname {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("{0} is an IP address, not a domain")]
    IpAddress(String),

    #[error("invalid label {label:?} in {host:?}")]
    InvalidLabel { host: String, label: String },

    #[error("{0} has no registrable domain")]
    NoRegistrableDomain(String),
}

/// Resolve a hostname (usually a subject CN) to its registrable domain.
///
/// `www.example.com` and `example.com` both resolve to `example.com`;
/// `a.b.example.co.uk` resolves to `example.co.uk`.
pub fn resolve(name: &str) -> Result<String, DomainParseError> {
    let name = name.trim();
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        return Err(DomainParseError::Empty);
    }

    // The URL parser would strip a query, fragment or userinfo and decode
    // percent escapes, so only hostname characters may reach it. Non-ASCII
    // is left for IDNA to map.
    if let Some(c) = name
        .chars()
        .find(|c| c.is_ascii() && !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.'))
    {
        return Err(DomainParseError::InvalidHost {
            host: name.to_string(),
            reason: format!("unexpected character {:?}", c),
        });
    }

    let url = Url::parse(&format!("https://{}", name)).map_err(|e| {
        DomainParseError::InvalidHost {
            host: name.to_string(),
            reason: e.to_string(),
        }
    })?;

    let host = match url.host() {
        Some(Host::Domain(host)) => host.to_string(),
        Some(Host::Ipv4(ip)) => return Err(DomainParseError::IpAddress(ip.to_string())),
        Some(Host::Ipv6(ip)) => return Err(DomainParseError::IpAddress(ip.to_string())),
        None => return Err(DomainParseError::Empty),
    };

    check_labels(&host)?;

    psl::domain_str(&host)
        .map(str::to_string)
        .ok_or(DomainParseError::NoRegistrableDomain(host))
}

fn check_labels(host: &str) -> Result<(), DomainParseError> {
    if host.len() > MAX_HOST_LEN {
        return Err(DomainParseError::InvalidHost {
            host: host.to_string(),
            reason: format!("longer than {} characters", MAX_HOST_LEN),
        });
    }

    for label in host.split('.') {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');

        if !valid {
            return Err(DomainParseError::InvalidLabel {
                host: host.to_string(),
                label: label.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_subdomain() {
        assert_eq!(resolve("www.example.com").unwrap(), "example.com");
        assert_eq!(resolve("deep.sub.example.com").unwrap(), "example.com");
    }

    #[test]
    fn test_resolve_multi_label_suffix() {
        assert_eq!(resolve("shop.example.co.uk").unwrap(), "example.co.uk");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        for host in ["www.example.com", "api.test.org", "a.b.example.co.uk"] {
            let once = resolve(host).unwrap();
            let twice = resolve(&once).unwrap();
            assert_eq!(once, twice);
            assert_eq!(resolve(host).unwrap(), once);
        }
    }

    #[test]
    fn test_resolve_normalizes_case_and_trailing_dot() {
        assert_eq!(resolve("WWW.Example.COM.").unwrap(), "example.com");
        assert_eq!(resolve("  www.example.com ").unwrap(), "example.com");
    }

    #[test]
    fn test_resolve_empty() {
        assert_eq!(resolve(""), Err(DomainParseError::Empty));
        assert_eq!(resolve("   "), Err(DomainParseError::Empty));
    }

    #[test]
    fn test_resolve_wildcard_rejected() {
        assert!(resolve("*.example.com").is_err());
        assert!(resolve("*").is_err());
    }

    #[test]
    fn test_resolve_ip_rejected() {
        assert!(matches!(
            resolve("192.168.1.1"),
            Err(DomainParseError::IpAddress(_))
        ));
    }

    #[test]
    fn test_resolve_garbage_rejected() {
        assert!(resolve("exa mple.com").is_err());
        assert!(resolve("example.com/path").is_err());
        assert!(resolve("-bad.example.com").is_err());
        assert!(resolve("under_score.example.com").is_err());
    }

    #[test]
    fn test_resolve_bare_suffix() {
        assert!(matches!(
            resolve("com"),
            Err(DomainParseError::NoRegistrableDomain(_))
        ));
        assert!(resolve("co.uk").is_err());
    }

    #[test]
    fn test_resolve_rejects_url_parts() {
        for name in [
            "example.com?x=1",
            "example.com#frag",
            ":pw@example.com",
            "user@example.com",
            "example.com:443",
            "ex%61mple.com",
        ] {
            assert!(
                matches!(resolve(name), Err(DomainParseError::InvalidHost { .. })),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_resolve_malformed_punycode() {
        assert!(resolve("xn--a.example.com").is_err());
        assert!(resolve("www.xn--a.com").is_err());
    }

    #[test]
    fn test_resolve_idn() {
        assert_eq!(resolve("www.bücher.de").unwrap(), "xn--bcher-kva.de");
    }
}
