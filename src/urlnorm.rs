//! Single source of truth for URL scheme/host canonicalization.
//!
//! Structure-extraction collectors validate link destinations and a
//! downstream fetcher later uses them; if the two sides normalized
//! differently, a crafted URL could pass the check and reach the fetcher
//! in another shape (a time-of-check/time-of-use bypass). Both sides must
//! call [`normalize_url`] and neither may reimplement any part of it.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Leading scheme per RFC 3986: one letter, then letters/digits/`+`/`-`/`.`,
/// then a colon.
static SCHEME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("scheme pattern")
});

/// The only schemes a normalized URL may carry.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Why a URL was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    /// Protocol-relative (`//host/...`) URLs inherit whatever scheme the
    /// embedding context uses and are rejected outright.
    ProtocolRelative,

    /// The URL carries a scheme outside the allow-list.
    DisallowedScheme(String),
}

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlError::ProtocolRelative => write!(f, "protocol-relative url"),
            UrlError::DisallowedScheme(scheme) => {
                write!(f, "scheme '{}' is not allowed", scheme)
            }
        }
    }
}

impl std::error::Error for UrlError {}

/// Returns the canonical form of a raw URL, or a typed rejection.
///
/// Whitespace is trimmed; the scheme is lowercased and checked against
/// {http, https, mailto, tel}; http(s) hosts are lowercased and
/// punycode-normalized (the original host is kept when normalization
/// fails); path, query, and fragment keep their case. Bare fragments and
/// relative paths pass through unchanged. The result is idempotent:
/// normalizing a normalized URL returns it as-is.
pub fn normalize_url(raw: &str) -> Result<String, UrlError> {
    let trimmed = raw.trim();

    if trimmed.starts_with("//") {
        return Err(UrlError::ProtocolRelative);
    }

    let Some(found) = SCHEME.find(trimmed) else {
        // No scheme: a bare fragment or relative path, passed through.
        return Ok(trimmed.to_string());
    };

    let scheme = trimmed[..found.end() - 1].to_ascii_lowercase();
    if !ALLOWED_SCHEMES.contains(&scheme.as_str()) {
        return Err(UrlError::DisallowedScheme(scheme));
    }

    if scheme == "http" || scheme == "https" {
        // The url crate lowercases scheme and host and applies IDNA
        // (punycode) to the host while leaving path/query/fragment alone.
        match Url::parse(trimmed) {
            Ok(parsed) => Ok(parsed.to_string()),
            // Host normalization failed: keep the original spelling past
            // the scheme rather than rejecting.
            Err(_) => Ok(format!("{}{}", scheme, &trimmed[found.end() - 1..])),
        }
    } else {
        // mailto/tel have no authority component; lowercase the scheme
        // and preserve the remainder byte for byte.
        Ok(format!("{}{}", scheme, &trimmed[found.end() - 1..]))
    }
}
