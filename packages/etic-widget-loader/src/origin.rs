//! Origin allow-list gate.
//!
//! The embedding page is untrusted: anybody can copy the snippet. This check
//! is what keeps the widget (and the metered chat backend behind it) off
//! domains the school has not listed.

/// Lowercase and drop one trailing slash.
fn normalize(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    match lower.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

/// Extract the host (without port) from a normalized origin.
/// `https://sub.example.com:8443` → `sub.example.com`.
fn origin_host(origin: &str) -> &str {
    let rest = match origin.find("://") {
        Some(i) => &origin[i + 3..],
        None => origin.trim_start_matches("//"),
    };
    let rest = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    // IPv6 literals keep their brackets and inner colons
    if rest.starts_with('[') {
        return match rest.find(']') {
            Some(end) => &rest[..=end],
            None => rest,
        };
    }
    match rest.rfind(':') {
        Some(i) => &rest[..i],
        None => rest,
    }
}

/// Strip a leading `http:` or `https:` so `https://a.com` becomes `//a.com`.
fn strip_http_scheme(origin: &str) -> &str {
    origin
        .strip_prefix("https:")
        .or_else(|| origin.strip_prefix("http:"))
        .unwrap_or(origin)
}

/// Check one allow-list entry against a normalized origin.
fn entry_matches(entry: &str, origin: &str) -> bool {
    let entry = normalize(entry);

    if entry == origin {
        return true;
    }

    if let Some(domain) = entry.strip_prefix("*.") {
        // "*.example.com" covers example.com itself and any subdomain,
        // never "notexample.com" or "example.com.evil.com"
        let host = origin_host(origin);
        return host == domain || host.ends_with(&format!(".{domain}"));
    }

    if entry.starts_with("//") {
        return strip_http_scheme(origin) == entry;
    }

    false
}

/// Decide whether the widget may run on `origin`.
///
/// Returns `true` if:
///   - no allow-list is configured, or it contains `"*"`
///   - any entry matches, testing per entry: exact origin, `*.domain`
///     wildcard, then protocol-agnostic `//host`
///
/// Matching is case-insensitive and ignores a trailing slash.
pub fn is_origin_allowed(allowed_origins: Option<&[String]>, origin: &str) -> bool {
    let Some(allowed) = allowed_origins else {
        return true;
    };
    if allowed.iter().any(|o| o == "*") {
        return true;
    }

    let origin = normalize(origin);
    allowed.iter().any(|entry| entry_matches(entry, &origin))
}
