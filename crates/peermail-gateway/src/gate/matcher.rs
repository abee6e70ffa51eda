//! Pattern helpers shared by the rule engine and the whitelist.

use std::sync::OnceLock;

use regex::Regex;

/// Domain part of an address: everything after the last `@`.
pub fn domain_of(address: &str) -> &str {
    address.rsplit('@').next().unwrap_or(address)
}

/// `*.example.com` matches `example.com` and any strict subdomain;
/// a plain pattern must be equal. Case-insensitive.
pub fn domain_matches(pattern: &str, domain: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let domain = domain.trim().to_ascii_lowercase();

    match pattern.strip_prefix("*.") {
        Some(base) => domain == base || domain.ends_with(&format!(".{base}")),
        None => domain == pattern,
    }
}

/// Case-insensitive substring test.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn multipart_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^content-type:[ \t]*multipart/").ok())
        .as_ref()
}

fn disposition_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^content-disposition:[ \t]*attachment").ok())
        .as_ref()
}

/// True iff the message looks like it carries an attachment.
pub fn has_attachment(content_type: Option<&str>, raw: &str) -> bool {
    let multipart_field = content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("multipart/"))
        .unwrap_or(false);

    multipart_field
        || multipart_re().is_some_and(|re| re.is_match(raw))
        || disposition_re().is_some_and(|re| re.is_match(raw))
}

/// Value of the first `^<name>:\s*(.*)$` line in `raw` (case-insensitive, multiline).
pub fn first_header_line(raw: &str, name: &str) -> Option<String> {
    let pattern = format!(r"(?im)^{}:\s*(.*)$", regex::escape(name));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(header = %name, error = %e, "header pattern failed to compile");
            return None;
        }
    };
    re.captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('\r').to_string())
}
