//! Raw message header helpers.
//!
//! Only the header block is looked at: lines up to the first empty line,
//! with folded continuation lines (leading space/tab) joined back onto the
//! header they belong to.

/// Parsed header fields in order of appearance. Names keep their original case.
pub fn headers(raw: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();

    for line in raw.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = out.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            out.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    out
}

/// First value of the named header (case-insensitive name).
pub fn header_value(raw: &str, name: &str) -> Option<String> {
    headers(raw)
        .into_iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// Bare address from a `From:` style value: `"Name" <a@b>` -> `a@b`.
pub fn bare_address(value: &str) -> &str {
    match (value.rfind('<'), value.rfind('>')) {
        (Some(start), Some(end)) if start < end => value[start + 1..end].trim(),
        _ => value.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "From: \"Alice\" <alice@example.com>\r\nSubject: hello\r\n  world\r\nContent-Type: text/plain\r\n\r\nSubject: not a header\r\n";

    #[test]
    fn reads_header_block_only() {
        let h = headers(RAW);
        assert_eq!(h.len(), 3);
        assert_eq!(header_value(RAW, "subject").as_deref(), Some("hello world"));
    }

    #[test]
    fn extracts_bare_address() {
        let from = header_value(RAW, "FROM").unwrap_or_default();
        assert_eq!(bare_address(&from), "alice@example.com");
        assert_eq!(bare_address(" bob@example.com "), "bob@example.com");
    }
}
