//! Line command tokenizer.
//!
//! A trimmed line is a command iff it starts with exactly four ASCII letters,
//! optionally followed by whitespace and an argument. Anything else is
//! "unrecognized" and the caller answers 500.

/// One tokenized command line. `verb` is uppercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub verb: String,
    pub arg: Option<&'a str>,
}

/// Tokenize a protocol line. Returns `None` for unrecognized shapes.
pub fn parse_command(line: &str) -> Option<CommandLine<'_>> {
    let line = line.trim();
    let verb = line.get(..4)?;
    if !verb.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }

    let rest = &line[4..];
    let arg = if rest.is_empty() {
        None
    } else {
        // the verb must be followed by whitespace, not more letters
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        Some(rest.trim_start())
    };

    Some(CommandLine {
        verb: verb.to_ascii_uppercase(),
        arg,
    })
}

/// Parse `KEYWORD:<path>` (case-insensitive keyword, optional space before `<`).
///
/// Returns the path between the angle brackets. ESMTP parameters after `>`
/// are tolerated and ignored.
pub fn parse_path_arg<'a>(arg: &'a str, keyword: &str) -> Option<&'a str> {
    let head = arg.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = arg[keyword.len()..].strip_prefix(':')?;
    let rest = rest.trim_start().strip_prefix('<')?;
    let end = rest.find('>')?;
    let path = &rest[..end];
    if path.is_empty() {
        return None;
    }
    Some(path)
}
