//! Line-level token helpers
//!
//! The assembly language is line-oriented; operands are split on
//! whitespace with quoted string literals kept intact. These helpers
//! mirror that model instead of a full token stream.

/// First whitespace-delimited token of a line
pub fn chunk(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// The line with its first token removed and remaining text stripped
pub fn after_chunk(line: &str) -> &str {
    let stripped = line.trim_start();
    match stripped.find(char::is_whitespace) {
        Some(position) => stripped[position..].trim_start(),
        None => "",
    }
}

/// Split operand text into up to two tokens; missing ones are empty
pub fn get2(operands: &str) -> (String, String) {
    let first = chunk(operands).to_string();
    let rest = after_chunk(operands);
    (first, chunk(rest).to_string())
}

/// Split operand text into up to three tokens; missing ones are empty
pub fn get3(operands: &str) -> (String, String, String) {
    let first = chunk(operands).to_string();
    let rest = after_chunk(operands);
    let second = chunk(rest).to_string();
    let third = chunk(after_chunk(rest)).to_string();
    (first, second, third)
}

/// Extract the leading token, treating a quoted string as one token
///
/// Returns the raw token including its quotes.
pub fn extract(text: &str) -> String {
    let text = text.trim_start();
    if !text.starts_with('"') {
        return chunk(text).to_string();
    }

    let mut token = String::from("\"");
    let mut escaped = false;
    for c in text.chars().skip(1) {
        token.push(c);
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            break;
        }
    }
    token
}

/// Whether a token is a plain decimal number (optionally negative)
pub fn is_num(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Decode a quoted string literal: strip quotes, process escapes
pub fn unquote(token: &str) -> String {
    let inner = token
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(token);

    let mut decoded = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            decoded.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => decoded.push('\n'),
            Some('t') => decoded.push('\t'),
            Some('r') => decoded.push('\r'),
            Some('0') => decoded.push('\0'),
            Some(other) => decoded.push(other),
            None => decoded.push('\\'),
        }
    }
    decoded
}

/// Quote a string for canonical assembly output
pub fn enquote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            '\0' => quoted.push_str("\\0"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk() {
        assert_eq!(chunk("iadd 1 2 3"), "iadd");
        assert_eq!(chunk("   istore 1 40"), "istore");
        assert_eq!(chunk(""), "");
    }

    #[test]
    fn test_get2_get3() {
        assert_eq!(get2("1 40"), ("1".to_string(), "40".to_string()));
        assert_eq!(get2("1"), ("1".to_string(), String::new()));
        assert_eq!(
            get3("1 2 3"),
            ("1".to_string(), "2".to_string(), "3".to_string())
        );
        assert_eq!(
            get3("1 2"),
            ("1".to_string(), "2".to_string(), String::new())
        );
    }

    #[test]
    fn test_extract_quoted() {
        assert_eq!(extract("\"boom\" handler"), "\"boom\"");
        assert_eq!(extract("\"with \\\" quote\" rest"), "\"with \\\" quote\"");
        assert_eq!(extract("plain rest"), "plain");
    }

    #[test]
    fn test_quote_roundtrip() {
        for text in ["boom", "with \"quotes\"", "line\nbreak", "back\\slash"] {
            assert_eq!(unquote(&enquote(text)), text);
        }
    }

    #[test]
    fn test_is_num() {
        assert!(is_num("42"));
        assert!(is_num("-7"));
        assert!(!is_num("+7"));
        assert!(!is_num("0x10"));
        assert!(!is_num("name"));
        assert!(!is_num(""));
    }
}
