//! Decoding and re-encoding of JavaScript string literals.

/// True when the literal body uses a numeric escape (`\x`, `\u`, or legacy octal).
pub fn has_numeric_escape(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            match bytes.get(i + 1) {
                Some(b'x') | Some(b'u') | Some(b'0'..=b'7') => return true,
                _ => i += 2,
            }
        } else {
            i += 1;
        }
    }
    false
}

/// Decodes a complete literal (quotes included). Returns `None` for malformed escapes.
pub fn decode(raw: &str) -> Option<String> {
    let mut chars = raw.chars();
    let quote = chars.next()?;
    if !matches!(quote, '"' | '\'' | '`') || raw.len() < 2 || !raw.ends_with(quote) {
        return None;
    }
    let body = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut iter = body.chars().peekable();

    while let Some(c) = iter.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let esc = iter.next()?;
        match esc {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '\r' => {
                if iter.peek() == Some(&'\n') {
                    iter.next();
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            'x' => {
                let hi = iter.next()?.to_digit(16)?;
                let lo = iter.next()?.to_digit(16)?;
                out.push(char::from_u32(hi * 16 + lo)?);
            }
            'u' => {
                let code = if iter.peek() == Some(&'{') {
                    iter.next();
                    let mut code = 0u32;
                    let mut digits = 0;
                    loop {
                        let d = iter.next()?;
                        if d == '}' {
                            break;
                        }
                        code = code.checked_mul(16)?.checked_add(d.to_digit(16)?)?;
                        digits += 1;
                    }
                    if digits == 0 {
                        return None;
                    }
                    code
                } else {
                    let mut code = 0u32;
                    for _ in 0..4 {
                        code = code * 16 + iter.next()?.to_digit(16)?;
                    }
                    code
                };
                out.push(decode_code_unit(code, &mut iter)?);
            }
            '0'..='7' => {
                let mut value = esc.to_digit(8)?;
                let max_digits = if value <= 3 { 3 } else { 2 };
                for _ in 1..max_digits {
                    match iter.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            iter.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value)?);
            }
            other => out.push(other),
        }
    }
    Some(out)
}

/// Joins a UTF-16 surrogate pair written as two `\uXXXX` escapes.
fn decode_code_unit(
    code: u32,
    iter: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Option<char> {
    if !(0xD800..0xDC00).contains(&code) {
        return char::from_u32(code);
    }
    let mut lookahead = iter.clone();
    if lookahead.next() != Some('\\') || lookahead.next() != Some('u') {
        return None;
    }
    let mut low = 0u32;
    for _ in 0..4 {
        low = low * 16 + lookahead.next()?.to_digit(16)?;
    }
    if !(0xDC00..0xE000).contains(&low) {
        return None;
    }
    *iter = lookahead;
    char::from_u32(0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00))
}

/// Emits `content` as a literal delimited by `quote`.
pub fn encode(content: &str, quote: char) -> String {
    let mut out = String::with_capacity(content.len() + 2);
    out.push(quote);
    for c in content.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            '$' if quote == '`' => out.push_str("\\$"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_numeric_escapes() {
        assert_eq!(
            decode(r#""\x64e\u{62}ug\147\x67er""#).as_deref(),
            Some("debugger")
        );
        assert_eq!(decode(r"'\uD83D\uDE00'").as_deref(), Some("\u{1F600}"));
    }

    #[test]
    fn rejects_malformed_escapes() {
        assert_eq!(decode(r#""\x6""#), None);
        assert_eq!(decode(r#""\u{}""#), None);
        assert_eq!(decode(r#""unclosed"#), None);
    }

    #[test]
    fn numeric_escape_detection_ignores_escaped_backslashes() {
        assert!(has_numeric_escape(r#""\x64""#));
        assert!(!has_numeric_escape(r#""\\x64""#));
        assert!(!has_numeric_escape(r#""it\'s""#));
    }

    #[test]
    fn encode_then_decode_preserves_awkward_content() {
        let content = "a\"b'c`d${e}\\\n\u{1}";
        for quote in ['"', '\'', '`'] {
            assert_eq!(decode(&encode(content, quote)).as_deref(), Some(content));
        }
    }
}
