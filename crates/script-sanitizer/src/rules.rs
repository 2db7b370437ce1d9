//! The ordered rewrite table.
//!
//! Every rule matches against the masked source (see [`crate::lexer`]) so string contents,
//! comments and regex bodies can never produce a false match. Rules that operate on literal
//! arguments decode the literal, sanitize the decoded text as code, and only rewrite when that
//! changes something. Re-emitted literals keep their original quote style.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Match, Regex};

use crate::lexer::{LiteralSpan, MaskedSource};
use crate::literal::{decode, encode, has_numeric_escape};
use crate::{SanitizeError, ScriptSanitizer};

/// A masked literal of any quote style.
const LIT: &str = r#""_*"|'_*'|`_*`"#;

/// One masked literal or several joined with `+`.
const CONCAT: &str = r#"(?:"_*"|'_*'|`_*`)(?:\s*\+\s*(?:"_*"|'_*'|`_*`))*"#;

static LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(LIT).expect("literal pattern"));

/// Text that stands in for a neutralized trigger statement.
pub(crate) const NO_OP: &str = "void 0";

pub(crate) struct Edit {
    range: Range<usize>,
    replacement: String,
}

pub(crate) struct RuleInput<'a> {
    source: &'a str,
    masked: &'a MaskedSource,
    sanitizer: &'a ScriptSanitizer,
    depth: usize,
}

type Rewrite = fn(&RuleInput<'_>, &Captures<'_>) -> Option<Edit>;

/// One pattern/rewrite pair. Rules are immutable once the sanitizer is built.
pub struct SanitizationRule {
    name: &'static str,
    hint: Option<&'static str>,
    matcher: Regex,
    rewrite: Rewrite,
}

impl std::fmt::Debug for SanitizationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SanitizationRule")
            .field("name", &self.name)
            .field("matcher", &self.matcher.as_str())
            .finish()
    }
}

impl SanitizationRule {
    fn new(
        name: &'static str,
        hint: Option<&'static str>,
        pattern: &str,
        rewrite: Rewrite,
    ) -> Result<Self, SanitizeError> {
        let matcher = Regex::new(pattern).map_err(|err| SanitizeError::Pattern {
            rule: name,
            reason: err.to_string(),
        })?;
        Ok(Self {
            name,
            hint,
            matcher,
            rewrite,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Applies the rule once over `source`; `None` when nothing changed.
    pub(crate) fn apply(
        &self,
        source: &str,
        sanitizer: &ScriptSanitizer,
        depth: usize,
    ) -> Option<String> {
        if let Some(hint) = self.hint {
            if !source.contains(hint) {
                return None;
            }
        }
        let masked = MaskedSource::new(source, &[sanitizer.token()])?;
        let input = RuleInput {
            source,
            masked: &masked,
            sanitizer,
            depth,
        };

        let edits: Vec<Edit> = self
            .matcher
            .captures_iter(&masked.masked)
            .filter_map(|caps| (self.rewrite)(&input, &caps))
            .collect();
        if edits.is_empty() {
            return None;
        }

        let mut out = String::with_capacity(source.len());
        let mut cursor = 0;
        for edit in edits {
            out.push_str(source.get(cursor..edit.range.start)?);
            out.push_str(&edit.replacement);
            cursor = edit.range.end;
        }
        out.push_str(source.get(cursor..)?);
        Some(out)
    }
}

/// Builds the rule table in application order.
pub(crate) fn standard_rules(token: &str) -> Result<Vec<SanitizationRule>, SanitizeError> {
    Ok(vec![
        SanitizationRule::new("encoded-literal", Some("\\"), LIT, encoded_literal)?,
        SanitizationRule::new(
            "from-char-code",
            Some("fromCharCode"),
            r"\bString\s*\.\s*fromCharCode\s*\(\s*((?:0[xX][0-9a-fA-F]+|\d+)(?:\s*,\s*(?:0[xX][0-9a-fA-F]+|\d+))*)\s*,?\s*\)",
            from_char_code,
        )?,
        SanitizationRule::new(
            "split-literal",
            Some("+"),
            &format!(r"(?:{LIT})(?:\s*\+\s*(?:{LIT}))+"),
            split_literal,
        )?,
        SanitizationRule::new(
            "constructor-call",
            Some("constructor"),
            &format!(r"(?:\.\s*constructor|\[\s*({LIT})\s*\])\s*\(\s*({CONCAT})\s*[,)]"),
            constructor_call,
        )?,
        SanitizationRule::new(
            "dynamic-function",
            Some("Function"),
            &format!(
                r"\b(?:new\s+)?(?:AsyncGenerator|Async|Generator)?Function\s*\(([^()]*?,\s*)?({CONCAT})\s*\)"
            ),
            dynamic_function,
        )?,
        SanitizationRule::new(
            "eval-or-timer",
            None,
            &format!(r"\b(?:eval|setTimeout|setInterval|execScript)\s*\(\s*({CONCAT})\s*[,)]"),
            eval_or_timer,
        )?,
        SanitizationRule::new(
            "bare-statement",
            None,
            &format!(r"\b{}\b", regex::escape(token)),
            bare_statement,
        )?,
    ])
}

impl<'a> RuleInput<'a> {
    fn literal(&self, m: Match<'_>) -> Option<(LiteralSpan, String)> {
        let span = self.masked.literal_at(m.start(), m.end())?;
        let raw = self.source.get(span.start..span.end)?;
        Some((span, decode(raw)?))
    }

    /// Sanitizes decoded literal text as code; `Some` only when that changed it.
    fn neutralize(&self, decoded: &str) -> Option<String> {
        let rewritten = self.sanitizer.sanitize_nested(decoded, self.depth + 1)?;
        (rewritten != decoded).then_some(rewritten)
    }

    fn preceded_by_dollar(&self, start: usize) -> bool {
        start > 0 && self.masked.masked.as_bytes()[start - 1] == b'$'
    }

    /// Decodes a single literal or a `+` chain of literals into its parts, with the quote of
    /// the first one.
    fn literal_parts(&self, m: Match<'_>) -> Option<(char, Vec<String>)> {
        let mut quote = None;
        let mut parts = Vec::new();
        for part in LITERAL.find_iter(m.as_str()) {
            let start = m.start() + part.start();
            let end = m.start() + part.end();
            let span = self.masked.literal_at(start, end)?;
            parts.push(decode(self.source.get(start..end)?)?);
            quote.get_or_insert(span.quote);
        }
        Some((quote?, parts))
    }

    /// Rewrites a code-bearing argument (one literal or a literal chain) as a single literal.
    fn rewrite_literal_arg(&self, m: Match<'_>) -> Option<Edit> {
        let (quote, parts) = self.literal_parts(m)?;
        let neutralized = self.neutralize(&parts.concat())?;
        Some(Edit {
            range: m.range(),
            replacement: encode(&neutralized, quote),
        })
    }
}

/// Only literals whose escapes hide the token: plain text that merely mentions it is data.
fn encoded_literal(input: &RuleInput<'_>, caps: &Captures<'_>) -> Option<Edit> {
    let m = caps.get(0)?;
    let raw = input.source.get(m.range())?;
    let token = input.sanitizer.token();
    if !has_numeric_escape(raw) || raw.contains(token) {
        return None;
    }
    let (_, decoded) = input.literal(m)?;
    if !decoded.contains(token) {
        return None;
    }
    input.rewrite_literal_arg(m)
}

fn from_char_code(input: &RuleInput<'_>, caps: &Captures<'_>) -> Option<Edit> {
    let whole = caps.get(0)?;
    if input.preceded_by_dollar(whole.start()) {
        return None;
    }
    let mut decoded = String::new();
    for item in caps.get(1)?.as_str().split(',') {
        let item = item.trim();
        let value = match item.strip_prefix("0x").or_else(|| item.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => item.parse::<u32>().ok()?,
        };
        decoded.push(char::from_u32(value & 0xFFFF)?);
    }
    let neutralized = input.neutralize(&decoded)?;
    Some(Edit {
        range: whole.range(),
        replacement: encode(&neutralized, '"'),
    })
}

/// Only chains where the token spans a `+` boundary; a part holding the whole token is data.
fn split_literal(input: &RuleInput<'_>, caps: &Captures<'_>) -> Option<Edit> {
    let whole = caps.get(0)?;
    let token = input.sanitizer.token();
    let (_, parts) = input.literal_parts(whole)?;
    if parts.iter().any(|part| part.contains(token)) || !parts.concat().contains(token) {
        return None;
    }
    input.rewrite_literal_arg(whole)
}

fn constructor_call(input: &RuleInput<'_>, caps: &Captures<'_>) -> Option<Edit> {
    if let Some(key) = caps.get(1) {
        let (_, name) = input.literal(key)?;
        if name != "constructor" {
            return None;
        }
    }
    input.rewrite_literal_arg(caps.get(2)?)
}

fn dynamic_function(input: &RuleInput<'_>, caps: &Captures<'_>) -> Option<Edit> {
    if input.preceded_by_dollar(caps.get(0)?.start()) {
        return None;
    }
    input.rewrite_literal_arg(caps.get(2)?)
}

fn eval_or_timer(input: &RuleInput<'_>, caps: &Captures<'_>) -> Option<Edit> {
    if input.preceded_by_dollar(caps.get(0)?.start()) {
        return None;
    }
    input.rewrite_literal_arg(caps.get(1)?)
}

fn bare_statement(input: &RuleInput<'_>, caps: &Captures<'_>) -> Option<Edit> {
    let m = caps.get(0)?;
    let bytes = input.masked.masked.as_bytes();
    if input.preceded_by_dollar(m.start()) || bytes.get(m.end()) == Some(&b'$') {
        return None;
    }

    // Member access: `obj.debugger`, `obj?.debugger`.
    let before = bytes[..m.start()]
        .iter()
        .rev()
        .find(|b| !b.is_ascii_whitespace());
    if before == Some(&b'.') {
        return None;
    }

    // Object key or method shorthand on the same line.
    let same_line = bytes[m.end()..]
        .iter()
        .find(|b| **b != b' ' && **b != b'\t');
    if matches!(same_line, Some(b':') | Some(b'(')) {
        return None;
    }

    let next = bytes[m.end()..].iter().find(|b| !b.is_ascii_whitespace());
    let replacement = if next == Some(&b';') {
        NO_OP.to_string()
    } else {
        format!("{NO_OP};")
    };
    Some(Edit {
        range: m.range(),
        replacement,
    })
}
