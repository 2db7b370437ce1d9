//! Script sanitizer: rewrites script text so that every form of the trigger statement becomes a
//! harmless no-op while everything else is left alone.
//!
//! The sanitizer is a pure text-to-text function. It is idempotent
//! (`sanitize(sanitize(x)) == sanitize(x)`) and returns the input unchanged, borrowed, when no
//! rule applies.

pub mod lexer;
pub mod literal;
mod rules;

use std::borrow::Cow;

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::trace;

pub use rules::SanitizationRule;

/// The statement that pauses execution when developer tools are attached.
pub const DEFAULT_TRIGGER_TOKEN: &str = "debugger";

/// Nested dynamic-code literals deeper than this are left as they are.
const MAX_NESTING: usize = 4;

/// Whole-table passes before the result is considered stable.
const MAX_PASSES: usize = 4;

static STANDARD: Lazy<ScriptSanitizer> = Lazy::new(ScriptSanitizer::default);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("trigger token `{0}` is not a plain identifier")]
    InvalidToken(String),
    #[error("rule `{rule}` failed to compile: {reason}")]
    Pattern { rule: &'static str, reason: String },
}

/// Result of a sanitization that also reports which rules rewrote something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeReport<'a> {
    pub text: Cow<'a, str>,
    pub fired: Vec<&'static str>,
}

impl SanitizeReport<'_> {
    pub fn changed(&self) -> bool {
        matches!(self.text, Cow::Owned(_))
    }
}

#[derive(Debug)]
pub struct ScriptSanitizer {
    token: String,
    rules: Vec<SanitizationRule>,
}

impl Default for ScriptSanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_TOKEN).expect("default trigger token is a valid identifier")
    }
}

impl ScriptSanitizer {
    pub fn new(token: impl Into<String>) -> Result<Self, SanitizeError> {
        let token = token.into();
        let valid = token
            .bytes()
            .next()
            .map_or(false, |b| !b.is_ascii_digit())
            && token.bytes().all(lexer::is_ident_byte);
        if !valid {
            return Err(SanitizeError::InvalidToken(token));
        }
        let rules = rules::standard_rules(&token)?;
        Ok(Self { token, rules })
    }

    /// Shared instance for the default trigger token.
    pub fn standard() -> &'static ScriptSanitizer {
        &STANDARD
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(SanitizationRule::name).collect()
    }

    /// Cheap pre-check: whether the token text occurs anywhere at all. Sources that fail this
    /// check are never rewritten except through encoded forms, so callers still sanitize them.
    pub fn contains_trigger(&self, source: &str) -> bool {
        source.contains(self.token.as_str())
    }

    pub fn sanitize<'a>(&self, source: &'a str) -> Cow<'a, str> {
        self.sanitize_with_report(source).text
    }

    pub fn sanitize_with_report<'a>(&self, source: &'a str) -> SanitizeReport<'a> {
        let mut fired = Vec::new();
        let text = match self.run(source, 0, &mut fired) {
            Some(rewritten) => {
                trace!(rules = ?fired, before = source.len(), after = rewritten.len(), "script rewritten");
                Cow::Owned(rewritten)
            }
            None => Cow::Borrowed(source),
        };
        SanitizeReport { text, fired }
    }

    /// Sanitizes text recovered from a literal. `None` when nothing changed or the nesting
    /// limit was reached.
    pub(crate) fn sanitize_nested(&self, source: &str, depth: usize) -> Option<String> {
        if depth > MAX_NESTING {
            return None;
        }
        self.run(source, depth, &mut Vec::new())
    }

    fn run(&self, source: &str, depth: usize, fired: &mut Vec<&'static str>) -> Option<String> {
        let mut current: Option<String> = None;
        for _ in 0..MAX_PASSES {
            let mut changed = false;
            for rule in &self.rules {
                let input = current.as_deref().unwrap_or(source);
                if let Some(next) = rule.apply(input, self, depth) {
                    if !fired.contains(&rule.name()) {
                        fired.push(rule.name());
                    }
                    current = Some(next);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        current.filter(|text| text != source)
    }
}

/// Whether a fetched resource should be treated as script text: by path extension or by
/// declared content type.
pub fn is_script_resource(path: &str, content_type: Option<&str>) -> bool {
    let path = path
        .split(&['?', '#'][..])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if [".js", ".mjs", ".cjs"].iter().any(|ext| path.ends_with(ext)) {
        return true;
    }
    content_type
        .map(|value| {
            let mime = value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            mime.contains("javascript") || mime.contains("ecmascript")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn untouched_input_is_borrowed() {
        let source = "function add(a, b) { return a + b; }";
        let outcome = ScriptSanitizer::standard().sanitize_with_report(source);
        assert!(matches!(outcome.text, Cow::Borrowed(_)));
        assert!(!outcome.changed());
        assert!(outcome.fired.is_empty());
    }

    #[test]
    fn rules_are_reported_in_table_order() {
        let sanitizer = ScriptSanitizer::standard();
        assert_eq!(
            sanitizer.rule_names(),
            vec![
                "encoded-literal",
                "from-char-code",
                "split-literal",
                "constructor-call",
                "dynamic-function",
                "eval-or-timer",
                "bare-statement",
            ]
        );
        let outcome = sanitizer.sanitize_with_report("debugger; eval('debu' + 'gger')");
        assert_eq!(outcome.fired, vec!["split-literal", "bare-statement"]);
        assert_eq!(outcome.text, "void 0; eval('void 0;')");
    }

    #[test]
    fn custom_token_is_supported() {
        let sanitizer = ScriptSanitizer::new("halt").unwrap();
        assert_eq!(sanitizer.sanitize("halt;\ndebugger;"), "void 0;\ndebugger;");
        assert!(sanitizer.contains_trigger("x.halt"));
    }

    #[test]
    fn invalid_tokens_are_rejected() {
        for token in ["", "9lives", "two words", "a.b"] {
            assert_eq!(
                ScriptSanitizer::new(token).unwrap_err(),
                SanitizeError::InvalidToken(token.to_string())
            );
        }
    }

    #[test]
    fn sanitizing_twice_changes_nothing() {
        let sanitizer = ScriptSanitizer::standard();
        for source in [
            "debugger",
            "setInterval(function(){ debugger }, 100)",
            "eval(\"\\x64ebugger\")",
            "(function(){}).constructor('debugger')()",
            "x = 'de' + 'bugger'\ndebugger\n",
        ] {
            let once = sanitizer.sanitize(source).into_owned();
            assert_eq!(sanitizer.sanitize(&once), once.as_str());
        }
    }

    #[test]
    fn script_resources_are_recognised() {
        assert!(is_script_resource("/static/app.js", None));
        assert!(is_script_resource("/static/app.MJS?v=3", None));
        assert!(is_script_resource("/bundle", Some("application/javascript; charset=utf-8")));
        assert!(is_script_resource("/bundle", Some("text/ecmascript")));
        assert!(!is_script_resource("/data.json", Some("application/json")));
        assert!(!is_script_resource("/style.css", None));
    }
}
