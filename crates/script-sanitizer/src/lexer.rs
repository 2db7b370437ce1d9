//! A small JavaScript-aware scanner.
//!
//! The sanitizer only needs to know which byte ranges of a script are code, which are string
//! literals, and which are comments or regular-expression literals. Full parsing is not required:
//! every rule matches against a *masked* copy of the source in which the bodies of literals,
//! comments and regexes are blanked out, so textual patterns can no longer be fooled by quoted
//! content. Offsets in the masked copy are identical to offsets in the original.

use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    /// A complete `'...'`, `"..."` or substitution-free template literal.
    Literal,
    /// A piece of a template literal that has `${...}` substitutions.
    TemplateChunk,
    Comment,
    Regex,
    /// A string or template that runs into a line end or the end of input.
    Unterminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub start: usize,
    pub end: usize,
}

/// A literal located by the scanner, with its delimiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiteralSpan {
    pub start: usize,
    pub end: usize,
    pub quote: char,
}

/// Keywords whose parenthesized head is followed by a statement, so `/` after the closing `)`
/// starts a regex.
const CONTROL_WORDS: &[&str] = &["if", "while", "for", "with"];

/// Keywords after which a `/` starts a regular expression rather than a division.
const REGEX_PRECEDING_WORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TemplateEnd {
    Closed,
    Substitution,
    Unterminated,
}

struct Scanner<'a> {
    bytes: &'a [u8],
    statement_words: &'a [&'a str],
    segments: Vec<Segment>,
    code_start: usize,
    regex_ok: bool,
    word_start: Option<usize>,
    template_depths: Vec<usize>,
    /// One entry per open `(`: whether it opened a control-statement head.
    parens: Vec<bool>,
    after_control_word: bool,
}

impl<'a> Scanner<'a> {
    fn flush_code(&mut self, upto: usize) {
        if upto > self.code_start {
            self.segments.push(Segment {
                kind: SegmentKind::Code,
                start: self.code_start,
                end: upto,
            });
        }
    }

    fn push(&mut self, kind: SegmentKind, start: usize, end: usize) {
        self.flush_code(start);
        self.segments.push(Segment { kind, start, end });
        self.code_start = end;
    }

    fn finish_word(&mut self, end: usize) {
        if let Some(start) = self.word_start.take() {
            let word = std::str::from_utf8(&self.bytes[start..end]).unwrap_or_default();
            self.regex_ok = REGEX_PRECEDING_WORDS.contains(&word)
                || self.statement_words.contains(&word);
            self.after_control_word = CONTROL_WORDS.contains(&word);
        }
    }

    /// Returns the end offset and whether the closing quote was found.
    fn scan_string(&self, start: usize, quote: u8) -> (usize, bool) {
        let mut j = start + 1;
        while j < self.bytes.len() {
            match self.bytes[j] {
                b'\\' => j += 2,
                b'\n' | b'\r' => return (j, false),
                b if b == quote => return (j + 1, true),
                _ => j += 1,
            }
        }
        (self.bytes.len(), false)
    }

    /// Scans a template piece starting at `start` (a backtick or the `}` closing a substitution).
    fn scan_template(&self, start: usize) -> (usize, TemplateEnd) {
        let mut j = start + 1;
        while j < self.bytes.len() {
            match self.bytes[j] {
                b'\\' => j += 2,
                b'`' => return (j + 1, TemplateEnd::Closed),
                b'$' if self.bytes.get(j + 1) == Some(&b'{') => {
                    return (j + 2, TemplateEnd::Substitution)
                }
                _ => j += 1,
            }
        }
        (self.bytes.len(), TemplateEnd::Unterminated)
    }

    fn push_template(&mut self, start: usize, end: usize, outcome: TemplateEnd, whole: bool) {
        match outcome {
            TemplateEnd::Substitution => {
                self.push(SegmentKind::TemplateChunk, start, end);
                self.template_depths.push(0);
                self.regex_ok = true;
            }
            TemplateEnd::Closed => {
                let kind = if whole {
                    SegmentKind::Literal
                } else {
                    SegmentKind::TemplateChunk
                };
                self.push(kind, start, end);
                self.regex_ok = false;
            }
            TemplateEnd::Unterminated => {
                self.push(SegmentKind::Unterminated, start, end);
                self.regex_ok = false;
            }
        }
    }

    fn scan_regex(&self, start: usize) -> Option<usize> {
        let mut j = start + 1;
        let mut in_class = false;
        while j < self.bytes.len() {
            match self.bytes[j] {
                b'\\' => j += 2,
                b'\n' | b'\r' => return None,
                b'[' => {
                    in_class = true;
                    j += 1;
                }
                b']' => {
                    in_class = false;
                    j += 1;
                }
                b'/' if !in_class => {
                    j += 1;
                    while j < self.bytes.len() && self.bytes[j].is_ascii_alphabetic() {
                        j += 1;
                    }
                    return Some(j);
                }
                _ => j += 1,
            }
        }
        None
    }

    fn run(mut self) -> Vec<Segment> {
        let len = self.bytes.len();
        let mut i = 0;
        while i < len {
            let b = self.bytes[i];
            if is_ident_byte(b) {
                if self.word_start.is_none() {
                    self.word_start = Some(i);
                }
                i += 1;
                continue;
            }
            self.finish_word(i);

            match b {
                b'"' | b'\'' => {
                    let (end, terminated) = self.scan_string(i, b);
                    let kind = if terminated {
                        SegmentKind::Literal
                    } else {
                        SegmentKind::Unterminated
                    };
                    self.push(kind, i, end);
                    self.regex_ok = false;
                    i = end;
                }
                b'`' => {
                    let (end, outcome) = self.scan_template(i);
                    self.push_template(i, end, outcome, true);
                    i = end;
                }
                b'}' if self.template_depths.last() == Some(&0) => {
                    self.template_depths.pop();
                    let (end, outcome) = self.scan_template(i);
                    self.push_template(i, end, outcome, false);
                    i = end;
                }
                b'/' if self.bytes.get(i + 1) == Some(&b'/') => {
                    let mut end = i + 2;
                    while end < len && self.bytes[end] != b'\n' {
                        end += 1;
                    }
                    self.push(SegmentKind::Comment, i, end);
                    i = end;
                }
                b'/' if self.bytes.get(i + 1) == Some(&b'*') => {
                    let end = find_block_comment_end(self.bytes, i + 2);
                    self.push(SegmentKind::Comment, i, end);
                    i = end;
                }
                b'/' if self.regex_ok => match self.scan_regex(i) {
                    Some(end) => {
                        self.push(SegmentKind::Regex, i, end);
                        self.regex_ok = false;
                        i = end;
                    }
                    None => {
                        self.regex_ok = true;
                        i += 1;
                    }
                },
                b if b.is_ascii_whitespace() => i += 1,
                // `n++ / 2` divides; a prefix `++` still expects an operand.
                b'+' | b'-' if self.bytes.get(i + 1) == Some(&b) => {
                    self.after_control_word = false;
                    i += 2;
                }
                _ => {
                    let control = std::mem::take(&mut self.after_control_word);
                    match b {
                        b'{' => {
                            if let Some(depth) = self.template_depths.last_mut() {
                                *depth += 1;
                            }
                        }
                        b'}' => {
                            if let Some(depth) = self.template_depths.last_mut() {
                                *depth = depth.saturating_sub(1);
                            }
                        }
                        b'(' => self.parens.push(control),
                        _ => {}
                    }
                    self.regex_ok = match b {
                        b')' => self.parens.pop().unwrap_or(false),
                        b']' => false,
                        _ => true,
                    };
                    i += 1;
                }
            }
        }
        self.finish_word(len);
        self.flush_code(len);
        self.segments
    }
}

fn find_block_comment_end(bytes: &[u8], from: usize) -> usize {
    let mut j = from;
    while j + 1 < bytes.len() {
        if bytes[j] == b'*' && bytes[j + 1] == b'/' {
            return j + 2;
        }
        j += 1;
    }
    bytes.len()
}

pub(crate) fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// Splits `source` into contiguous segments covering every byte.
///
/// `statement_words` are extra keywords that end a statement (the trigger token), so a `/`
/// following them is treated as the start of a regex.
pub fn lex(source: &str, statement_words: &[&str]) -> Vec<Segment> {
    Scanner {
        bytes: source.as_bytes(),
        statement_words,
        segments: Vec::new(),
        code_start: 0,
        regex_ok: true,
        word_start: None,
        template_depths: Vec::new(),
        parens: Vec::new(),
        after_control_word: false,
    }
    .run()
}

/// Source text with non-code regions blanked out, plus the literal table.
pub struct MaskedSource {
    pub masked: String,
    pub literals: BTreeMap<usize, LiteralSpan>,
}

impl MaskedSource {
    pub fn new(source: &str, statement_words: &[&str]) -> Option<Self> {
        let bytes = source.as_bytes();
        let mut masked = Vec::with_capacity(bytes.len());
        let mut literals = BTreeMap::new();

        for segment in lex(source, statement_words) {
            let slice = &bytes[segment.start..segment.end];
            match segment.kind {
                SegmentKind::Code => masked.extend_from_slice(slice),
                SegmentKind::Literal => {
                    let quote = slice[0];
                    masked.push(quote);
                    masked.extend(std::iter::repeat(b'_').take(slice.len() - 2));
                    masked.push(quote);
                    literals.insert(
                        segment.start,
                        LiteralSpan {
                            start: segment.start,
                            end: segment.end,
                            quote: quote as char,
                        },
                    );
                }
                SegmentKind::Regex => {
                    masked.push(b'/');
                    masked.extend(std::iter::repeat(b'_').take(slice.len() - 1));
                }
                SegmentKind::Comment | SegmentKind::TemplateChunk | SegmentKind::Unterminated => {
                    masked.extend(slice.iter().map(|b| match b {
                        b'\n' | b'\r' => *b,
                        _ => b' ',
                    }));
                }
            }
        }

        String::from_utf8(masked)
            .ok()
            .map(|masked| Self { masked, literals })
    }

    pub fn literal_at(&self, start: usize, end: usize) -> Option<LiteralSpan> {
        self.literals
            .get(&start)
            .copied()
            .filter(|span| span.end == end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<(SegmentKind, &str)> {
        lex(source, &["debugger"])
            .into_iter()
            .map(|s| (s.kind, &source[s.start..s.end]))
            .collect()
    }

    #[test]
    fn separates_strings_comments_and_code() {
        assert_eq!(
            kinds("a('x'); // debugger\n/* y */ b"),
            vec![
                (SegmentKind::Code, "a("),
                (SegmentKind::Literal, "'x'"),
                (SegmentKind::Code, "); "),
                (SegmentKind::Comment, "// debugger"),
                (SegmentKind::Code, "\n"),
                (SegmentKind::Comment, "/* y */"),
                (SegmentKind::Code, " b"),
            ]
        );
    }

    #[test]
    fn division_and_regex_are_told_apart() {
        let segments = kinds("x = a / b / c; y = /de\"bug/g.test(s)");
        assert!(segments
            .iter()
            .all(|(kind, text)| *kind != SegmentKind::Literal || !text.contains("de")));
        assert!(segments.contains(&(SegmentKind::Regex, "/de\"bug/g")));
    }

    #[test]
    fn postfix_increment_is_followed_by_division() {
        let segments = kinds("var n=0;n++/2;debugger;var m=1/3;");
        assert!(segments.iter().all(|(kind, _)| *kind == SegmentKind::Code));

        let segments = kinds("x = ++/a/.lastIndex");
        assert!(segments.contains(&(SegmentKind::Regex, "/a/")));
    }

    #[test]
    fn regex_may_follow_a_control_head() {
        let segments = kinds("if(ok)/\"/.test(s);debugger;var q=\"z\";");
        assert!(segments.contains(&(SegmentKind::Regex, "/\"/")));
        assert!(segments.contains(&(SegmentKind::Code, ".test(s);debugger;var q=")));
        assert!(segments.contains(&(SegmentKind::Literal, "\"z\"")));

        let segments = kinds("while (f(x)) /re/.exec(y); z = (a + b) / c / d");
        assert!(segments.contains(&(SegmentKind::Regex, "/re/")));
        assert_eq!(
            segments.iter().filter(|(kind, _)| *kind == SegmentKind::Regex).count(),
            1
        );
    }

    #[test]
    fn template_substitutions_stay_code() {
        let segments = kinds("`a${ debugger }b`");
        assert_eq!(
            segments,
            vec![
                (SegmentKind::TemplateChunk, "`a${"),
                (SegmentKind::Code, " debugger "),
                (SegmentKind::TemplateChunk, "}b`"),
            ]
        );
    }

    #[test]
    fn unterminated_string_stops_at_newline() {
        let segments = kinds("'abc\nnext");
        assert_eq!(segments[0], (SegmentKind::Unterminated, "'abc"));
        assert_eq!(segments[1], (SegmentKind::Code, "\nnext"));
    }

    #[test]
    fn masked_source_keeps_offsets() {
        let source = "eval(\"debugger\") // debugger";
        let masked = MaskedSource::new(source, &["debugger"]).unwrap();
        assert_eq!(masked.masked.len(), source.len());
        assert!(!masked.masked.contains("debugger"));
        assert!(masked.literal_at(5, 15).is_some());
    }
}
