//! Character-class lexer for counter formulas.
//!
//! The lexer is an explicit finite-state machine. Each input character is
//! classified, the pair `(state, class)` picks the next state, and a token is
//! emitted for the previous state's accumulated characters whenever the state
//! changes or the new state is `Operator`. That last rule is what makes every
//! operator character its own token: `://` lexes as three tokens.
//!
//! The text is walked followed by two virtual spaces and a virtual end
//! marker, which forces the final token out. Offsets are inclusive character
//! offsets into the text that was lexed; they go stale as soon as that text
//! is rewritten.

use serde::Serialize;
use std::fmt;

/// Reserved symbol spellings that lex as operators.
const RESERVED_TO: &str = "to";
/// Longest snippet of source quoted in a lexical error.
const ERROR_SNIPPET_LEN: usize = 32;
/// Characters that are always single-character operator tokens.
const OPERATOR_CHARS: &[char] = &[
    '[', ']', '(', ')', '+', '-', '*', '%', '/', '^', '=', '\u{2211}', '~', ',', '#', ':',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenClass {
    Symbol,
    Variable,
    Operator,
    Number,
    End,
    Error,
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenClass::Symbol => "SYMBOL",
            TokenClass::Variable => "VARIABLE",
            TokenClass::Operator => "OPERATOR",
            TokenClass::Number => "NUMBER",
            TokenClass::End => "END",
            TokenClass::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub class: TokenClass,
    pub text: String,
    /// First character offset, inclusive.
    pub start: usize,
    /// Last character offset, inclusive.
    pub end: usize,
}

impl Token {
    /// A symbol token, optionally with exactly the given text.
    pub fn is_symbol(&self, text: Option<&str>) -> bool {
        self.class == TokenClass::Symbol && text.map_or(true, |t| self.text == t)
    }

    pub fn is_operator(&self, op: char) -> bool {
        self.class == TokenClass::Operator && self.text.chars().eq(std::iter::once(op))
    }

    pub fn is_variable(&self) -> bool {
        self.class == TokenClass::Variable
    }

    pub fn is_number(&self) -> bool {
        self.class == TokenClass::Number
    }
}

/// Lexed tokens in source order, always terminated by one `End` token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// All tokens including the trailing `End`.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Tokens without the trailing `End`.
    pub fn body(&self) -> &[Token] {
        &self.tokens[..self.tokens.len() - 1]
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }
}

impl fmt::Display for TokenStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in self.body() {
            writeln!(f, "{} -> {} [{}, {}]", t.class, t.text, t.start, t.end)?;
        }
        Ok(())
    }
}

/// Result of lexing: the token stream plus any lexical error messages.
#[derive(Debug, Clone)]
pub struct Lexed {
    pub tokens: TokenStream,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Whitespace,
    Symbol,
    Variable,
    Operator,
    Number,
    End,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Whitespace,
    Letter,
    Underscore,
    At,
    Digit,
    Dot,
    Dollar,
    Operator,
    Sentinel,
    Other,
}

fn classify(c: Option<char>) -> CharClass {
    match c {
        None => CharClass::Sentinel,
        Some(c) if c.is_whitespace() || c == '\u{a0}' => CharClass::Whitespace,
        Some(c) if c.is_ascii_alphabetic() => CharClass::Letter,
        Some('_') => CharClass::Underscore,
        Some('@') => CharClass::At,
        Some(c) if c.is_ascii_digit() => CharClass::Digit,
        Some('.') => CharClass::Dot,
        Some('$') => CharClass::Dollar,
        Some(c) if OPERATOR_CHARS.contains(&c) => CharClass::Operator,
        Some(_) => CharClass::Other,
    }
}

/// Next state for `class` seen in `state`.
fn transition(state: State, class: CharClass) -> State {
    use CharClass as C;
    if class == C::Sentinel {
        return State::End;
    }
    match state {
        State::Whitespace | State::Operator => match class {
            C::Whitespace => State::Whitespace,
            C::Letter | C::Underscore | C::At => State::Symbol,
            C::Digit | C::Dot => State::Number,
            C::Operator => State::Operator,
            C::Dollar => State::Variable,
            C::Other | C::Sentinel => State::Error,
        },
        // A bad run lasts until whitespace or an operator.
        State::Error => match class {
            C::Whitespace => State::Whitespace,
            C::Operator => State::Operator,
            _ => State::Error,
        },
        State::Symbol => match class {
            C::Whitespace => State::Whitespace,
            C::Letter | C::Underscore | C::Digit | C::Dot | C::Dollar => State::Symbol,
            C::Operator => State::Operator,
            C::At | C::Other | C::Sentinel => State::Error,
        },
        State::Variable => match class {
            C::Whitespace => State::Whitespace,
            C::Letter | C::Underscore | C::Digit | C::Dot => State::Variable,
            C::Operator => State::Operator,
            C::Dollar | C::At | C::Other | C::Sentinel => State::Error,
        },
        State::Number => match class {
            C::Whitespace => State::Whitespace,
            C::Digit | C::Dot => State::Number,
            C::Operator => State::Operator,
            C::Letter | C::Underscore | C::At | C::Dollar | C::Other | C::Sentinel => State::Error,
        },
        State::End => State::End,
    }
}

/// Transition plus whether the previous accumulation is emitted.
fn step(state: State, class: CharClass) -> (State, bool) {
    let next = transition(state, class);
    let emit = next != state || next == State::Operator;
    (next, emit)
}

/// Lex `src`. In relaxed mode unclassifiable characters are skipped like
/// whitespace and no errors are reported.
pub fn lex(src: &str, relaxed: bool) -> Lexed {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    let mut state = State::Whitespace;
    let mut text = String::new();
    let mut start = 0usize;

    let input = chars
        .iter()
        .copied()
        .map(Some)
        .chain([Some(' '), Some(' '), None]);

    for (pos, c) in input.enumerate() {
        let (next, emit) = step(state, classify(c));
        if emit {
            tracing::trace!(offset = pos, from = ?state, to = ?next, "lexer transition");
            if let Some(token) = make_token(state, &text, start, pos, relaxed) {
                tokens.push(token);
            }
            if next == State::Error && !relaxed {
                errors.push(format!(
                    "Lexical error at offset {}: [...{}]",
                    pos,
                    error_snippet(&chars, pos)
                ));
            }
            text.clear();
            start = pos;
            state = next;
        }
        if let Some(c) = c {
            text.push(c);
        }
    }

    tokens.push(Token {
        class: TokenClass::End,
        text: String::new(),
        start: chars.len(),
        end: chars.len(),
    });

    Lexed {
        tokens: TokenStream { tokens },
        errors,
    }
}

/// Build the token for a finished accumulation ending just before `pos`,
/// applying the reserved-word and glyph mappings.
fn make_token(state: State, text: &str, start: usize, pos: usize, relaxed: bool) -> Option<Token> {
    let class = match state {
        State::Whitespace | State::End => return None,
        State::Error if relaxed => return None,
        State::Error => TokenClass::Error,
        State::Symbol => TokenClass::Symbol,
        State::Variable => TokenClass::Variable,
        State::Operator => TokenClass::Operator,
        State::Number => TokenClass::Number,
    };
    let (class, text) = match class {
        TokenClass::Symbol if text.eq_ignore_ascii_case(RESERVED_TO) => {
            (TokenClass::Operator, "-".to_string())
        }
        TokenClass::Operator if text == "\u{2211}" => (TokenClass::Operator, "~".to_string()),
        _ => (class, text.to_string()),
    };
    Some(Token {
        class,
        text,
        start,
        end: pos - 1,
    })
}

/// Up to `ERROR_SNIPPET_LEN` characters of source ending at `pos`.
fn error_snippet(chars: &[char], pos: usize) -> String {
    let end = (pos + 1).min(chars.len());
    let begin = end.saturating_sub(ERROR_SNIPPET_LEN);
    chars[begin..end].iter().collect()
}

/// Characters `start..=end` of `src`, by character offset.
pub fn slice_chars(src: &str, start: usize, end: usize) -> String {
    if end < start {
        return String::new();
    }
    src.chars().skip(start).take(end - start + 1).collect()
}

/// Replace characters `start..=end` of `src` with `replacement`.
pub fn splice(src: &str, start: usize, end: usize, replacement: &str) -> String {
    let mut out: String = src.chars().take(start).collect();
    out.push_str(replacement);
    out.extend(src.chars().skip(end + 1));
    out
}
