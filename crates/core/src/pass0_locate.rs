//! Pass 0: locate the formula block in a document and normalize its text.
//!
//! The block is the text between `BEGIN` and `END` following the configured
//! start phrase. Cleaning undoes the damage word processors do to formulas
//! (typographic glyphs, footnote markers, stray spaces) before anything is
//! lexed.

use crate::config::TargetEncoding;
use crate::error::FormulaError;
use regex::{Captures, Regex};
use std::sync::LazyLock;

pub const BEGIN_MARKER: &str = "BEGIN";
pub const END_MARKER: &str = "END";

pub const STATUS_INITIAL: &str = "No formula found.";
pub const STATUS_FOUND: &str = "Formula text found.";
pub const STATUS_NO_START_PHRASE: &str = "Start phrase not found.";
pub const STATUS_NO_BEGIN: &str = "BEGIN not found.";
pub const STATUS_NO_END: &str = "Found BEGIN but no END";
pub const STATUS_EMPTY_BLOCK: &str = "Found empty BEGIN/END block";

/// Internal summation marker, and the glyph it stands for.
pub const SUMMATION_MARKER: char = '~';
pub const SUMMATION_GLYPH: char = '\u{2211}';

const NOISE_TOKENS: &[&str] = &["SumOverCellPLMN", "TIME_SHIFT"];

/// Parenthesized numeric footnotes such as `(1-4)`. A list following
/// `~Counter`, with or without spaces between, is a summation range and is
/// captured so it can be kept.
static FOOTNOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(~[A-Za-z_@][A-Za-z0-9_.$]*\s*)?\([0-9 \-]*\)").expect("footnote pattern")
});

/// `$ name` -> `$name`
static SIGIL_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\$) +([A-Za-z0-9])").expect("sigil pattern"));

/// Spaces inside a `Formula://` path.
static REFERENCE_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Formula://[A-Za-z0-9/_]*) +([A-Za-z0-9/_]*)").expect("reference pattern")
});

/// A deleted `##` footnote marker: the operator before it, the marker, and
/// any identifier fragment trailing it.
static FOOTNOTE_HASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[+\-*(]\s*#\s*#\s*[A-Za-z0-9_.$]*").expect("footnote hash pattern")
});

static DOT_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\. +").expect("dot pattern"));

/// Outcome of searching a document for its formula block.
#[derive(Debug, Clone, PartialEq)]
pub enum Located {
    /// No start phrase: nothing to parse, and not an error.
    NoStartPhrase,
    /// Trimmed text strictly between `BEGIN` and `END`.
    Formula(String),
    /// Start phrase present but the block is missing or empty.
    Malformed(&'static str),
}

impl Located {
    pub fn status(&self) -> &'static str {
        match self {
            Located::NoStartPhrase => STATUS_NO_START_PHRASE,
            Located::Formula(_) => STATUS_FOUND,
            Located::Malformed(status) => status,
        }
    }
}

/// Undo the stray space some documents carry before the start phrase colon.
pub fn normalize_document(src: &str) -> String {
    src.replace("eNB Counter Method :", "eNB Counter Method:")
}

/// Find the formula block after `start_phrase` (matched case-insensitively).
pub fn locate(src: &str, start_phrase: &str) -> Located {
    let Some(phrase_at) = find_ignore_case(src, start_phrase) else {
        return Located::NoStartPhrase;
    };
    let Some(begin_at) = src[phrase_at..].find(BEGIN_MARKER).map(|i| i + phrase_at) else {
        return Located::Malformed(STATUS_NO_BEGIN);
    };
    let body_at = begin_at + BEGIN_MARKER.len();
    let Some(end_at) = src[body_at..].find(END_MARKER).map(|i| i + body_at) else {
        return Located::Malformed(STATUS_NO_END);
    };
    let formula = src[body_at..end_at].trim();
    if formula.is_empty() {
        Located::Malformed(STATUS_EMPTY_BLOCK)
    } else {
        Located::Formula(formula.to_string())
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(haystack.len()))
        .find(|&i| starts_with_ignore_case(&haystack[i..], needle))
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    let mut chars = s.chars();
    prefix.chars().all(|p| {
        chars
            .next()
            .is_some_and(|c| c.to_lowercase().eq(p.to_lowercase()))
    })
}

/// Cleaned formula text plus anything suspicious found while cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct Cleaned {
    pub text: String,
    pub errors: Vec<FormulaError>,
}

/// Normalize a raw formula. Applied until nothing changes, so cleaning
/// already-clean text is a no-op.
pub fn clean(raw: &str, encoding: TargetEncoding) -> Cleaned {
    let mut text = clean_once(raw, encoding);
    loop {
        let next = clean_once(&text, encoding);
        if next == text {
            break;
        }
        text = next;
    }

    let mut errors = Vec::new();
    if text.contains('#') {
        errors.push(FormulaError::lexical(
            0,
            "## must be preceded by a plus, minus, open paren, or multiplication symbol",
        ));
    }
    Cleaned { text, errors }
}

fn clean_once(src: &str, encoding: TargetEncoding) -> String {
    let text = src.replace(SUMMATION_GLYPH, &SUMMATION_MARKER.to_string());
    let text = transliterate(&text, encoding);
    let mut text = FOOTNOTE_RE
        .replace_all(&text, |caps: &Captures| match caps.get(1) {
            Some(_) => caps[0].to_string(),
            None => String::new(),
        })
        .into_owned();
    for noise in NOISE_TOKENS {
        text = text.replace(*noise, "");
    }
    let text = SIGIL_SPACE_RE.replace_all(&text, "${1}${2}");
    let text = REFERENCE_SPACE_RE.replace_all(&text, "${1}${2}");
    let text = FOOTNOTE_HASH_RE.replace_all(&text, "");
    DOT_SPACE_RE.replace_all(&text, ".").into_owned()
}

/// The cleaned formula as it would be shown to a reader.
pub fn display_formula(cleaned: &str) -> String {
    cleaned.replace(SUMMATION_MARKER, &SUMMATION_GLYPH.to_string())
}

/// Best-effort, lossy mapping into the target repertoire. Unmappable
/// characters become `?`.
pub fn transliterate(src: &str, encoding: TargetEncoding) -> String {
    let mut out = String::with_capacity(src.len());
    for c in src.chars() {
        match fold_char(c, encoding) {
            Some(s) => out.push_str(s),
            None => out.push(c),
        }
    }
    out
}

/// Replacement for `c`, or `None` to keep it.
fn fold_char(c: char, encoding: TargetEncoding) -> Option<&'static str> {
    let folded = match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => "'",
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => "\"",
        '\u{2010}'..='\u{2015}' | '\u{2212}' => "-",
        '\u{2026}' => "...",
        '\u{2002}'..='\u{200A}' | '\u{202F}' => " ",
        '\u{200B}' | '\u{FEFF}' => "",
        '\u{2215}' => "/",
        '\u{2217}' | '\u{22C5}' => "*",
        c if c.is_ascii() => return None,
        c if (c as u32) <= 0xFF => match encoding {
            TargetEncoding::Latin1 => return None,
            TargetEncoding::Ascii => match c {
                '\u{a0}' => " ",
                '\u{d7}' => "*",
                '\u{f7}' => "/",
                _ => "?",
            },
        },
        _ => "?",
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_finds_block_case_insensitively() {
        let doc = "Intro\neNB counter METHOD: see below BEGIN  a + b \nEND trailing";
        assert_eq!(
            locate(doc, "eNB Counter Method:"),
            Located::Formula("a + b".to_string())
        );
    }

    #[test]
    fn locate_without_start_phrase_is_not_found() {
        let located = locate("BEGIN x END", "Begin:");
        assert_eq!(located, Located::NoStartPhrase);
        assert!(located.status().contains("not found"));
    }

    #[test]
    fn locate_structural_failures() {
        assert_eq!(
            locate("Method: no block", "Method:"),
            Located::Malformed(STATUS_NO_BEGIN)
        );
        assert_eq!(
            locate("Method: BEGIN a + b", "Method:"),
            Located::Malformed(STATUS_NO_END)
        );
        assert_eq!(
            locate("Method: BEGIN   END", "Method:"),
            Located::Malformed(STATUS_EMPTY_BLOCK)
        );
    }

    #[test]
    fn locate_ignores_begin_before_phrase() {
        assert_eq!(
            locate("BEGIN old END Method: BEGIN new END", "Method:"),
            Located::Formula("new".to_string())
        );
    }

    #[test]
    fn normalize_fixes_space_before_colon() {
        assert_eq!(
            normalize_document("eNB Counter Method : BEGIN"),
            "eNB Counter Method: BEGIN"
        );
    }

    #[test]
    fn clean_maps_summation_glyph() {
        let c = clean("\u{2211}C1 + C2", TargetEncoding::Latin1);
        assert_eq!(c.text, "~C1 + C2");
        assert!(c.errors.is_empty());
        assert_eq!(display_formula(&c.text), "\u{2211}C1 + C2");
    }

    #[test]
    fn clean_strips_footnotes_and_noise() {
        let c = clean("A(1-4) + SumOverCellPLMN B (2) + TIME_SHIFTC", TargetEncoding::Latin1);
        assert_eq!(c.text, "A +  B  + C");
    }

    #[test]
    fn clean_keeps_summation_ranges() {
        let c = clean("\u{2211}C(0-2) + D(3)", TargetEncoding::Latin1);
        assert_eq!(c.text, "~C(0-2) + D");

        let c = clean("\u{2211}C (0-2) + ~E  (4-5) + D(3)", TargetEncoding::Latin1);
        assert_eq!(c.text, "~C (0-2) + ~E  (4-5) + D");
    }

    #[test]
    fn clean_collapses_sigil_reference_and_dot_spaces() {
        let c = clean(
            "$  x + (Formula://EnbCounter Method/K1/ $v) + A.  b",
            TargetEncoding::Latin1,
        );
        assert_eq!(c.text, "$x + (Formula://EnbCounterMethod/K1/$v) + A.b");
    }

    #[test]
    fn clean_removes_double_hash_footnotes() {
        let c = clean("A + B + ## 3 * C", TargetEncoding::Latin1);
        assert_eq!(c.text, "A + B  * C");
        assert!(c.errors.is_empty());
    }

    #[test]
    fn clean_flags_stray_hash() {
        let c = clean("A # B", TargetEncoding::Latin1);
        assert_eq!(c.errors.len(), 1);
        assert!(c.errors[0].message.starts_with("## must be preceded"));
    }

    #[test]
    fn clean_transliterates_typographic_characters() {
        let c = clean("A \u{2212} B \u{2013} C\u{00a0}D \u{4e2d}", TargetEncoding::Latin1);
        assert_eq!(c.text, "A - B - C\u{00a0}D ?");
        let c = clean("C\u{00a0}D \u{d7} E", TargetEncoding::Ascii);
        assert_eq!(c.text, "C D * E");
    }

    #[test]
    fn clean_is_idempotent() {
        let inputs = [
            "\u{2211}C(0-2) + ((1)) $ a + Formula:// Enb Counter/K1 $v",
            "A +  ##  foo. . bar",
            "plain + text * 3",
        ];
        for input in inputs {
            let once = clean(input, TargetEncoding::Latin1).text;
            let twice = clean(&once, TargetEncoding::Latin1).text;
            assert_eq!(once, twice, "input {:?}", input);
        }
    }
}
