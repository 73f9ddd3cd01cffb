//! Pass 3: expand `~Counter[(list)]` into an explicit sum of screenings.
//!
//! The list holds screening ids, `start-end` ranges and screening names. With
//! no list the ids default to `0..=8`. The ids and names are resolved against
//! the Counter-Screening Registry and the whole `~Counter(...)` span is
//! replaced by `(Counter.a+Counter.b+...)`.

use crate::config::{ParserConfig, VersionPolicy};
use crate::error::FormulaError;
use crate::lexer::{splice, Token, TokenClass, TokenStream};
use crate::registry::ScreeningRegistry;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Ids summed when a summation has no list.
pub const DEFAULT_SCREENING_IDS: RangeInclusive<i64> = 0..=8;

/// Largest number of ids a single `start-end` range may cover.
pub const MAX_RANGE_IDS: i64 = 1024;

/// A parsed summation: the counter and what to sum over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summation {
    pub counter: String,
    pub ids: BTreeSet<i64>,
    /// Screening names in the order written, without duplicates.
    pub names: Vec<String>,
}

impl Summation {
    fn new(counter: &str) -> Self {
        Summation {
            counter: counter.to_string(),
            ids: BTreeSet::new(),
            names: Vec::new(),
        }
    }

    fn add_name(&mut self, name: &str) {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
    }
}

/// Where the list scanner is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListState {
    /// Waiting for an id or a name.
    Awaiting,
    /// Holding an id; `,` commits it, `-` starts a range from it.
    Pending(i64),
    /// After `start-`, waiting for the end of the range.
    RangeEnd(i64),
}

/// Rewrite every summation in `src` and return the new source.
pub fn expand_summations(
    src: &str,
    tokens: &TokenStream,
    config: &ParserConfig,
    screenings: Option<&dyn ScreeningRegistry>,
    errors: &mut Vec<FormulaError>,
) -> String {
    let toks = tokens.tokens();
    let mut out = src.to_string();
    for i in (0..tokens.body().len()).rev() {
        if !(toks[i].is_operator('~') && toks[i + 1].is_symbol(None)) {
            continue;
        }
        let (summation, last) = parse_summation(toks, i, errors);
        tracing::debug!(
            counter = %summation.counter,
            ids = ?summation.ids,
            names = ?summation.names,
            "expanding summation"
        );
        let expanded = expand_counter_sum(&summation, config, screenings, errors);
        out = splice(&out, toks[i].start, toks[last].end, &expanded);
    }
    out
}

/// Parse the summation whose `~` is at `i`. Returns it with the index of
/// its last token.
fn parse_summation(toks: &[Token], i: usize, errors: &mut Vec<FormulaError>) -> (Summation, usize) {
    let counter = &toks[i + 1];
    let mut summation = Summation::new(&counter.text);
    if !toks[i + 2].is_operator('(') {
        summation.ids.extend(DEFAULT_SCREENING_IDS);
        return (summation, i + 1);
    }

    let mut state = ListState::Awaiting;
    let mut j = i + 3;
    loop {
        let tok = &toks[j];
        match tok.class {
            TokenClass::End => {
                errors.push(FormulaError::summation(format!(
                    "Unterminated summation range for {}.",
                    summation.counter
                )));
                return (summation, j - 1);
            }
            TokenClass::Number => {
                let Ok(n) = tok.text.parse::<i64>() else {
                    errors.push(FormulaError::summation(format!(
                        "Invalid screening id in summation range: {}",
                        tok.text
                    )));
                    j += 1;
                    continue;
                };
                state = match state {
                    ListState::Awaiting => ListState::Pending(n),
                    ListState::RangeEnd(start) => {
                        if n < start {
                            errors.push(FormulaError::summation(format!(
                                "Reversed summation range: {}-{}",
                                start, n
                            )));
                        } else if n - start >= MAX_RANGE_IDS {
                            errors.push(FormulaError::summation(format!(
                                "Summation range {}-{} exceeds {} ids.",
                                start, n, MAX_RANGE_IDS
                            )));
                        } else {
                            summation.ids.extend(start..=n);
                        }
                        ListState::Awaiting
                    }
                    pending @ ListState::Pending(_) => {
                        errors.push(FormulaError::summation(
                            "Two consecutive numbers seen in summation range",
                        ));
                        pending
                    }
                };
            }
            TokenClass::Operator if tok.is_operator('-') => {
                state = match state {
                    ListState::Pending(start) => ListState::RangeEnd(start),
                    other => {
                        errors.push(FormulaError::summation(
                            "Unexpected operator in summation range.",
                        ));
                        other
                    }
                };
            }
            TokenClass::Operator if tok.is_operator(',') => {
                state = match state {
                    ListState::Pending(n) => {
                        summation.ids.insert(n);
                        ListState::Awaiting
                    }
                    ListState::Awaiting => ListState::Awaiting,
                    range @ ListState::RangeEnd(_) => {
                        errors.push(FormulaError::summation(
                            "In summation range: expecting number, got a comma instead.",
                        ));
                        range
                    }
                };
            }
            TokenClass::Operator if tok.is_operator(')') => {
                match state {
                    ListState::Pending(n) => {
                        summation.ids.insert(n);
                    }
                    ListState::RangeEnd(_) => errors.push(FormulaError::summation(
                        "In summation range: expecting number, got a closing paren instead.",
                    )),
                    ListState::Awaiting => {}
                }
                return (summation, j);
            }
            TokenClass::Operator => errors.push(FormulaError::summation(
                "Unexpected operator in summation range.",
            )),
            TokenClass::Symbol => summation.add_name(&tok.text),
            TokenClass::Variable | TokenClass::Error => errors.push(FormulaError::summation(
                "Unexpected syntax in summation range.",
            )),
        }
        j += 1;
    }
}

/// Expansion text for one summation: `(C.a+C.b)`, or empty when nothing
/// could be resolved.
pub fn expand_counter_sum(
    summation: &Summation,
    config: &ParserConfig,
    screenings: Option<&dyn ScreeningRegistry>,
    errors: &mut Vec<FormulaError>,
) -> String {
    let Some(registry) = screenings else {
        errors.push(FormulaError::summation(
            "PM SRS is not set - can not expand summation.",
        ));
        return String::new();
    };

    let version = match &config.version {
        VersionPolicy::Latest => registry.list_versions(&config.release).into_iter().next(),
        VersionPolicy::Pinned(v) => Some(v.clone()),
        VersionPolicy::Unversioned => None,
    };
    let rows = registry.query(&summation.counter, &config.release, version.as_deref());
    if rows.is_empty() {
        errors.push(FormulaError::summation(format!(
            "{} not in PM SRS for release {}.",
            summation.counter, config.release
        )));
        return String::new();
    }

    let mut terms = Vec::new();
    let mut found_ids = BTreeSet::new();
    let mut found_names = BTreeSet::new();
    for row in &rows {
        let by_id = summation.ids.contains(&row.screening_id);
        let by_name = summation.names.contains(&row.screening_suffix);
        if by_id {
            found_ids.insert(row.screening_id);
        }
        if by_name {
            found_names.insert(row.screening_suffix.as_str());
        }
        if by_id || by_name {
            terms.push(format!("{}.{}", summation.counter, row.screening_suffix));
        }
    }

    let missing_ids: Vec<String> = summation
        .ids
        .difference(&found_ids)
        .map(i64::to_string)
        .collect();
    if !missing_ids.is_empty() {
        errors.push(FormulaError::summation(format!(
            "Invalid Screening IDs found: {}",
            missing_ids.join(", ")
        )));
    }
    let missing_names: Vec<&str> = summation
        .names
        .iter()
        .map(String::as_str)
        .filter(|n| !found_names.contains(n))
        .collect();
    if !missing_names.is_empty() {
        errors.push(FormulaError::summation(format!(
            "Invalid Screening Names found: {}",
            missing_names.join(", ")
        )));
    }

    if terms.is_empty() {
        String::new()
    } else {
        format!("({})", terms.join("+"))
    }
}
