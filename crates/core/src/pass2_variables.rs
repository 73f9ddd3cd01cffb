//! Pass 2: extract `$name = ...` assignments and substitute them.
//!
//! Assignments sit at the tail of a formula. Each one runs from its `$name =`
//! up to the next `$other =` or the end of input. The source is cut at the
//! first assignment, then every variable's literal value text replaces each
//! occurrence of its name, in the order the variables were defined.
//!
//! Substitution works on the running text, so a value may mention variables
//! defined *after* it (those are replaced later in the same sweep) but not
//! ones defined before it: by the time such a value is spliced in, the
//! earlier name has already been swept and the reference survives into the
//! final token stream, where it is reported as undefined.

use crate::error::FormulaError;
use crate::lexer::{slice_chars, Token, TokenStream};
use indexmap::IndexMap;
use serde::Serialize;

/// Shortest acceptable variable name, sigil included.
const MIN_NAME_LEN: usize = 2;

/// One assignment: `[name, '=', value...]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDef {
    pub name: String,
    pub tokens: Vec<Token>,
}

impl VariableDef {
    pub fn name_token(&self) -> &Token {
        &self.tokens[0]
    }

    pub fn value_tokens(&self) -> &[Token] {
        &self.tokens[2..]
    }
}

/// Assignments in first-definition order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VariableTable {
    defs: IndexMap<String, VariableDef>,
}

impl VariableTable {
    pub fn get(&self, name: &str) -> Option<&VariableDef> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableDef> {
        self.defs.values()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }
}

/// Literal value text per variable, in definition order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VariableValues {
    entries: IndexMap<String, String>,
}

impl VariableValues {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of `name` with every variable name in it replaced by that
    /// variable's value (one sweep, in definition order).
    pub fn resolved(&self, name: &str) -> Option<String> {
        let mut text = self.get(name)?.to_string();
        for (other, value) in &self.entries {
            text = text.replace(other.as_str(), value);
        }
        Some(text)
    }
}

/// Collect the assignments in `tokens`.
pub fn extract_assignments(tokens: &TokenStream, errors: &mut Vec<FormulaError>) -> VariableTable {
    let toks = tokens.body();
    let mut table = VariableTable::default();
    let mut i = 0;
    while i < toks.len() {
        if !toks[i].is_operator('=') {
            i += 1;
            continue;
        }
        if i == 0 {
            errors.push(FormulaError::variable(
                2,
                "Assignment operator can not be first token.",
            ));
            i += 1;
            continue;
        }
        let name_token = &toks[i - 1];
        if !name_token.is_variable() {
            errors.push(FormulaError::variable(
                2,
                "Assignment operator can only occur after a variable.",
            ));
            i += 1;
            continue;
        }
        let name = name_token.text.clone();
        if name.chars().count() < MIN_NAME_LEN {
            errors.push(FormulaError::variable(
                2,
                format!("Variable name is too short: {}", name),
            ));
            i += 1;
            continue;
        }
        if table.contains(&name) {
            errors.push(FormulaError::variable(
                2,
                format!("Multiple definitions of variable {} detected.", name),
            ));
            i += 1;
            continue;
        }

        let mut def = vec![name_token.clone(), toks[i].clone()];
        i += 1;
        while i < toks.len() && !starts_assignment(toks, i) {
            def.push(toks[i].clone());
            i += 1;
        }
        tracing::debug!(variable = %name, tokens = def.len() - 2, "extracted assignment");
        table
            .defs
            .insert(name.clone(), VariableDef { name, tokens: def });
    }
    table
}

fn starts_assignment(toks: &[Token], i: usize) -> bool {
    toks[i].is_variable() && toks.get(i + 1).is_some_and(|t| t.is_operator('='))
}

/// Source after substitution plus the value text recorded per variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substituted {
    pub text: String,
    pub values: VariableValues,
}

/// Cut the assignments off `src` and substitute their values.
pub fn substitute_variables(
    src: &str,
    table: &VariableTable,
    errors: &mut Vec<FormulaError>,
) -> Substituted {
    let Some(first) = table.defs.values().next() else {
        return Substituted {
            text: src.to_string(),
            values: VariableValues::default(),
        };
    };

    let mut values = VariableValues::default();
    for def in table.defs.values() {
        let value = match (def.value_tokens().first(), def.value_tokens().last()) {
            (Some(head), Some(tail)) => slice_chars(src, head.start, tail.end),
            _ => {
                errors.push(FormulaError::variable(
                    2,
                    format!("Variable {} has no value.", def.name),
                ));
                String::new()
            }
        };
        values.entries.insert(def.name.clone(), value);
    }

    let cut = first.name_token().start;
    let mut text: String = src.chars().take(cut).collect();
    text.truncate(text.trim_end().len());
    for (name, value) in &values.entries {
        text = text.replace(name.as_str(), value);
    }
    Substituted { text, values }
}
