//! Pass 1: inline `Formula://EnbCounterMethod/<kpi>[/<$var>])` references.
//!
//! Each reference is resolved by running a complete nested pipeline over the
//! referenced KPI's own formula document and splicing its expanded source
//! (or one of its variables) over the reference. Tokens are scanned from the
//! end so a splice never moves a reference that is still to be matched.
//!
//! A [`ResolutionContext`] tracks the KPIs being resolved on the current
//! call chain; a reference back into that chain is reported and replaced by
//! a placeholder instead of recursing forever.

use crate::config::ParserConfig;
use crate::error::FormulaError;
use crate::lexer::{splice, Token, TokenStream};
use crate::pipeline::{self, ParseResult};
use crate::registry::Registries;
use std::collections::HashSet;

pub const REFERENCE_SCHEME: &str = "Formula://";
const REFERENCE_HEAD: &str = "Formula";
const REFERENCE_KIND: &str = "EnbCounterMethod";

/// A parsed `Formula://` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kpi_id: String,
    /// Variable name including its sigil, when the reference names one.
    pub variable: Option<String>,
}

impl Reference {
    /// Text substituted when the reference cannot be resolved.
    pub fn placeholder(&self) -> String {
        format!(
            "Formula_for_KPI_{}_{}",
            self.kpi_id,
            self.variable.as_deref().unwrap_or("")
        )
    }
}

/// KPI ids on the current resolution chain.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    stack: Vec<String>,
    // Parallel set for O(1) membership; `stack` keeps the order for messages.
    on_stack: HashSet<String>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, kpi_id: &str) -> bool {
        self.on_stack.contains(kpi_id)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn push(&mut self, kpi_id: &str) {
        self.stack.push(kpi_id.to_string());
        self.on_stack.insert(kpi_id.to_string());
    }

    fn pop(&mut self) {
        if let Some(id) = self.stack.pop() {
            self.on_stack.remove(&id);
        }
    }

    fn chain_to(&self, kpi_id: &str) -> String {
        let mut chain: Vec<&str> = self.stack.iter().map(String::as_str).collect();
        chain.push(kpi_id);
        chain.join(" \u{2192} ")
    }
}

/// Whether `src` mentions a reference at all (case-insensitive).
pub fn contains_references(src: &str) -> bool {
    src.to_ascii_lowercase()
        .contains(&REFERENCE_SCHEME.to_ascii_lowercase())
}

/// Replace every well-formed reference in `src` with the text `resolve`
/// returns for it. Malformed references are reported and left in place.
pub fn substitute_references<F>(
    src: &str,
    tokens: &TokenStream,
    errors: &mut Vec<FormulaError>,
    mut resolve: F,
) -> String
where
    F: FnMut(&Reference, &mut Vec<FormulaError>) -> String,
{
    let toks = tokens.tokens();
    let mut out = src.to_string();
    for i in (0..tokens.body().len()).rev() {
        if !is_reference_head(toks, i) {
            continue;
        }
        match parse_reference(toks, i) {
            Ok((reference, last)) => {
                tracing::debug!(
                    kpi_id = %reference.kpi_id,
                    variable = ?reference.variable,
                    "resolving reference"
                );
                let text = resolve(&reference, errors);
                out = splice(&out, toks[i].start, toks[last].end, &text);
            }
            Err(message) => errors.push(FormulaError::reference(message)),
        }
    }
    out
}

fn is_reference_head(toks: &[Token], i: usize) -> bool {
    toks[i].is_symbol(Some(REFERENCE_HEAD))
        && op_at(toks, i + 1, ':')
        && op_at(toks, i + 2, '/')
        && op_at(toks, i + 3, '/')
}

fn op_at(toks: &[Token], i: usize, op: char) -> bool {
    toks.get(i).is_some_and(|t| t.is_operator(op))
}

/// Parse the reference whose `Formula` token is at `i`. Returns the
/// reference and the index of its last token before the closing paren; the
/// paren itself belongs to the surrounding text.
fn parse_reference(toks: &[Token], i: usize) -> Result<(Reference, usize), String> {
    let kind = i + 4;
    match toks.get(kind) {
        Some(t) if t.is_symbol(Some(REFERENCE_KIND)) => {}
        other => {
            return Err(format!(
                "Unrecognized Formula type: {}",
                other.map(|t| t.text.as_str()).unwrap_or("")
            ))
        }
    }
    if !op_at(toks, kind + 1, '/') {
        return Err(format!("Expected slash after {}{}", REFERENCE_SCHEME, REFERENCE_KIND));
    }
    let id = kind + 2;
    let kpi_id = match toks.get(id) {
        Some(t) if t.is_symbol(None) => t.text.clone(),
        _ => {
            return Err(format!(
                "Expected KPI ID after {}{}/",
                REFERENCE_SCHEME, REFERENCE_KIND
            ))
        }
    };

    if op_at(toks, id + 1, ')') {
        return Ok((
            Reference {
                kpi_id,
                variable: None,
            },
            id,
        ));
    }
    if !op_at(toks, id + 1, '/') {
        return Err("Expected closing paren in Formula reference".to_string());
    }
    let var = id + 2;
    let variable = match toks.get(var) {
        Some(t) if t.is_variable() => t.text.clone(),
        _ => return Err("Expected variable name at end of Formula reference".to_string()),
    };
    if !op_at(toks, var + 1, ')') {
        return Err("Expected closing paren in Formula reference".to_string());
    }
    Ok((
        Reference {
            kpi_id,
            variable: Some(variable),
        },
        var,
    ))
}

/// Resolve one reference by running a nested pipeline over the referenced
/// KPI's formula document.
pub(crate) fn resolve_reference(
    reference: &Reference,
    config: &ParserConfig,
    registries: Registries<'_>,
    ctx: &mut ResolutionContext,
    errors: &mut Vec<FormulaError>,
) -> String {
    let kpi_id = reference.kpi_id.as_str();
    if ctx.contains(kpi_id) {
        errors.push(FormulaError::reference(format!(
            "Cyclic Formula reference: {}",
            ctx.chain_to(kpi_id)
        )));
        return reference.placeholder();
    }
    let Some(record) = registries.lookup_kpi(kpi_id) else {
        errors.push(FormulaError::reference(format!(
            "Could not resolve KPI_ID in Formula reference: {}",
            kpi_id
        )));
        return reference.placeholder();
    };

    let nested = {
        let _span = tracing::debug_span!("kpi", kpi_id, depth = ctx.depth() + 1).entered();
        ctx.push(kpi_id);
        let nested =
            pipeline::parse_with_context(&record.raw_formula, &config.nested(), registries, ctx);
        ctx.pop();
        nested
    };

    if nested.raw_formula().is_empty() {
        errors.push(FormulaError::reference(format!(
            "Referenced formula {} has no usable formula block: {}",
            kpi_id,
            nested.status()
        )));
        return reference.placeholder();
    }
    if !nested.errors().is_empty() {
        errors.push(FormulaError::reference(format!(
            "Referenced formula {} has errors.",
            kpi_id
        )));
    }
    referenced_text(&nested, reference)
}

fn referenced_text(nested: &ParseResult, reference: &Reference) -> String {
    match &reference.variable {
        Some(name) => nested.variable_source(name),
        None => nested.expanded_source().to_string(),
    }
}

/// Expanded text of a registry KPI (or one of its variables), with every
/// error recorded along the way.
#[derive(Debug, Clone)]
pub struct KpiExpansion {
    pub text: String,
    pub errors: Vec<FormulaError>,
}

/// Expand a KPI straight from the registry, exactly as a reference to it
/// would be expanded.
pub fn expand_kpi(
    kpi_id: &str,
    variable: Option<&str>,
    config: &ParserConfig,
    registries: Registries<'_>,
) -> KpiExpansion {
    let reference = Reference {
        kpi_id: kpi_id.to_string(),
        variable: variable.map(str::to_owned),
    };
    let mut errors = Vec::new();
    let mut ctx = ResolutionContext::new();
    let text = resolve_reference(&reference, config, registries, &mut ctx, &mut errors);
    for e in &errors {
        config.observer.on_error(e);
    }
    KpiExpansion { text, errors }
}
