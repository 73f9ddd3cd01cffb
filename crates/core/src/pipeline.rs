//! Formula pipeline: document -> expanded formula + symbol table.
//!
//! This is a thin orchestrator that calls each pass module in order. Every
//! pass takes source text and returns rewritten source text; tokens are
//! re-derived by the lexer after each rewrite because splicing invalidates
//! their offsets.
//!
//! Problems are recorded on the [`ParseResult`] and the run carries on with
//! best-effort text, so a result is always produced.

use crate::config::ParserConfig;
use crate::error::{FormulaError, Severity};
use crate::lexer::{self, TokenStream};
use crate::pass0_locate::{self, Located, STATUS_INITIAL};
use crate::pass1_references::{self, ResolutionContext};
use crate::pass2_variables::{self, VariableTable, VariableValues};
use crate::pass3_summation;
use crate::registry::Registries;
use crate::symbols::{self, SymbolTable};
use serde::Serialize;

/// Number of source-rewriting passes (0 = cleaned source, 1-3 = rewrites).
pub const PASS_COUNT: usize = 4;

/// Everything one run produced. Fields a run never reached stay empty.
#[derive(Debug, Clone)]
pub struct ParseResult {
    status: String,
    severity: Severity,
    errors: Vec<FormulaError>,
    raw_formula: String,
    cleaned_formula: String,
    passes: [String; PASS_COUNT],
    variables: VariableTable,
    variable_values: VariableValues,
    symbols: SymbolTable,
}

impl Default for ParseResult {
    fn default() -> Self {
        ParseResult {
            status: STATUS_INITIAL.to_string(),
            severity: Severity::Normal,
            errors: Vec::new(),
            raw_formula: String::new(),
            cleaned_formula: String::new(),
            passes: Default::default(),
            variables: VariableTable::default(),
            variable_values: VariableValues::default(),
            symbols: SymbolTable::default(),
        }
    }
}

impl ParseResult {
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn errors(&self) -> &[FormulaError] {
        &self.errors
    }

    /// All error messages, one per line.
    pub fn error_message(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// A formula block was found and nothing escalated the run to `Error`.
    pub fn found(&self) -> bool {
        self.severity != Severity::Error && !self.raw_formula.is_empty()
    }

    /// Text between `BEGIN` and `END`, trimmed.
    pub fn raw_formula(&self) -> &str {
        &self.raw_formula
    }

    pub fn cleaned_formula(&self) -> &str {
        &self.cleaned_formula
    }

    /// The cleaned formula with the summation glyph restored.
    pub fn formula(&self) -> String {
        pass0_locate::display_formula(&self.cleaned_formula)
    }

    /// Source after the last pass.
    pub fn expanded_source(&self) -> &str {
        &self.passes[PASS_COUNT - 1]
    }

    pub fn pass_source(&self, pass: usize) -> Option<&str> {
        self.passes.get(pass).map(String::as_str)
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    pub fn variable_values(&self) -> &VariableValues {
        &self.variable_values
    }

    /// Value text of `name` with the other variables substituted into it.
    pub fn variable_source(&self, name: &str) -> String {
        self.variable_values
            .resolved(name)
            .unwrap_or_else(|| format!("ERROR_Variable_NotFound_{}", name))
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.names().map(str::to_owned).collect()
    }

    /// Human-readable summary of where the formula came from.
    pub fn report(&self) -> String {
        let mut m = String::new();
        if self.severity == Severity::Error {
            m.push_str("ERROR: ");
        }
        m.push_str(&format!("Status: {}\n", self.status));
        if !self.raw_formula.is_empty() {
            m.push_str(&format!("Formula Source:\n{}\n(end)\n", self.raw_formula));
            m.push_str(&format!("Cleaned Formula:\n{}\n(end)\n", self.cleaned_formula));
        }
        m
    }

    /// Serializable snapshot of the run.
    pub fn outcome(&self) -> ParseOutcome {
        ParseOutcome {
            status: self.status.clone(),
            severity: self.severity,
            found: self.found(),
            errors: self.errors.clone(),
            raw: self.raw_formula.clone(),
            cleaned: self.cleaned_formula.clone(),
            expanded: self.expanded_source().to_string(),
            passes: self.passes.to_vec(),
            variables: self
                .variable_values
                .iter()
                .map(|(name, value)| VariableOutcome {
                    name: name.to_string(),
                    value: value.to_string(),
                    resolved: self.variable_source(name),
                })
                .collect(),
            symbols: self.symbol_names(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutcome {
    pub status: String,
    pub severity: Severity,
    pub found: bool,
    pub errors: Vec<FormulaError>,
    pub raw: String,
    pub cleaned: String,
    pub expanded: String,
    pub passes: Vec<String>,
    pub variables: Vec<VariableOutcome>,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableOutcome {
    pub name: String,
    pub value: String,
    pub resolved: String,
}

/// Run the whole pipeline over `document`.
pub fn parse(document: &str, config: &ParserConfig, registries: Registries<'_>) -> ParseResult {
    let mut ctx = ResolutionContext::new();
    parse_with_context(document, config, registries, &mut ctx)
}

/// Mutable state of one run.
struct Run<'c> {
    config: &'c ParserConfig,
    result: ParseResult,
}

impl<'c> Run<'c> {
    fn record(&mut self, error: FormulaError) {
        self.result.severity = self.result.severity.max(error.severity(self.config.relaxed));
        tracing::warn!(kind = ?error.kind, pass = error.pass, "{}", error.message);
        self.config.observer.on_error(&error);
        self.result.errors.push(error);
    }

    fn record_all(&mut self, errors: Vec<FormulaError>) {
        for e in errors {
            self.record(e);
        }
    }

    fn lex(&mut self, src: &str, pass: u8) -> TokenStream {
        let lexed = lexer::lex(src, self.config.relaxed);
        tracing::debug!(pass, tokens = lexed.tokens.body().len(), "lexed");
        for message in lexed.errors {
            self.record(FormulaError::lexical(pass, message));
        }
        lexed.tokens
    }

    fn finish_pass(&mut self, pass: u8, src: String) {
        tracing::debug!(pass, source = %src, "pass complete");
        self.config.observer.on_pass(pass, &src);
        self.result.passes[usize::from(pass)] = src;
    }
}

/// Run the pipeline with `ctx` holding the KPIs already being resolved
/// further up the call chain.
pub(crate) fn parse_with_context(
    document: &str,
    config: &ParserConfig,
    registries: Registries<'_>,
    ctx: &mut ResolutionContext,
) -> ParseResult {
    let _span = tracing::debug_span!("parse", start_phrase = %config.start_phrase).entered();
    let mut run = Run {
        config,
        result: ParseResult::default(),
    };

    let document = pass0_locate::normalize_document(document);
    let located = pass0_locate::locate(&document, &config.start_phrase);
    run.result.status = located.status().to_string();
    let raw = match located {
        Located::Formula(raw) => raw,
        Located::NoStartPhrase => {
            tracing::debug!("no start phrase");
            return run.result;
        }
        Located::Malformed(status) => {
            run.record(FormulaError::structural(status));
            return run.result;
        }
    };

    // Pass 0: clean and lex
    let cleaned = pass0_locate::clean(&raw, config.encoding);
    run.result.raw_formula = raw;
    run.result.cleaned_formula = cleaned.text.clone();
    run.record_all(cleaned.errors);
    let src0 = cleaned.text;
    let tokens0 = run.lex(&src0, 0);
    run.finish_pass(0, src0.clone());

    // Pass 1: Formula:// references
    let (src1, tokens1) = if pass1_references::contains_references(&src0) {
        let mut errors = Vec::new();
        let src1 =
            pass1_references::substitute_references(&src0, &tokens0, &mut errors, |r, errs| {
                pass1_references::resolve_reference(r, config, registries, ctx, errs)
            });
        run.record_all(errors);
        let tokens1 = run.lex(&src1, 1);
        (src1, tokens1)
    } else {
        (src0, tokens0)
    };
    run.finish_pass(1, src1.clone());

    // Pass 2: variables
    let mut errors = Vec::new();
    let variables = pass2_variables::extract_assignments(&tokens1, &mut errors);
    let substituted = pass2_variables::substitute_variables(&src1, &variables, &mut errors);
    run.record_all(errors);
    run.result.variables = variables;
    run.result.variable_values = substituted.values;
    let src2 = substituted.text;
    let tokens2 = run.lex(&src2, 2);
    run.finish_pass(2, src2.clone());

    // Pass 3: summations
    let mut errors = Vec::new();
    let src3 =
        pass3_summation::expand_summations(&src2, &tokens2, config, registries.screenings, &mut errors);
    run.record_all(errors);
    let tokens3 = run.lex(&src3, 3);
    run.finish_pass(3, src3);

    // Symbol table
    let mut errors = Vec::new();
    run.result.symbols = symbols::build_symbol_table(&tokens3, &mut errors);
    run.record_all(errors);

    tracing::debug!(
        severity = ?run.result.severity,
        errors = run.result.errors.len(),
        symbols = run.result.symbols.len(),
        "parse complete"
    );
    run.result
}
