//! formex-core: counter formula extraction and expansion.
//!
//! Pulls the formula block out of a KPI document and rewrites it through a
//! four-pass pipeline into a self-contained expression:
//!
//! 0. locate `BEGIN`/`END`, clean, lex
//! 1. inline `Formula://EnbCounterMethod/<kpi>` references (recursively)
//! 2. substitute `$variable = ...` assignments
//! 3. expand `~Counter(ids)` summations against the screening registry
//!
//! followed by a symbol table over the final tokens.
//!
//! # Public API
//!
//! - [`parse()`] -- run the whole pipeline over a document
//! - [`ParseResult`] / [`ParseOutcome`] -- what a run produced
//! - [`ParserConfig`] -- start phrase, lexer mode, registry release/version
//! - [`Registries`], [`KpiRegistry`], [`ScreeningRegistry`] -- lookups the
//!   pipeline consults, with in-memory implementations
//! - [`lex()`] -- the lexer on its own
//! - [`expand_kpi()`] -- expand a registry KPI directly

pub mod config;
pub mod error;
pub mod lexer;
pub mod observer;
pub mod pass0_locate;
pub mod pass1_references;
pub mod pass2_variables;
pub mod pass3_summation;
pub mod pipeline;
pub mod registry;
pub mod symbols;

// ── Convenience re-exports: key types ────────────────────────────────

pub use config::{ParserConfig, TargetEncoding, VersionPolicy, COUNTER_METHOD_PHRASE};
pub use error::{ErrorKind, FormulaError, RegistryError, Severity};
pub use lexer::{Lexed, Token, TokenClass, TokenStream};
pub use observer::{CollectingObserver, NoopObserver, ParseObserver};
pub use pipeline::{ParseOutcome, ParseResult, VariableOutcome};
pub use registry::{
    CounterScreening, InMemoryKpiRegistry, InMemoryScreeningRegistry, KpiRecord, KpiRegistry,
    Registries, ScreeningRegistry, ScreeningRow,
};
pub use symbols::SymbolTable;

// ── Convenience re-exports: entry points ─────────────────────────────

pub use lexer::lex;
pub use pass0_locate::{clean, locate};
pub use pass1_references::{expand_kpi, KpiExpansion};
pub use pipeline::parse;
