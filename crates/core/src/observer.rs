//! Diagnostics observer injected into a run.
//!
//! Every error a pipeline records and every pass output it produces is
//! reported to the configured [`ParseObserver`], including those of nested
//! pipelines started for `Formula://` references.

use crate::error::FormulaError;
use std::sync::Mutex;

pub trait ParseObserver: Send + Sync {
    fn on_error(&self, _error: &FormulaError) {}

    /// `pass` is 0 for the cleaned source and 1-3 for the rewritten source of
    /// each pass.
    fn on_pass(&self, _pass: u8, _source: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl ParseObserver for NoopObserver {}

/// Observer that keeps everything it is told, in order.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    errors: Mutex<Vec<FormulaError>>,
    passes: Mutex<Vec<(u8, String)>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<FormulaError> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn passes(&self) -> Vec<(u8, String)> {
        self.passes.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl ParseObserver for CollectingObserver {
    fn on_error(&self, error: &FormulaError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error.clone());
        }
    }

    fn on_pass(&self, pass: u8, source: &str) {
        if let Ok(mut passes) = self.passes.lock() {
            passes.push((pass, source.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_observer_keeps_order() {
        let obs = CollectingObserver::new();
        obs.on_pass(0, "a");
        obs.on_error(&FormulaError::summation("first"));
        obs.on_pass(1, "b");
        obs.on_error(&FormulaError::summation("second"));
        assert_eq!(obs.passes(), vec![(0, "a".to_string()), (1, "b".to_string())]);
        let msgs: Vec<String> = obs.errors().into_iter().map(|e| e.message).collect();
        assert_eq!(msgs, vec!["first", "second"]);
    }
}
