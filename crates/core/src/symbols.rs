//! Symbol table built from the fully expanded token stream.

use crate::error::FormulaError;
use crate::lexer::{Token, TokenClass, TokenStream};
use indexmap::IndexMap;

/// Every symbol name in the expanded formula. Names iterate in first-seen
/// order; the token kept for a name is its last occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    tokens: IndexMap<String, Token>,
}

impl SymbolTable {
    pub fn get(&self, name: &str) -> Option<&Token> {
        self.tokens.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tokens.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tokens.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn insert(&mut self, token: &Token) {
        self.tokens.insert(token.text.clone(), token.clone());
    }
}

/// Record every symbol in `tokens`. Any variable still present was never
/// substituted and is reported.
pub fn build_symbol_table(tokens: &TokenStream, errors: &mut Vec<FormulaError>) -> SymbolTable {
    let mut table = SymbolTable::default();
    for token in tokens.body() {
        match token.class {
            TokenClass::Variable => errors.push(FormulaError::variable(
                4,
                format!("Variable not defined ({})", token.text),
            )),
            TokenClass::Symbol => table.insert(token),
            _ => {}
        }
    }
    table
}
