//! Memoizes parsed expressions by their source text.

use crate::ast::Expression;
use crate::error::XPathError;
use crate::parser::parse_expression;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// An append-only map from expression text to its parsed tree.
///
/// Failed parses are not stored. Two threads racing on the same text may both
/// parse it; the first insert wins and both receive the stored tree.
#[derive(Debug, Default)]
pub struct ExpressionCache {
    entries: RwLock<HashMap<String, Arc<Expression>>>,
}

static GLOBAL: Lazy<ExpressionCache> = Lazy::new(ExpressionCache::new);

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by the crate-level entry points.
    pub fn global() -> &'static ExpressionCache {
        &GLOBAL
    }

    pub fn get_or_parse(&self, text: &str) -> Result<Arc<Expression>, XPathError> {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(expr) = entries.get(text) {
                log::debug!("expression cache hit for '{}'", text);
                return Ok(Arc::clone(expr));
            }
        }
        log::debug!("expression cache miss for '{}'", text);
        let parsed = Arc::new(parse_expression(text)?);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(entries.entry(text.to_string()).or_insert(parsed)))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_text_returns_same_tree() {
        let cache = ExpressionCache::new();
        let first = cache.get_or_parse("count(//a) + 1").unwrap();
        let second = cache.get_or_parse("count(//a) + 1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = ExpressionCache::new();
        assert!(cache.get_or_parse("//[").is_err());
        assert!(cache.is_empty());
        cache.get_or_parse("a").unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
