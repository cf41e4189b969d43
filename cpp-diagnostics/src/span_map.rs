//! Span tracking without modifying AST nodes.
//!
//! Uses stable string IDs for AST nodes: the parser (out of scope here)
//! generates unique IDs when creating expressions/statements, and the
//! core looks up spans using those IDs when it needs to report a
//! diagnostic against a `source_token`.
use crate::Span;
use std::collections::HashMap;

/// Maps stable string IDs to their source spans.
#[derive(Debug, Default, Clone)]
pub struct SpanMap {
    spans: HashMap<String, Span>,
    next_id: usize,
}

impl SpanMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate_id(&mut self) -> String {
        let id = format!("span_{}", self.next_id);
        self.next_id += 1;
        id
    }

    pub fn record(&mut self, id: String, span: Span) {
        self.spans.insert(id, span);
    }

    pub fn get(&self, id: &str) -> Option<&Span> {
        self.spans.get(id)
    }

    pub fn get_or_unknown(&self, id: &str) -> Span {
        self.get(id).cloned().unwrap_or_else(Span::unknown)
    }

    pub fn clear(&mut self) {
        self.spans.clear();
        self.next_id = 0;
    }

    pub fn stats(&self) -> usize {
        self.spans.len()
    }
}
