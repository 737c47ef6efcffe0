//! Inference contexts
//!
//! A [`Context`] is an immutable snapshot of the facts, rules and constraint
//! declarations an inference runs against. Strategies only read from it, so
//! one snapshot can be shared across worker threads behind an `Arc`.
//!
//! The [`KnowledgeStore`] trait is the seam to external storage: the engine
//! ships [`MemoryStore`], and callers with their own fact base implement the
//! trait and snapshot into a `Context` before submitting goals.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{InferError, Result};
use crate::term::{parse_term, SimpleTypeSystem, Term, TypeSystem};
use crate::unify::{match_term, Substitution};

/// Immutable snapshot of premises for one inference run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    /// Ground and quantified facts
    facts: Vec<Term>,
    /// Implication rules (kept separate so Horn-oriented strategies can
    /// pick them out without re-classifying)
    rules: Vec<Term>,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    /// Build a context from already-validated formulas
    pub fn from_premises(premises: Vec<Term>) -> Self {
        let mut ctx = Context::new();
        for p in premises {
            ctx.add(p);
        }
        ctx
    }

    /// Parse one formula per non-empty line; `#` starts a comment
    pub fn parse(text: &str) -> Result<Self> {
        let mut ctx = Context::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let term = parse_term(line).map_err(|e| {
                InferError::parse(format!("line {}: {}", lineno + 1, e.message))
            })?;
            ctx.add(term);
        }
        Ok(ctx)
    }

    fn add(&mut self, premise: Term) {
        if is_rule(&premise) {
            self.rules.push(premise);
        } else {
            self.facts.push(premise);
        }
    }

    /// All facts in insertion order
    pub fn facts(&self) -> &[Term] {
        &self.facts
    }

    /// All rules in insertion order
    pub fn rules(&self) -> &[Term] {
        &self.rules
    }

    /// Facts and rules together
    pub fn premises(&self) -> impl Iterator<Item = &Term> {
        self.facts.iter().chain(self.rules.iter())
    }

    pub fn len(&self) -> usize {
        self.facts.len() + self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.rules.is_empty()
    }

    /// Validate every premise against a type system
    pub fn validate(&self, types: &dyn TypeSystem) -> Result<()> {
        for premise in self.premises() {
            premise.validate(types)?;
        }
        Ok(())
    }

    /// Facts matching a pattern by one-way matching
    pub fn matching_facts(&self, pattern: &Term) -> Vec<(Term, Substitution)> {
        let types = SimpleTypeSystem;
        self.facts
            .iter()
            .filter_map(|fact| match_term(pattern, fact, &types).map(|s| (fact.clone(), s)))
            .collect()
    }
}

/// A rule is an implication, possibly under outer universal quantifiers
fn is_rule(term: &Term) -> bool {
    match term {
        Term::Connective(crate::term::ConnectiveKind::Implies, _) => true,
        Term::Quantifier(_, _, body) => is_rule(body),
        _ => false,
    }
}

// ============================================================================
// Storage seam
// ============================================================================

/// Interface to the caller's fact base
///
/// The coordinator snapshots a store into a [`Context`] once per goal, so
/// store mutations during a run never reach a live inference.
pub trait KnowledgeStore: Send + Sync {
    /// All premises currently held
    fn premises(&self) -> Vec<Term>;

    /// Premises whose head could match the pattern; the default scans all
    fn retrieve(&self, _pattern: &Term) -> Vec<Term> {
        self.premises()
    }

    /// Take an immutable snapshot for one inference run
    fn snapshot(&self) -> Context {
        Context::from_premises(self.premises())
    }
}

/// In-memory store backed by a plain vector
#[derive(Debug, Default)]
pub struct MemoryStore {
    premises: Vec<Term>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn assert(&mut self, premise: Term) {
        self.premises.push(premise);
    }
}

impl KnowledgeStore for MemoryStore {
    fn premises(&self) -> Vec<Term> {
        self.premises.clone()
    }
}

/// Shared handle used by concurrent dispatch
pub type SharedContext = Arc<Context>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_facts_and_rules() {
        let ctx = Context::parse(
            "# travel domain\n\
             At(john,office)\n\
             forall X. At(X,office) -> Reachable(X,lobby)\n",
        )
        .unwrap();
        assert_eq!(ctx.facts().len(), 1);
        assert_eq!(ctx.rules().len(), 1);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = Context::parse("P(a)\n(((").unwrap_err();
        assert!(err.message.contains("line 2"));
    }

    #[test]
    fn test_matching_facts() {
        let ctx = Context::parse("At(john,office)\nAt(mary,lobby)\n").unwrap();
        let pattern = parse_term("At(X,office)").unwrap();
        let matches = ctx.matching_facts(&pattern);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_store_snapshot_is_isolated() {
        let mut store = MemoryStore::new();
        store.assert(parse_term("P(a)").unwrap());
        let snap = store.snapshot();
        store.assert(parse_term("Q(b)").unwrap());
        assert_eq!(snap.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }
}
