//! Proof strategies
//!
//! Four strategies ship with the engine:
//!
//! - [`ResolutionProver`] - given-clause saturation over CNF (first order)
//! - [`ModalTableauProver`] - signed tableau with possible worlds (K/T/S4/S5)
//! - [`ClpProver`] - Horn resolution interleaved with finite-domain
//!   constraint propagation
//! - [`SmtStrategy`] - translation and delegation to an [`SmtBackend`]
//!
//! All of them implement [`Strategy`] and report through [`ProofObject`].
//! Budgets are enforced by each strategy at loop boundaries only, never
//! inside unification; cancellation rides the same checkpoints.

pub mod clause;
pub mod clp;
pub mod resolution;
pub mod saturation;
pub mod smt;
pub mod tableau;

pub use clause::{Clause, ClauseSet, Literal};
pub use clp::ClpProver;
pub use resolution::{factor_all, resolve_all};
pub use saturation::{ResolutionPolicy, ResolutionProver};
pub use smt::{BoundPropagationBackend, SmtBackend, SmtFormula, SmtOutcome, SmtStrategy};
pub use tableau::{ModalSystem, ModalTableauProver};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::Result;
use crate::proof::{ExhaustedResource, ProofObject};
use crate::term::Term;

/// Closed set of strategy kinds known to the coordinator
///
/// `Analogical` is reserved for an external peer strategy; nothing in this
/// crate registers an implementation for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    Resolution,
    ModalTableau,
    Clp,
    Smt,
    Analogical,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Resolution => "resolution",
            StrategyKind::ModalTableau => "modal-tableau",
            StrategyKind::Clp => "clp",
            StrategyKind::Smt => "smt",
            StrategyKind::Analogical => "analogical",
        }
    }
}

/// A proof strategy
///
/// Implementations must be safe to share across worker threads. `attempt`
/// returns an error only for internal failures (backend protocol breakage,
/// invariant violations); search failure and budget exhaustion are ordinary
/// [`ProofObject`] outcomes.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> StrategyKind;

    /// Whether this strategy can make sense of a goal with this shape
    fn supports(&self, profile: &GoalProfile) -> bool;

    /// Run the strategy against a goal under a budget
    fn attempt(&self, goal: &Term, context: &Context, meter: &BudgetMeter) -> Result<ProofObject>;
}

// ============================================================================
// Budgets
// ============================================================================

/// Resource limits for one strategy invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budget {
    /// Maximum clauses a saturation run may generate
    pub max_clauses: usize,
    /// Maximum tableau nodes
    pub max_nodes: usize,
    /// Maximum constraint propagation rounds
    pub max_propagations: usize,
    /// Wall-clock deadline in milliseconds, 0 disables
    pub deadline_ms: u64,
}

impl Default for Budget {
    fn default() -> Self {
        Budget {
            max_clauses: 100_000,
            max_nodes: 10_000,
            max_propagations: 100_000,
            deadline_ms: 60_000,
        }
    }
}

/// Running budget state shared with a strategy invocation
///
/// Strategies call one of the `check_*` methods at each loop boundary; a
/// `Some` return names the resource that ran out. The cancellation flag is
/// observed at the same checkpoints and nowhere else.
#[derive(Debug, Clone)]
pub struct BudgetMeter {
    budget: Budget,
    started: Instant,
    cancel: Arc<AtomicBool>,
}

impl BudgetMeter {
    pub fn new(budget: Budget) -> Self {
        BudgetMeter {
            budget,
            started: Instant::now(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Meter sharing a caller-owned cancellation flag
    pub fn with_cancel(budget: Budget, cancel: Arc<AtomicBool>) -> Self {
        BudgetMeter {
            budget,
            started: Instant::now(),
            cancel,
        }
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn check_common(&self) -> Option<ExhaustedResource> {
        if self.is_cancelled() {
            return Some(ExhaustedResource::Cancelled);
        }
        if self.budget.deadline_ms > 0
            && self.elapsed() >= Duration::from_millis(self.budget.deadline_ms)
        {
            return Some(ExhaustedResource::Time);
        }
        None
    }

    /// Checkpoint for saturation loops
    pub fn check_clauses(&self, generated: usize) -> Option<ExhaustedResource> {
        if generated >= self.budget.max_clauses {
            return Some(ExhaustedResource::Clauses);
        }
        self.check_common()
    }

    /// Checkpoint for tableau expansion loops
    pub fn check_nodes(&self, nodes: usize) -> Option<ExhaustedResource> {
        if nodes >= self.budget.max_nodes {
            return Some(ExhaustedResource::Nodes);
        }
        self.check_common()
    }

    /// Checkpoint for constraint propagation loops
    pub fn check_propagations(&self, rounds: usize) -> Option<ExhaustedResource> {
        if rounds >= self.budget.max_propagations {
            return Some(ExhaustedResource::Steps);
        }
        self.check_common()
    }
}

impl Default for BudgetMeter {
    fn default() -> Self {
        BudgetMeter::new(Budget::default())
    }
}

// ============================================================================
// Goal classification
// ============================================================================

/// Constraint predicates routed to the CLP constraint store
pub const CONSTRAINT_PREDICATES: &[&str] = &[
    "lt",
    "le",
    "gt",
    "ge",
    "eq",
    "neq",
    "in_range",
    "all_different",
    "sum",
];

/// Whether an atom is a recognized constraint predicate
pub fn is_constraint_atom(term: &Term) -> bool {
    match term {
        Term::Application(s, _) => CONSTRAINT_PREDICATES.contains(&s.name.as_str()),
        _ => false,
    }
}

/// Shape summary of a goal against its context, used for dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalProfile {
    /// No variables, quantifiers or modalities anywhere
    pub propositional: bool,
    /// Variables or quantifiers present
    pub first_order: bool,
    /// Modal operator present in goal or context
    pub modal: bool,
    /// Recognized constraint predicate present
    pub constrained: bool,
    /// Symbol count of the goal
    pub goal_size: usize,
    /// Premise count of the context
    pub context_size: usize,
}

impl GoalProfile {
    /// Classify a goal against its context
    pub fn classify(goal: &Term, context: &Context) -> Self {
        let mut modal = goal.has_modality();
        let mut first_order = goal.has_quantifier() || !goal.variables().is_empty();
        let mut constrained = has_constraint(goal);

        for premise in context.premises() {
            modal = modal || premise.has_modality();
            first_order =
                first_order || premise.has_quantifier() || !premise.variables().is_empty();
            constrained = constrained || has_constraint(premise);
        }

        GoalProfile {
            propositional: !first_order && !modal,
            first_order,
            modal,
            constrained,
            goal_size: goal.size(),
            context_size: context.len(),
        }
    }

    /// Stable signature for knowledge-base bucketing
    pub fn signature(&self) -> String {
        format!(
            "{}{}{}{}",
            if self.propositional { "p" } else { "-" },
            if self.first_order { "f" } else { "-" },
            if self.modal { "m" } else { "-" },
            if self.constrained { "c" } else { "-" },
        )
    }
}

fn has_constraint(term: &Term) -> bool {
    if is_constraint_atom(term) {
        return true;
    }
    match term {
        Term::Connective(_, args) => args.iter().any(has_constraint),
        Term::Quantifier(_, _, body) => has_constraint(body),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_meter_clause_limit() {
        let meter = BudgetMeter::new(Budget {
            max_clauses: 10,
            deadline_ms: 0,
            ..Budget::default()
        });
        assert!(meter.check_clauses(5).is_none());
        assert_eq!(meter.check_clauses(10), Some(ExhaustedResource::Clauses));
    }

    #[test]
    fn test_budget_meter_cancellation() {
        let meter = BudgetMeter::new(Budget {
            deadline_ms: 0,
            ..Budget::default()
        });
        assert!(meter.check_nodes(0).is_none());
        meter.cancel();
        assert_eq!(meter.check_nodes(0), Some(ExhaustedResource::Cancelled));
    }

    #[test]
    fn test_classify_propositional() {
        let goal = crate::term::parse_term("p -> q").unwrap();
        let ctx = Context::new();
        let profile = GoalProfile::classify(&goal, &ctx);
        assert!(profile.propositional);
        assert!(!profile.modal);
        assert!(!profile.first_order);
    }

    #[test]
    fn test_classify_modal_from_context() {
        let goal = crate::term::parse_term("p").unwrap();
        let ctx = Context::parse("[]p\n").unwrap();
        let profile = GoalProfile::classify(&goal, &ctx);
        assert!(profile.modal);
        assert!(!profile.propositional);
    }

    #[test]
    fn test_classify_constrained() {
        let goal = crate::term::parse_term("lt(X,5)").unwrap();
        let ctx = Context::new();
        let profile = GoalProfile::classify(&goal, &ctx);
        assert!(profile.constrained);
        assert!(profile.first_order);
    }

    #[test]
    fn test_signature_stable() {
        let goal = crate::term::parse_term("forall X. P(X)").unwrap();
        let ctx = Context::new();
        let profile = GoalProfile::classify(&goal, &ctx);
        assert_eq!(profile.signature(), "-f--");
    }
}
