//! Proof objects
//!
//! Every strategy reports its result as a [`ProofObject`]: the goal, an
//! [`Outcome`], and an index-addressed list of [`ProofStep`]s whose
//! justifications reference earlier steps only. Proof objects are plain
//! data, serializable and checkable without re-running the strategy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{InferError, Result};
use crate::term::Term;

/// Index of a step within a proof object
pub type StepId = usize;

/// Final verdict of a proof attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The goal follows from the context
    Proved,
    /// The goal was refuted (a countermodel or consistent saturation exists)
    Disproved,
    /// A budget ran out before a verdict; never a success claim
    ResourceExhausted(ExhaustedResource),
    /// The strategy cannot decide this goal
    Unknown { reason: String },
}

impl Outcome {
    pub fn is_proved(&self) -> bool {
        matches!(self, Outcome::Proved)
    }

    /// Whether the attempt reached a definitive verdict either way
    pub fn is_decided(&self) -> bool {
        matches!(self, Outcome::Proved | Outcome::Disproved)
    }
}

/// Which budget dimension ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExhaustedResource {
    Steps,
    Clauses,
    Time,
    Nodes,
    Depth,
    Cancelled,
}

impl fmt::Display for ExhaustedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExhaustedResource::Steps => "step limit",
            ExhaustedResource::Clauses => "clause limit",
            ExhaustedResource::Time => "time limit",
            ExhaustedResource::Nodes => "node limit",
            ExhaustedResource::Depth => "depth limit",
            ExhaustedResource::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// How a step's conclusion was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Justification {
    /// Fact or rule taken from the context
    Premise,
    /// Negation of the goal, introduced for refutation
    NegatedGoal,
    /// Clausification of an earlier step
    Clausify { from: StepId },
    /// Binary resolution on two earlier steps
    Resolution {
        left: StepId,
        right: StepId,
        left_literal: usize,
        right_literal: usize,
    },
    /// Factoring within one earlier step
    Factoring {
        from: StepId,
        literal1: usize,
        literal2: usize,
    },
    /// Literal established on a tableau branch by rule expansion
    TableauLiteral { world: usize },
    /// Closed tableau branch: complementary pair in one world
    TableauClosure { world: usize, complement_of: StepId },
    /// Constraint propagation emptied a domain or fixed all variables
    ConstraintPropagation { constraint: String },
    /// Verdict delegated to an SMT backend
    SmtVerdict { backend: String },
}

/// One derivation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub id: StepId,
    /// The formula or clause established at this step
    pub conclusion: Term,
    pub justification: Justification,
}

/// Counters filled in by the strategy that produced the proof
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStats {
    pub clauses_generated: usize,
    pub resolution_steps: usize,
    pub worlds_created: usize,
    pub propagations: usize,
    pub backtracks: usize,
    pub elapsed_ms: u64,
}

/// A complete, self-contained proof attempt record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofObject {
    pub goal: Term,
    /// Name of the strategy that produced this object
    pub strategy: String,
    pub outcome: Outcome,
    /// Steps in derivation order; justifications point backwards only
    pub steps: Vec<ProofStep>,
    /// Bindings for the goal's free variables, rendered by variable name
    pub answers: Vec<(String, Term)>,
    /// Human-readable notes: exhaustion details, countermodel literals
    pub diagnostics: Vec<String>,
    pub stats: ProofStats,
}

impl ProofObject {
    /// Create an empty proof object for a goal
    pub fn new(goal: Term, strategy: &str, outcome: Outcome) -> Self {
        ProofObject {
            goal,
            strategy: strategy.to_string(),
            outcome,
            steps: Vec::new(),
            answers: Vec::new(),
            diagnostics: Vec::new(),
            stats: ProofStats::default(),
        }
    }

    /// Append a step, returning its index
    pub fn push_step(&mut self, conclusion: Term, justification: Justification) -> StepId {
        let id = self.steps.len();
        self.steps.push(ProofStep {
            id,
            conclusion,
            justification,
        });
        id
    }

    /// Record the elapsed wall time
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.stats.elapsed_ms = elapsed.as_millis() as u64;
        self
    }

    /// Check internal consistency: ids are positional and every
    /// justification references strictly earlier steps
    pub fn check(&self) -> Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            if step.id != i {
                return Err(InferError::internal(format!(
                    "step id {} at position {}",
                    step.id, i
                )));
            }
            let premises: Vec<StepId> = match &step.justification {
                Justification::Premise
                | Justification::NegatedGoal
                | Justification::TableauLiteral { .. }
                | Justification::ConstraintPropagation { .. }
                | Justification::SmtVerdict { .. } => vec![],
                Justification::Clausify { from } | Justification::Factoring { from, .. } => {
                    vec![*from]
                }
                Justification::Resolution { left, right, .. } => vec![*left, *right],
                Justification::TableauClosure { complement_of, .. } => vec![*complement_of],
            };
            for p in premises {
                if p >= i {
                    return Err(InferError::internal(format!(
                        "step {} references later step {}",
                        i, p
                    )));
                }
            }
        }
        Ok(())
    }

    /// Render the proof as indented text for the CLI
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("goal:     {}\n", self.goal));
        out.push_str(&format!("strategy: {}\n", self.strategy));
        out.push_str(&format!("outcome:  {:?}\n", self.outcome));
        if !self.answers.is_empty() {
            out.push_str("answers:\n");
            for (name, term) in &self.answers {
                out.push_str(&format!("  {} = {}\n", name, term));
            }
        }
        if !self.diagnostics.is_empty() {
            out.push_str("diagnostics:\n");
            for d in &self.diagnostics {
                out.push_str(&format!("  {}\n", d));
            }
        }
        if !self.steps.is_empty() {
            out.push_str("steps:\n");
            for step in &self.steps {
                out.push_str(&format!(
                    "  [{}] {}  ({})\n",
                    step.id,
                    step.conclusion,
                    describe(&step.justification)
                ));
            }
        }
        out
    }
}

fn describe(j: &Justification) -> String {
    match j {
        Justification::Premise => "premise".to_string(),
        Justification::NegatedGoal => "negated goal".to_string(),
        Justification::Clausify { from } => format!("clausify {}", from),
        Justification::Resolution { left, right, .. } => {
            format!("resolve {} with {}", left, right)
        }
        Justification::Factoring { from, .. } => format!("factor {}", from),
        Justification::TableauLiteral { world } => {
            format!("branch literal in world {}", world)
        }
        Justification::TableauClosure {
            world,
            complement_of,
        } => format!("closure in world {} against {}", world, complement_of),
        Justification::ConstraintPropagation { constraint } => {
            format!("propagate {}", constraint)
        }
        Justification::SmtVerdict { backend } => format!("smt verdict from {}", backend),
    }
}

// ============================================================================
// Trace events
// ============================================================================

/// A coarse event emitted while a strategy runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TraceEvent {
    StrategyStarted { strategy: String, goal: String },
    ClauseDerived { strategy: String, clause: String },
    WorldCreated { strategy: String, world: usize },
    StrategyFinished { strategy: String, outcome: String },
}

/// Sink for trace events, injected into the coordinator
///
/// The default [`NoopTraceSink`] discards everything.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: TraceEvent);
}

/// Discards all events
#[derive(Debug, Default)]
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn emit(&self, _event: TraceEvent) {}
}

/// Writes events to stderr, used by the CLI in verbose mode
#[derive(Debug, Default)]
pub struct StderrTraceSink;

impl TraceSink for StderrTraceSink {
    fn emit(&self, event: TraceEvent) {
        eprintln!("trace: {:?}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_step_assigns_positional_ids() {
        let mut proof = ProofObject::new(Term::atom("p", vec![]), "resolution", Outcome::Proved);
        let a = proof.push_step(Term::atom("p", vec![]), Justification::Premise);
        let b = proof.push_step(
            Term::atom("q", vec![]),
            Justification::Clausify { from: a },
        );
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert!(proof.check().is_ok());
    }

    #[test]
    fn test_check_rejects_forward_reference() {
        let mut proof = ProofObject::new(Term::atom("p", vec![]), "resolution", Outcome::Proved);
        proof.push_step(
            Term::atom("p", vec![]),
            Justification::Clausify { from: 5 },
        );
        assert!(proof.check().is_err());
    }

    #[test]
    fn test_exhausted_is_not_decided() {
        let outcome = Outcome::ResourceExhausted(ExhaustedResource::Time);
        assert!(!outcome.is_proved());
        assert!(!outcome.is_decided());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut proof = ProofObject::new(Term::atom("p", vec![]), "tableau", Outcome::Proved);
        proof.push_step(Term::atom("p", vec![]), Justification::NegatedGoal);
        let json = serde_json::to_string(&proof).unwrap();
        let back: ProofObject = serde_json::from_str(&json).unwrap();
        assert_eq!(back.steps.len(), 1);
        assert_eq!(back.outcome, Outcome::Proved);
    }

    #[test]
    fn test_render_contains_steps() {
        let mut proof = ProofObject::new(Term::atom("p", vec![]), "resolution", Outcome::Proved);
        proof.push_step(Term::atom("p", vec![]), Justification::Premise);
        let text = proof.render();
        assert!(text.contains("premise"));
        assert!(text.contains("resolution"));
    }
}
