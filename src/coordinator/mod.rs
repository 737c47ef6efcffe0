//! Inference coordination
//!
//! [`InferenceCoordinator`] is the front door of the engine. It validates a
//! goal against the type system, classifies its shape, asks the
//! [`StrategyKnowledgeBase`] for a ranked candidate order, and tries
//! strategies until one reaches a verdict. Sequential dispatch is the
//! default; concurrent mode races the candidates on worker threads with a
//! shared cancellation flag, first verdict wins.
//!
//! The only error `submit_goal` surfaces is the type precondition. Search
//! failure, exhausted budgets and undecidable goals all come back as
//! ordinary [`ProofObject`]s.

pub mod knowledge;

pub use knowledge::{StrategyKnowledgeBase, StrategyRecord};

use std::panic;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::context::Context;
use crate::error::Result;
use crate::proof::{
    NoopTraceSink, Outcome, ProofObject, TraceEvent, TraceSink,
};
use crate::prover::{
    Budget, BudgetMeter, ClpProver, GoalProfile, ModalSystem, ModalTableauProver,
    ResolutionProver, SmtStrategy, Strategy, StrategyKind,
};
use crate::term::{SimpleTypeSystem, Term};

/// Coordinator dispatch settings
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// Race candidates on worker threads instead of trying them in order
    pub concurrent: bool,
    pub verbose: bool,
}

/// Routes goals to proof strategies
pub struct InferenceCoordinator {
    strategies: Vec<Arc<dyn Strategy>>,
    kb: StrategyKnowledgeBase,
    budget: Budget,
    config: CoordinatorConfig,
    trace: Box<dyn TraceSink>,
}

impl Default for InferenceCoordinator {
    fn default() -> Self {
        InferenceCoordinator::new()
    }
}

impl InferenceCoordinator {
    /// Coordinator with the four stock strategies registered
    pub fn new() -> Self {
        let mut coordinator = InferenceCoordinator::empty();
        coordinator.register(Arc::new(ResolutionProver::new()));
        coordinator.register(Arc::new(ModalTableauProver::new(ModalSystem::default())));
        coordinator.register(Arc::new(ClpProver::new()));
        coordinator.register(Arc::new(SmtStrategy::new()));
        coordinator
    }

    /// Coordinator with no strategies; callers register their own
    pub fn empty() -> Self {
        InferenceCoordinator {
            strategies: Vec::new(),
            kb: StrategyKnowledgeBase::new(),
            budget: Budget::default(),
            config: CoordinatorConfig::default(),
            trace: Box::new(NoopTraceSink),
        }
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.push(strategy);
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_trace(mut self, trace: Box<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }

    pub fn knowledge_base(&self) -> &StrategyKnowledgeBase {
        &self.kb
    }

    /// Prove or refute a goal against a context
    ///
    /// Errors only on the type precondition; every other failure mode is an
    /// [`Outcome`] on the returned proof object.
    pub fn submit_goal(&mut self, goal: &Term, context: &Context) -> Result<ProofObject> {
        let types = SimpleTypeSystem;
        goal.validate(&types)?;
        context.validate(&types)?;

        let profile = GoalProfile::classify(goal, context);
        let signature = profile.signature();

        let candidates: Vec<Arc<dyn Strategy>> = self
            .strategies
            .iter()
            .filter(|s| s.supports(&profile))
            .cloned()
            .collect();

        if candidates.is_empty() {
            let mut proof = ProofObject::new(
                goal.clone(),
                "coordinator",
                Outcome::Unknown {
                    reason: "no applicable strategy".to_string(),
                },
            );
            proof
                .diagnostics
                .push(format!("goal signature {}", signature));
            return Ok(proof);
        }

        let kinds: Vec<StrategyKind> = candidates.iter().map(|s| s.kind()).collect();
        let ranked = self.kb.rank(&signature, &kinds);
        let ordered: Vec<Arc<dyn Strategy>> = ranked
            .iter()
            .filter_map(|kind| candidates.iter().find(|s| s.kind() == *kind).cloned())
            .collect();

        let (proof, observations) = if self.config.concurrent && ordered.len() > 1 {
            self.race(goal, context, &ordered)
        } else {
            self.run_sequential(goal, context, &ordered)
        };

        // Single-writer KB update after the call completes
        for (kind, succeeded, elapsed_ms) in observations {
            self.kb.record(&signature, kind, succeeded, elapsed_ms);
        }

        Ok(proof)
    }

    fn run_sequential(
        &self,
        goal: &Term,
        context: &Context,
        ordered: &[Arc<dyn Strategy>],
    ) -> (ProofObject, Vec<(StrategyKind, bool, u64)>) {
        let mut observations = Vec::new();
        let mut attempts: Vec<ProofObject> = Vec::new();

        for strategy in ordered {
            self.trace.emit(TraceEvent::StrategyStarted {
                strategy: strategy.name().to_string(),
                goal: format!("{}", goal),
            });
            if self.config.verbose {
                eprintln!("coordinator: trying {}", strategy.name());
            }

            let meter = BudgetMeter::new(self.budget.clone());
            match strategy.attempt(goal, context, &meter) {
                Ok(proof) => {
                    let decided = proof.outcome.is_decided();
                    observations.push((strategy.kind(), decided, proof.stats.elapsed_ms));
                    self.trace.emit(TraceEvent::StrategyFinished {
                        strategy: strategy.name().to_string(),
                        outcome: format!("{:?}", proof.outcome),
                    });
                    if decided {
                        return (proof, observations);
                    }
                    attempts.push(proof);
                }
                Err(err) => {
                    observations.push((strategy.kind(), false, 0));
                    attempts.push(failed_attempt(goal, strategy.name(), &err.to_string()));
                }
            }
        }

        (aggregate(goal, attempts), observations)
    }

    /// Race all candidates on worker threads; first verdict cancels the rest
    fn race(
        &self,
        goal: &Term,
        context: &Context,
        ordered: &[Arc<dyn Strategy>],
    ) -> (ProofObject, Vec<(StrategyKind, bool, u64)>) {
        let cancel = Arc::new(AtomicBool::new(false));
        let results: Arc<Mutex<Vec<(usize, ProofObject)>>> = Arc::new(Mutex::new(Vec::new()));
        let budget = self.budget.clone();

        thread::scope(|scope| {
            for (rank, strategy) in ordered.iter().enumerate() {
                let strategy = Arc::clone(strategy);
                let cancel = Arc::clone(&cancel);
                let results = Arc::clone(&results);
                let budget = budget.clone();
                let goal = goal.clone();

                scope.spawn(move || {
                    let meter = BudgetMeter::with_cancel(budget, cancel);
                    let attempt = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                        strategy.attempt(&goal, context, &meter)
                    }));
                    let proof = match attempt {
                        Ok(Ok(proof)) => proof,
                        Ok(Err(err)) => {
                            failed_attempt(&goal, strategy.name(), &err.to_string())
                        }
                        Err(_) => failed_attempt(&goal, strategy.name(), "worker panicked"),
                    };
                    if proof.outcome.is_decided() {
                        meter.cancel();
                    }
                    if let Ok(mut slot) = results.lock() {
                        slot.push((rank, proof));
                    }
                });
            }
        });

        let mut collected = match Arc::try_unwrap(results) {
            Ok(mutex) => mutex.into_inner().unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        collected.sort_by_key(|(rank, _)| *rank);

        let mut observations = Vec::new();
        let mut winner: Option<ProofObject> = None;
        let mut attempts = Vec::new();

        for (rank, proof) in collected {
            let kind = ordered[rank].kind();
            let decided = proof.outcome.is_decided();
            observations.push((kind, decided, proof.stats.elapsed_ms));
            if decided && winner.is_none() {
                winner = Some(proof);
            } else {
                attempts.push(proof);
            }
        }

        match winner {
            Some(proof) => (proof, observations),
            None => (aggregate(goal, attempts), observations),
        }
    }
}

/// Placeholder attempt for a strategy that failed internally
fn failed_attempt(goal: &Term, strategy: &str, error: &str) -> ProofObject {
    let mut proof = ProofObject::new(
        goal.clone(),
        strategy,
        Outcome::Unknown {
            reason: format!("strategy failed: {}", error),
        },
    );
    proof.diagnostics.push(error.to_string());
    proof
}

/// Fold undecided attempts into one best-effort report
fn aggregate(goal: &Term, attempts: Vec<ProofObject>) -> ProofObject {
    let mut proof = ProofObject::new(
        goal.clone(),
        "coordinator",
        Outcome::Unknown {
            reason: "no strategy reached a verdict".to_string(),
        },
    );
    for attempt in attempts {
        let note = match &attempt.outcome {
            Outcome::ResourceExhausted(r) => format!("{}: exhausted {}", attempt.strategy, r),
            Outcome::Unknown { reason } => format!("{}: {}", attempt.strategy, reason),
            other => format!("{}: {:?}", attempt.strategy, other),
        };
        proof.diagnostics.push(note);
        proof.diagnostics.extend(attempt.diagnostics);
    }
    proof
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::parse_term;

    fn submit(premises: &str, goal: &str) -> ProofObject {
        let ctx = Context::parse(premises).unwrap();
        let goal = parse_term(goal).unwrap();
        InferenceCoordinator::new()
            .submit_goal(&goal, &ctx)
            .unwrap()
    }

    #[test]
    fn test_entailed_goal_is_proved() {
        let proof = submit(
            "At(john,home)\nforall X. At(X,home) -> CanGoTo(X,home)\n",
            "CanGoTo(john,home)",
        );
        assert_eq!(proof.outcome, Outcome::Proved);
        assert!(proof.check().is_ok());
    }

    #[test]
    fn test_non_entailed_goal_is_disproved() {
        let proof = submit(
            "At(john,home)\nforall X. At(X,home) -> CanGoTo(X,home)\n",
            "CanGoTo(john,park)",
        );
        assert_eq!(proof.outcome, Outcome::Disproved);
        assert!(!proof.diagnostics.is_empty());
    }

    #[test]
    fn test_modal_goal_routes_to_tableau() {
        let proof = submit("[]p\np -> q\n", "p");
        // T and stronger systems prove this from reflexivity
        assert_eq!(proof.strategy, "modal-tableau");
    }

    #[test]
    fn test_type_mismatch_is_surfaced() {
        // A formula in argument position violates the precondition
        let ctx = Context::new();
        let inner = parse_term("q & r").unwrap();
        let goal = Term::atom("P", vec![inner]);
        let result = InferenceCoordinator::new().submit_goal(&goal, &ctx);
        assert!(result.is_err());
    }

    #[test]
    fn test_kb_records_every_call() {
        let ctx = Context::parse("p\n").unwrap();
        let goal = parse_term("p").unwrap();
        let mut coordinator = InferenceCoordinator::new();
        coordinator.submit_goal(&goal, &ctx).unwrap();
        assert!(coordinator.knowledge_base().version() > 0);
    }

    #[test]
    fn test_smt_unsupported_falls_back_to_resolution() {
        // Constrained profile prefers the arithmetic strategies, but the
        // non-arithmetic atom forces them to report Unknown; resolution
        // still has to close the goal
        let mut coordinator = InferenceCoordinator::new();
        let ctx = Context::parse("Reachable(a)\n").unwrap();
        let goal = parse_term("Reachable(a) | lt(X,0) & gt(X,5)").unwrap();
        let proof = coordinator.submit_goal(&goal, &ctx).unwrap();
        assert_eq!(proof.outcome, Outcome::Proved);
        assert_eq!(proof.strategy, "resolution");
    }

    #[test]
    fn test_no_applicable_strategy_reports_unknown() {
        let mut coordinator = InferenceCoordinator::empty();
        let ctx = Context::new();
        let goal = parse_term("p").unwrap();
        let proof = coordinator.submit_goal(&goal, &ctx).unwrap();
        assert!(matches!(proof.outcome, Outcome::Unknown { .. }));
    }

    #[test]
    fn test_concurrent_mode_reaches_same_verdict() {
        let mut coordinator = InferenceCoordinator::new().with_config(CoordinatorConfig {
            concurrent: true,
            verbose: false,
        });
        let ctx = Context::parse("At(john,home)\nforall X. At(X,home) -> CanGoTo(X,home)\n")
            .unwrap();
        let goal = parse_term("CanGoTo(john,home)").unwrap();
        let proof = coordinator.submit_goal(&goal, &ctx).unwrap();
        assert_eq!(proof.outcome, Outcome::Proved);
    }

    #[test]
    fn test_ranking_shifts_after_history() {
        let mut coordinator = InferenceCoordinator::new();
        let ctx = Context::parse("p\n").unwrap();
        let goal = parse_term("p").unwrap();
        for _ in 0..3 {
            coordinator.submit_goal(&goal, &ctx).unwrap();
        }
        let proof = coordinator.submit_goal(&goal, &ctx).unwrap();
        // Whichever strategy keeps winning must stay first
        let kb = coordinator.knowledge_base();
        let record = kb
            .get("p---", StrategyKind::Resolution)
            .or_else(|| kb.get("p---", StrategyKind::ModalTableau));
        assert!(record.is_some());
        assert_eq!(proof.outcome, Outcome::Proved);
    }
}
